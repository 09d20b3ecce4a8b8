// src/models.rs
use chrono::{DateTime, Utc};
use image::RgbaImage;
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Roster partition tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Girl,
    Boy,
}

impl Gender {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "girl" | "girls" => Some(Gender::Girl),
            "boy" | "boys" => Some(Gender::Boy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Girl => "girl",
            Gender::Boy => "boy",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of the roster a game draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderFilter {
    Girl,
    Boy,
    Mixed,
}

impl GenderFilter {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "mixed" | "all" => Some(GenderFilter::Mixed),
            other => Gender::parse(other).map(GenderFilter::from),
        }
    }

    pub fn includes(&self, gender: Gender) -> bool {
        match self {
            GenderFilter::Mixed => true,
            GenderFilter::Girl => gender == Gender::Girl,
            GenderFilter::Boy => gender == Gender::Boy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenderFilter::Girl => "girl",
            GenderFilter::Boy => "boy",
            GenderFilter::Mixed => "mixed",
        }
    }
}

impl From<Gender> for GenderFilter {
    fn from(gender: Gender) -> Self {
        match gender {
            Gender::Girl => GenderFilter::Girl,
            Gender::Boy => GenderFilter::Boy,
        }
    }
}

impl fmt::Display for GenderFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An idol that can be picked for a game.
///
/// `images` is never empty; additional photos of the same idol are appended
/// as variants instead of creating a second entry.
#[derive(Clone)]
pub struct IdolChoice {
    /// Stable identifier: the remote file name without extension ("Group_Idol")
    pub id: String,
    pub file_name: String,
    pub remote_id: String,
    pub gender: Gender,
    pub group_name: String,
    pub idol_name: String,
    pub images: Vec<Arc<RgbaImage>>,
}

impl IdolChoice {
    /// Build an idol from a remote file named `Group_Idol.ext`
    pub fn from_file(
        file_name: &str,
        remote_id: &str,
        gender: Gender,
        image: RgbaImage,
    ) -> Option<Self> {
        let (id, group_name, idol_name) = parse_idol_file_name(file_name)?;
        Some(Self {
            id,
            file_name: file_name.to_string(),
            remote_id: remote_id.to_string(),
            gender,
            group_name,
            idol_name,
            images: vec![Arc::new(image)],
        })
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.group_name, self.idol_name)
    }

    pub fn to_entry(&self) -> IdolEntry {
        IdolEntry {
            name: self.idol_name.clone(),
            group_name: self.group_name.clone(),
            gender: self.gender,
        }
    }
}

impl fmt::Debug for IdolChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdolChoice")
            .field("id", &self.id)
            .field("gender", &self.gender)
            .field("variants", &self.images.len())
            .finish()
    }
}

/// Split `Group_Idol.png` into (id, group, idol)
pub fn parse_idol_file_name(file_name: &str) -> Option<(String, String, String)> {
    let stem = std::path::Path::new(file_name).file_stem()?.to_str()?;
    let mut parts = stem.split('_');
    let group = parts.next()?.trim();
    let idol = parts.next()?.trim();
    if group.is_empty() || idol.is_empty() {
        return None;
    }
    Some((stem.to_string(), group.to_string(), idol.to_string()))
}

/// Idol as stored in game records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdolEntry {
    pub name: String,
    pub group_name: String,
    pub gender: Gender,
}

/// Finished game, written once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResult {
    pub id: String,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<GuildId>,
    pub gender: GenderFilter,
    pub winner: IdolEntry,
    pub round_winners: Vec<IdolEntry>,
    pub round_losers: Vec<IdolEntry>,
    pub created_at: DateTime<Utc>,
}

/// Moderation state of a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Denied,
}

/// A user-submitted idol image awaiting moderation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionEntry {
    pub id: String,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub gender: Gender,
    pub group_name: String,
    pub idol_name: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub group_match: bool,
    pub idol_match: bool,
    pub status: SuggestionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderator_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SuggestionEntry {
    /// Remote file name used when the suggestion is approved
    pub fn upload_file_name(&self) -> String {
        format!("{}_{}.png", self.group_name, self.idol_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_idol_file_name() {
        let (id, group, idol) = parse_idol_file_name("PRISTIN_Nayoung.png").unwrap();
        assert_eq!(id, "PRISTIN_Nayoung");
        assert_eq!(group, "PRISTIN");
        assert_eq!(idol, "Nayoung");

        assert!(parse_idol_file_name("nounderscore.png").is_none());
        assert!(parse_idol_file_name("_Nayoung.png").is_none());
    }

    #[test]
    fn test_gender_filter() {
        assert_eq!(GenderFilter::parse("BOY"), Some(GenderFilter::Boy));
        assert_eq!(GenderFilter::parse("mixed"), Some(GenderFilter::Mixed));
        assert_eq!(GenderFilter::parse("cat"), None);
        assert!(GenderFilter::Mixed.includes(Gender::Girl));
        assert!(!GenderFilter::Boy.includes(Gender::Girl));
    }

    #[test]
    fn test_game_result_serialization() {
        let entry = IdolEntry {
            name: "Nayoung".to_string(),
            group_name: "PRISTIN".to_string(),
            gender: Gender::Girl,
        };
        let result = GameResult {
            id: "abc".to_string(),
            user_id: UserId::new(1),
            guild_id: None,
            gender: GenderFilter::Girl,
            winner: entry.clone(),
            round_winners: vec![entry.clone()],
            round_losers: vec![],
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["gender"], "girl");
        assert_eq!(json["winner"]["group_name"], "PRISTIN");
        assert!(json.get("guild_id").is_none());
    }
}
