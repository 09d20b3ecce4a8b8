//! Frequency tables over finished games.

use poise::serenity_prelude::UserId;
use std::borrow::Cow;
use std::collections::HashMap;

use crate::models::{GameResult, IdolEntry};

pub const FIELD_VALUE_LIMIT: usize = 1024;

/// Whose games are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsScope {
    /// The requesting user
    Own,
    User(UserId),
    Server,
    Global,
}

/// What is counted in each game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsDimension {
    GameWins,
    RoundWins,
    RoundLosses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Idol,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsQuery {
    pub scope: StatsScope,
    pub dimension: StatsDimension,
    pub grouping: Grouping,
    /// Only games since 00:00 UTC today
    pub today: bool,
}

impl StatsQuery {
    /// Read a query from the words after `stats`.
    ///
    /// `mentioned` is the first user mentioned in the message, if any.
    pub fn parse(content: &str, mentioned: Option<UserId>) -> Self {
        let content = content.to_lowercase();

        let scope = if content.contains("server") {
            StatsScope::Server
        } else if content.contains("global") {
            StatsScope::Global
        } else if let Some(user) = mentioned.filter(|_| content.contains("<@")) {
            StatsScope::User(user)
        } else {
            StatsScope::Own
        };

        let dimension = if content.contains("rounds won") {
            StatsDimension::RoundWins
        } else if content.contains("rounds lost") {
            StatsDimension::RoundLosses
        } else {
            StatsDimension::GameWins
        };

        let grouping = if content.contains("group") {
            Grouping::Group
        } else {
            Grouping::Idol
        };

        Self {
            scope,
            dimension,
            grouping,
            today: content.contains("today"),
        }
    }

    pub fn title(&self) -> &'static str {
        match (self.dimension, self.grouping) {
            (StatsDimension::GameWins, Grouping::Idol) => "Bias Game Winners",
            (StatsDimension::GameWins, Grouping::Group) => "Bias Game Winners by Group",
            (StatsDimension::RoundWins, Grouping::Idol) => "Rounds Won in Bias Game",
            (StatsDimension::RoundWins, Grouping::Group) => "Rounds Won in Bias Game by Group",
            (StatsDimension::RoundLosses, Grouping::Idol) => "Rounds Lost in Bias Game",
            (StatsDimension::RoundLosses, Grouping::Group) => "Rounds Lost in Bias Game by Group",
        }
    }

    pub fn count_label(&self) -> &'static str {
        match self.dimension {
            StatsDimension::GameWins => "Games Won",
            StatsDimension::RoundWins => "Rounds Won",
            StatsDimension::RoundLosses => "Rounds Lost",
        }
    }
}

fn label(entry: &IdolEntry, grouping: Grouping) -> String {
    match grouping {
        Grouping::Idol => format!("**{}** {}", entry.group_name, entry.name),
        Grouping::Group => entry.group_name.clone(),
    }
}

/// label -> number of occurrences across `games`
pub fn count_labels(
    games: &[GameResult],
    dimension: StatsDimension,
    grouping: Grouping,
) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for game in games {
        let entries: &[IdolEntry] = match dimension {
            StatsDimension::GameWins => std::slice::from_ref(&game.winner),
            StatsDimension::RoundWins => &game.round_winners,
            StatsDimension::RoundLosses => &game.round_losers,
        };
        for entry in entries {
            *counts.entry(label(entry, grouping)).or_insert(0) += 1;
        }
    }
    counts
}

/// Invert counts into buckets, highest count first, labels sorted within a bucket
pub fn bucket_by_count(counts: HashMap<String, usize>) -> Vec<(usize, Vec<String>)> {
    let mut buckets: HashMap<usize, Vec<String>> = HashMap::new();
    for (label, count) in counts {
        buckets.entry(count).or_default().push(label);
    }

    let mut buckets: Vec<(usize, Vec<String>)> = buckets.into_iter().collect();
    buckets.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, labels) in &mut buckets {
        labels.sort();
    }
    buckets
}

/// Embed fields ("Games Won - 3", "A, B, C"), splitting long buckets so no
/// value exceeds the field limit
pub fn bucket_fields(count_label: &str, buckets: &[(usize, Vec<String>)]) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    for (count, labels) in buckets {
        let name = format!("{} - {}", count_label, count);
        for value in join_within_limit(labels, FIELD_VALUE_LIMIT) {
            fields.push((name.clone(), value));
        }
    }
    fields
}

/// Join with ", " into chunks of at most `limit` bytes.
///
/// A label longer than `limit` on its own is cut on a char boundary and
/// ends with an ellipsis.
pub fn join_within_limit(labels: &[String], limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for label in labels {
        let label = truncate_label(label, limit);
        let extra = if current.is_empty() { label.len() } else { label.len() + 2 };
        if !current.is_empty() && current.len() + extra > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str(", ");
        }
        current.push_str(&label);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn truncate_label(label: &str, limit: usize) -> Cow<'_, str> {
    if label.len() <= limit {
        return Cow::Borrowed(label);
    }
    const ELLIPSIS: char = '…';
    let budget = limit.saturating_sub(ELLIPSIS.len_utf8());
    let mut end = 0;
    for (i, c) in label.char_indices() {
        if i + c.len_utf8() > budget {
            break;
        }
        end = i + c.len_utf8();
    }
    let mut cut = label[..end].to_string();
    if limit >= ELLIPSIS.len_utf8() {
        cut.push(ELLIPSIS);
    }
    Cow::Owned(cut)
}
