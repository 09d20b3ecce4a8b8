use chrono::Utc;
use poise::serenity_prelude::{ChannelId, MessageId, UserId};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::compose::{decode_image, encode_png};
use crate::config::BotConfig;
use crate::error::{BotError, Result, ValidationError};
use crate::i18n::Translations;
use crate::managers::SharedAssetManager;
use crate::models::{Gender, SuggestionEntry, SuggestionStatus};
use crate::services::{Embed, RemoteFile, SharedGateway};
use crate::state::SharedDocumentStore;

pub const APPROVE_GLYPH: &str = "✅";
pub const DENY_GLYPH: &str = "❌";
const UNMATCHED_GLYPH: &str = "❓";

const ACCEPTED_CONTENT_TYPES: &[&str] = &["image/png", "image/jpeg"];

/// What a moderator reaction did
#[derive(Debug, Clone)]
pub enum ModerationOutcome {
    Ignored,
    /// Uploaded; the file still has to be merged into the roster
    Approved {
        entry: SuggestionEntry,
        file: RemoteFile,
    },
    Denied(SuggestionEntry),
    /// Fetch or upload failed; the suggestion stays at the head
    ApprovalFailed,
}

/// Canonical spellings found for a suggested group and idol
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMatch {
    pub group: Option<String>,
    pub idol: Option<String>,
}

/// Lowercase ASCII letters and digits only
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Compare a suggested group and idol with the roster after normalization.
///
/// The idol is only looked up inside the matched group.
pub fn match_names(groups: &BTreeMap<String, Vec<String>>, group: &str, idol: &str) -> NameMatch {
    let wanted_group = normalize_name(group);
    let wanted_idol = normalize_name(idol);
    if wanted_group.is_empty() {
        return NameMatch::default();
    }

    let Some((group_name, idols)) = groups
        .iter()
        .find(|(name, _)| normalize_name(name) == wanted_group)
    else {
        return NameMatch::default();
    };

    let idol = if wanted_idol.is_empty() {
        None
    } else {
        idols
            .iter()
            .find(|name| normalize_name(name) == wanted_idol)
            .cloned()
    };

    NameMatch {
        group: Some(group_name.clone()),
        idol,
    }
}

struct QueueState {
    queue: VecDeque<SuggestionEntry>,
    embed_message: Option<MessageId>,
}

/// FIFO of pending suggestions and the moderation embed that shows its head
pub struct SuggestionManager {
    channel: ChannelId,
    state: Mutex<QueueState>,
    assets: SharedAssetManager,
    gateway: SharedGateway,
    documents: SharedDocumentStore,
    translations: Arc<Translations>,
    min_size: u32,
    max_size: u32,
    fetch_timeout: Duration,
}

impl SuggestionManager {
    pub fn new(
        config: &BotConfig,
        channel: ChannelId,
        assets: SharedAssetManager,
        gateway: SharedGateway,
        documents: SharedDocumentStore,
        translations: Arc<Translations>,
    ) -> Self {
        Self {
            channel,
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                embed_message: None,
            }),
            assets,
            gateway,
            documents,
            translations,
            min_size: config.suggestion_min_size,
            max_size: config.suggestion_max_size,
            fetch_timeout: config.fetch_timeout(),
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub async fn queue_len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn embed_message(&self) -> Option<MessageId> {
        self.state.lock().await.embed_message
    }

    /// Reload unresolved suggestions and post the moderation embed
    pub async fn load_pending(&self) -> Result<usize> {
        let pending = self.documents.pending_suggestions().await?;
        let count = pending.len();

        let mut state = self.state.lock().await;
        state.queue = pending.into();
        self.render(&mut state, true).await?;

        info!("Loaded {} pending suggestions", count);
        Ok(count)
    }

    /// Validate and queue a suggestion.
    ///
    /// `args` are the tokens after `suggest`: gender, group, idol and, when
    /// there is no attachment, the image URL.
    pub async fn submit(
        &self,
        user: UserId,
        channel: ChannelId,
        args: &[String],
        attachment_url: Option<&str>,
    ) -> Result<SuggestionEntry> {
        let (gender, group, idol, image_url) = match (args, attachment_url) {
            ([gender, group, idol], Some(url)) => (gender, group, idol, url),
            ([gender, group, idol, url], None) => (gender, group, idol, url.as_str()),
            _ => return Err(ValidationError::InvalidSuggestion.into()),
        };
        let gender = Gender::parse(gender).ok_or(ValidationError::InvalidSuggestion)?;

        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.assets.image_source().fetch(image_url),
        )
        .await
        .map_err(|_| BotError::TransientFetch {
            url: image_url.to_string(),
            message: "timed out".to_string(),
        })??;

        let content_type = fetched.content_type.unwrap_or_default();
        if !ACCEPTED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(ValidationError::UnsupportedImageFormat { content_type }.into());
        }

        let image = tokio::task::spawn_blocking(move || decode_image(&fetched.bytes)).await??;
        let (width, height) = image.dimensions();
        if width != height {
            return Err(ValidationError::ImageNotSquare { width, height }.into());
        }
        if height > self.max_size {
            return Err(ValidationError::ImageTooLarge {
                size: height,
                max: self.max_size,
            }
            .into());
        }
        if height < self.min_size {
            return Err(ValidationError::ImageTooSmall {
                size: height,
                min: self.min_size,
            }
            .into());
        }

        if format!("{}{}", group, idol).contains(['"', '_']) {
            return Err(ValidationError::ForbiddenCharacters.into());
        }

        let matched = match_names(&self.assets.roster().groups(gender), group, idol);
        let now = Utc::now();
        let entry = SuggestionEntry {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user,
            channel_id: channel,
            gender,
            group_match: matched.group.is_some(),
            idol_match: matched.idol.is_some(),
            group_name: matched.group.unwrap_or_else(|| group.clone()),
            idol_name: matched.idol.unwrap_or_else(|| idol.clone()),
            image_url: image_url.to_string(),
            notes: None,
            status: SuggestionStatus::Pending,
            moderator_id: None,
            created_at: now,
            updated_at: now,
        };

        self.documents.insert_suggestion(entry.clone()).await?;

        let mut state = self.state.lock().await;
        state.queue.push_back(entry.clone());
        let head_changed = state.queue.len() == 1;
        self.render(&mut state, head_changed).await?;

        info!(
            "User {} suggested {} {} ({})",
            user, entry.group_name, entry.idol_name, entry.gender
        );
        Ok(entry)
    }

    /// Handle a moderator reaction on the moderation embed
    pub async fn resolve(
        &self,
        moderator: UserId,
        message: MessageId,
        glyph: &str,
    ) -> Result<ModerationOutcome> {
        let glyph: String = glyph.chars().filter(|c| *c != '\u{fe0f}').collect();
        let approve = match glyph.as_str() {
            APPROVE_GLYPH => true,
            DENY_GLYPH => false,
            _ => return Ok(ModerationOutcome::Ignored),
        };

        let mut state = self.state.lock().await;
        if state.embed_message != Some(message) {
            return Ok(ModerationOutcome::Ignored);
        }
        let Some(mut entry) = state.queue.front().cloned() else {
            return Ok(ModerationOutcome::Ignored);
        };

        let file = if approve {
            match self.upload(&entry).await {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!("Approving suggestion {} failed: {}", entry.id, e);
                    let notice = self
                        .translations
                        .resolve_with("biasgame.suggestion.drive-upload-failed", &[&e.to_string()]);
                    if let Err(e) = self.gateway.send_message(self.channel, &notice).await {
                        debug!("Failed to post approval failure notice: {}", e);
                    }
                    return Ok(ModerationOutcome::ApprovalFailed);
                }
            }
        } else {
            None
        };

        entry.status = if approve {
            SuggestionStatus::Approved
        } else {
            SuggestionStatus::Denied
        };
        entry.moderator_id = Some(moderator);
        entry.updated_at = Utc::now();
        // Past this point the upload has happened, so the outcome must reach the caller
        if let Err(e) = self.documents.update_suggestion(&entry).await {
            if file.is_none() {
                return Err(e);
            }
            warn!("Failed to record approval of suggestion {}: {}", entry.id, e);
        }

        let dm_key = if approve {
            "biasgame.suggestion.approved-dm"
        } else {
            "biasgame.suggestion.denied-dm"
        };
        let dm = self
            .translations
            .resolve_with(dm_key, &[&entry.group_name, &entry.idol_name]);
        if let Err(e) = self.gateway.send_direct_message(entry.user_id, &dm).await {
            debug!("Failed to DM user {} about their suggestion: {}", entry.user_id, e);
        }

        state.queue.pop_front();
        if let Err(e) = self.render(&mut state, true).await {
            warn!("Failed to refresh the moderation embed: {}", e);
            // the old embed still shows the resolved entry
            state.embed_message = None;
        }

        info!(
            "Suggestion {} {} by moderator {}",
            entry.id,
            if approve { "approved" } else { "denied" },
            moderator
        );
        Ok(match file {
            Some(file) => ModerationOutcome::Approved { entry, file },
            None => ModerationOutcome::Denied(entry),
        })
    }

    /// Set moderator notes on the head suggestion. False when the queue is empty.
    pub async fn annotate_head(&self, notes: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(head) = state.queue.front_mut() else {
            return Ok(false);
        };
        head.notes = Some(notes.to_string());
        head.updated_at = Utc::now();
        let head = head.clone();

        self.documents.update_suggestion(&head).await?;
        self.render(&mut state, false).await?;
        Ok(true)
    }

    /// Fetch the suggested image, re-encode it as PNG and upload it
    async fn upload(&self, entry: &SuggestionEntry) -> Result<RemoteFile> {
        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.assets.image_source().fetch(&entry.image_url),
        )
        .await
        .map_err(|_| BotError::TransientFetch {
            url: entry.image_url.clone(),
            message: "timed out".to_string(),
        })??;

        let png = tokio::task::spawn_blocking(move || {
            decode_image(&fetched.bytes).and_then(|img| encode_png(&img))
        })
        .await??;

        self.assets
            .object_store()
            .upload_file(
                &entry.upload_file_name(),
                self.assets.folder_for(entry.gender),
                png,
                "image/png",
            )
            .await
    }

    /// Show the head of the queue.
    ///
    /// When the head changed the old embed is replaced by a new message, so
    /// late reactions on the old one no longer match.
    async fn render(&self, state: &mut QueueState, head_changed: bool) -> Result<()> {
        let embed = self.build_embed(&state.queue).await;

        let message = match state.embed_message {
            Some(current) if !head_changed => {
                self.gateway.edit_embed(self.channel, current, &embed).await?;
                current
            }
            previous => {
                let message = self.gateway.send_embed(self.channel, &embed).await?;
                state.embed_message = Some(message);
                if let Some(previous) = previous {
                    if let Err(e) = self.gateway.delete_message(self.channel, previous).await {
                        debug!("Failed to delete old suggestion embed {}: {}", previous, e);
                    }
                }
                message
            }
        };

        if let Err(e) = self.gateway.remove_all_reactions(self.channel, message).await {
            debug!("Failed to clear reactions on suggestion embed: {}", e);
        }
        if !state.queue.is_empty() {
            for glyph in [APPROVE_GLYPH, DENY_GLYPH] {
                if let Err(e) = self.gateway.add_reaction(self.channel, message, glyph).await {
                    debug!("Failed to add {} to suggestion embed: {}", glyph, e);
                }
            }
        }
        Ok(())
    }

    async fn build_embed(&self, queue: &VecDeque<SuggestionEntry>) -> Embed {
        let Some(head) = queue.front() else {
            return Embed::new().author(self.translations.resolve("biasgame.suggestion.no-suggestions"));
        };

        let marker = |matched: bool| if matched { APPROVE_GLYPH } else { UNMATCHED_GLYPH };
        let suggested_from = self
            .gateway
            .channel_label(head.channel_id)
            .await
            .unwrap_or_else(|| "No Guild Info".to_string());

        let mut embed = Embed::new()
            .author(format!("Suggestions in queue: {}", queue.len()))
            .image(head.image_url.clone())
            .field(format!("Idol Name {}", marker(head.idol_match)), &head.idol_name, true)
            .field(format!("Group Name {}", marker(head.group_match)), &head.group_name, true)
            .field("Gender", head.gender.as_str(), true)
            .field("Suggested By", format!("<@{}>", head.user_id), true)
            .field("Suggested From", suggested_from, true)
            .field(
                "Timestamp",
                head.created_at.format("%b %-d, %Y %-I:%M%P (UTC)").to_string(),
                true,
            );
        if let Some(notes) = &head.notes {
            embed = embed.field("Notes", notes, false);
        }
        embed.truncated()
    }
}

/// Shared suggestion manager type
pub type SharedSuggestionManager = Arc<SuggestionManager>;

pub fn create_shared_suggestion_manager(
    config: &BotConfig,
    channel: ChannelId,
    assets: SharedAssetManager,
    gateway: SharedGateway,
    documents: SharedDocumentStore,
    translations: Arc<Translations>,
) -> SharedSuggestionManager {
    Arc::new(SuggestionManager::new(
        config,
        channel,
        assets,
        gateway,
        documents,
        translations,
    ))
}
