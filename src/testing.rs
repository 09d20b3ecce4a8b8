//! In-memory fakes and fixtures shared by unit tests

use async_trait::async_trait;
use chrono::Utc;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::compose::{encode_png, OverlayAssets};
use crate::config::{BotConfig, BracketLayout, BracketSlot, DriveFolders, BRACKET_SLOTS};
use crate::error::{BotError, Result};
use crate::i18n::Translations;
use crate::managers::{create_shared_asset_manager, SharedAssetManager};
use crate::models::{
    Gender, GameResult, GenderFilter, IdolEntry, SuggestionEntry, SuggestionStatus,
};
use crate::plugins::{IncomingMessage, IncomingReaction};
use crate::services::{ChatGateway, Embed, FetchedImage, ImageSource, ObjectStore, RemoteFile};

/// Idol image height used by test overlays
pub const TEST_IMAGE_HEIGHT: u32 = 8;

pub fn solid(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(width, height, color)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_png(&solid(width, height, Rgba([200, 100, 50, 255]))).unwrap()
}

/// Small overlay bundle with a layout that fits a 40x24 bracket template
pub fn test_overlays() -> OverlayAssets {
    let slots = (0..BRACKET_SLOTS as u32)
        .map(|i| BracketSlot {
            x: (i % 5) * 8,
            y: (i / 5) * 8,
            height: 4,
        })
        .collect();

    OverlayAssets {
        verses: solid(10, TEST_IMAGE_HEIGHT + 30, Rgba([0, 0, 0, 255])),
        shadow_border: solid(38, TEST_IMAGE_HEIGHT + 30, Rgba([20, 20, 20, 255])),
        crown: solid(4, 4, Rgba([255, 215, 0, 255])),
        bracket: solid(40, 24, Rgba([255, 255, 255, 255])),
        layout: BracketLayout {
            version: 1,
            slots,
            crown_offset: (0, 0),
        },
    }
}

/// Config pointing at the "girls", "boys" and "misc" folders of a [`MemoryDrive`]
pub fn test_config() -> BotConfig {
    BotConfig {
        owner_ids: vec![99],
        folders: DriveFolders {
            girls: "girls".to_string(),
            boys: "boys".to_string(),
            misc: "misc".to_string(),
        },
        suggestion_channel_id: Some(500),
        image_height: TEST_IMAGE_HEIGHT,
        fetch_concurrency: 4,
        round_delay_ms: 0,
        suggestion_min_size: 10,
        suggestion_max_size: 100,
        ..BotConfig::default()
    }
}

/// Drive with `girls` + `boys` idols and an asset manager refreshed from it
pub async fn seeded_assets(girls: usize, boys: usize) -> (Arc<MemoryDrive>, SharedAssetManager) {
    let drive = Arc::new(MemoryDrive::new());
    for i in 0..girls {
        drive.add_image("girls", &format!("G{}_Girl{}.png", i, i), png_bytes(16, 16));
    }
    for i in 0..boys {
        drive.add_image("boys", &format!("B{}_Boy{}.png", i, i), png_bytes(16, 16));
    }

    let assets = create_shared_asset_manager(
        &test_config(),
        drive.clone(),
        drive.clone(),
        Arc::new(test_overlays()),
    );
    assets.refresh().await.unwrap();
    (drive, assets)
}

pub fn idol_entry(group: &str, idol: &str) -> IdolEntry {
    IdolEntry {
        name: idol.to_string(),
        group_name: group.to_string(),
        gender: Gender::Girl,
    }
}

pub fn game_result(user: u64, guild: Option<u64>, group: &str, idol: &str) -> GameResult {
    GameResult {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: UserId::new(user),
        guild_id: guild.map(GuildId::new),
        gender: GenderFilter::Girl,
        winner: idol_entry(group, idol),
        round_winners: vec![idol_entry(group, idol)],
        round_losers: vec![idol_entry("Other", "Loser")],
        created_at: Utc::now(),
    }
}

pub fn suggestion(id: &str) -> SuggestionEntry {
    let now = Utc::now();
    SuggestionEntry {
        id: id.to_string(),
        user_id: UserId::new(7),
        channel_id: ChannelId::new(70),
        gender: Gender::Girl,
        group_name: "PRISTIN".to_string(),
        idol_name: "Nayoung".to_string(),
        image_url: format!("mem://suggestion/{}", id),
        notes: None,
        group_match: false,
        idol_match: false,
        status: SuggestionStatus::Pending,
        moderator_id: None,
        created_at: now,
        updated_at: now,
    }
}

/// The shipped English translations
pub fn test_translations() -> Arc<Translations> {
    let root = serde_json::from_str(include_str!("../assets/i18n/en.json")).unwrap();
    Arc::new(Translations::from_value(root))
}

/// Message from `author` in `channel` of guild 1, no attachments or mentions
pub fn incoming_message(author: u64, channel: u64, content: &str) -> IncomingMessage {
    IncomingMessage {
        id: MessageId::new(1),
        author_id: UserId::new(author),
        author_name: format!("user{}", author),
        author_avatar: None,
        author_is_bot: false,
        channel_id: ChannelId::new(channel),
        guild_id: Some(GuildId::new(1)),
        content: content.to_string(),
        attachments: Vec::new(),
        mentions: Vec::new(),
    }
}

pub fn incoming_reaction(user: u64, channel: u64, message: MessageId, glyph: &str) -> IncomingReaction {
    IncomingReaction {
        user_id: UserId::new(user),
        channel_id: ChannelId::new(channel),
        message_id: message,
        guild_id: Some(GuildId::new(1)),
        glyph: glyph.to_string(),
    }
}

/// A call made against [`RecordingGateway`]
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Message {
        channel: ChannelId,
        id: MessageId,
        content: String,
    },
    File {
        channel: ChannelId,
        id: MessageId,
        file_name: String,
        content: String,
    },
    Embed {
        channel: ChannelId,
        id: MessageId,
        embed: Embed,
    },
    EditedEmbed {
        channel: ChannelId,
        id: MessageId,
        embed: Embed,
    },
    DirectMessage {
        user: UserId,
        content: String,
    },
}

/// Gateway that records every call and hands out increasing message ids
pub struct RecordingGateway {
    next_id: AtomicU64,
    pub sent: Mutex<Vec<Sent>>,
    pub deleted: Mutex<Vec<MessageId>>,
    pub reactions: Mutex<Vec<(MessageId, String)>>,
    pub cleared: Mutex<Vec<MessageId>>,
    pub fail_sends: AtomicBool,
    pub guild: Option<GuildId>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            sent: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            reactions: Mutex::new(Vec::new()),
            cleared: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            guild: Some(GuildId::new(1)),
        }
    }

    fn next(&self) -> Result<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BotError::Discord {
                message: "send failed".to_string(),
            });
        }
        Ok(MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    /// (message, file name, content) of every file sent
    pub fn files(&self) -> Vec<(MessageId, String, String)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::File {
                    id,
                    file_name,
                    content,
                    ..
                } => Some((*id, file_name.clone(), content.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Message { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn direct_messages(&self) -> Vec<(UserId, String)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::DirectMessage { user, content } => Some((*user, content.clone())),
                _ => None,
            })
            .collect()
    }

    /// Last embed sent or edited, with the message it lives on
    pub fn last_embed(&self) -> Option<(MessageId, Embed)> {
        self.sent.lock().iter().rev().find_map(|s| match s {
            Sent::Embed { id, embed, .. } | Sent::EditedEmbed { id, embed, .. } => {
                Some((*id, embed.clone()))
            }
            _ => None,
        })
    }

    pub fn reactions_on(&self, message: MessageId) -> Vec<String> {
        self.reactions
            .lock()
            .iter()
            .filter(|(id, _)| *id == message)
            .map(|(_, glyph)| glyph.clone())
            .collect()
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageId> {
        let id = self.next()?;
        self.sent.lock().push(Sent::Message {
            channel,
            id,
            content: content.to_string(),
        });
        Ok(id)
    }

    async fn send_file(
        &self,
        channel: ChannelId,
        file_name: &str,
        _bytes: Vec<u8>,
        content: &str,
    ) -> Result<MessageId> {
        let id = self.next()?;
        self.sent.lock().push(Sent::File {
            channel,
            id,
            file_name: file_name.to_string(),
            content: content.to_string(),
        });
        Ok(id)
    }

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<MessageId> {
        let id = self.next()?;
        self.sent.lock().push(Sent::Embed {
            channel,
            id,
            embed: embed.clone(),
        });
        Ok(id)
    }

    async fn edit_embed(
        &self,
        channel: ChannelId,
        message: MessageId,
        embed: &Embed,
    ) -> Result<()> {
        self.sent.lock().push(Sent::EditedEmbed {
            channel,
            id: message,
            embed: embed.clone(),
        });
        Ok(())
    }

    async fn delete_message(&self, _channel: ChannelId, message: MessageId) -> Result<()> {
        self.deleted.lock().push(message);
        Ok(())
    }

    async fn add_reaction(
        &self,
        _channel: ChannelId,
        message: MessageId,
        glyph: &str,
    ) -> Result<()> {
        self.reactions.lock().push((message, glyph.to_string()));
        Ok(())
    }

    async fn remove_all_reactions(&self, _channel: ChannelId, message: MessageId) -> Result<()> {
        self.cleared.lock().push(message);
        Ok(())
    }

    async fn send_direct_message(&self, user: UserId, content: &str) -> Result<MessageId> {
        let id = self.next()?;
        self.sent.lock().push(Sent::DirectMessage {
            user,
            content: content.to_string(),
        });
        Ok(id)
    }

    async fn guild_of_channel(&self, _channel: ChannelId) -> Option<GuildId> {
        self.guild
    }

    async fn channel_label(&self, channel: ChannelId) -> Option<String> {
        Some(format!("Test Guild | #channel-{}", channel.get()))
    }
}

/// One in-memory "drive": folders of files plus the blobs behind their links
pub struct MemoryDrive {
    folders: Mutex<HashMap<String, Vec<RemoteFile>>>,
    blobs: Mutex<HashMap<String, FetchedImage>>,
    failing_urls: Mutex<HashSet<String>>,
    hanging_urls: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
    /// Most fetches ever running at once
    pub peak_in_flight: AtomicUsize,
    pub fail_listing: AtomicBool,
    pub uploads: Mutex<Vec<RemoteFile>>,
    pub fetch_delay: Option<Duration>,
}

/// Counts a fetch as running until dropped, including when it is cancelled
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self {
            folders: Mutex::new(HashMap::new()),
            blobs: Mutex::new(HashMap::new()),
            failing_urls: Mutex::new(HashSet::new()),
            hanging_urls: Mutex::new(HashSet::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            fail_listing: AtomicBool::new(false),
            uploads: Mutex::new(Vec::new()),
            fetch_delay: None,
        }
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Put a PNG file into a folder
    pub fn add_image(&self, folder: &str, name: &str, bytes: Vec<u8>) -> RemoteFile {
        self.add_file(folder, name, "image/png", bytes)
    }

    pub fn add_file(&self, folder: &str, name: &str, mime_type: &str, bytes: Vec<u8>) -> RemoteFile {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let file = RemoteFile {
            content_link: format!("mem://{}/{}", folder, id),
            id,
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            parent_folder_id: Some(folder.to_string()),
        };
        self.add_blob(&file.content_link, bytes, Some(mime_type));
        self.folders
            .lock()
            .entry(folder.to_string())
            .or_default()
            .push(file.clone());
        file
    }

    pub fn add_blob(&self, url: &str, bytes: Vec<u8>, content_type: Option<&str>) {
        self.blobs.lock().insert(
            url.to_string(),
            FetchedImage {
                bytes,
                content_type: content_type.map(str::to_string),
            },
        );
    }

    /// Make fetches of `url` fail
    pub fn break_url(&self, url: &str) {
        self.failing_urls.lock().insert(url.to_string());
    }

    /// Make fetches of `url` never complete
    pub fn hang_url(&self, url: &str) {
        self.hanging_urls.lock().insert(url.to_string());
    }
}

#[async_trait]
impl ObjectStore for MemoryDrive {
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(BotError::ObjectStore {
                message: format!("listing folder {} failed", folder_id),
            });
        }
        Ok(self
            .folders
            .lock()
            .get(folder_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upload_file(
        &self,
        name: &str,
        folder_id: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<RemoteFile> {
        let file = self.add_file(folder_id, name, mime_type, bytes);
        self.uploads.lock().push(file.clone());
        Ok(file)
    }
}

#[async_trait]
impl ImageSource for MemoryDrive {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let _running = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        let hangs = self.hanging_urls.lock().contains(url);
        if hangs {
            std::future::pending::<()>().await;
        }

        if self.failing_urls.lock().contains(url) {
            return Err(BotError::TransientFetch {
                url: url.to_string(),
                message: "connection reset".to_string(),
            });
        }

        self.blobs
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| BotError::TransientFetch {
                url: url.to_string(),
                message: "expected status 200, got 404 Not Found".to_string(),
            })
    }
}
