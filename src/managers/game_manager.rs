use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use image::RgbaImage;
use poise::serenity_prelude::{ChannelId, MessageId, UserId};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::compose::{build_bracket, champion_frame, encode_png, round_frame};
use crate::config::BotConfig;
use crate::error::{BotError, Result, ValidationError};
use crate::game::{GameSession, RoundOutcome, Side, LEFT_ARROW, RIGHT_ARROW};
use crate::managers::SharedAssetManager;
use crate::models::{GameResult, GenderFilter, IdolChoice};
use crate::services::SharedGateway;
use crate::state::SharedDocumentStore;

pub const ROUND_FILE_NAME: &str = "combined_pic.png";
pub const WINNER_FILE_NAME: &str = "biasgame_winner.png";

/// A session plus the reaction gate around it
pub struct GameHandle {
    pub user_id: UserId,
    /// Set once a round is on screen, cleared by the reaction that resolves it
    /// or by a resend
    ready: AtomicBool,
    /// Id of the message showing the current round, 0 before the first send
    last_message: AtomicU64,
    session: Mutex<GameSession>,
}

impl GameHandle {
    fn new(session: GameSession) -> Self {
        Self {
            user_id: session.user_id,
            ready: AtomicBool::new(false),
            last_message: AtomicU64::new(0),
            session: Mutex::new(session),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn last_message(&self) -> Option<MessageId> {
        match self.last_message.load(Ordering::SeqCst) {
            0 => None,
            id => Some(MessageId::new(id)),
        }
    }
}

/// What a reaction did to a game
#[derive(Debug, Clone)]
pub enum ReactionOutcome {
    /// Not a round reaction, a stale message, or a duplicate
    Ignored,
    Advanced,
    Completed(GameResult),
}

/// Snapshot of an in-progress game for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSummary {
    pub filter: GenderFilter,
    pub size: usize,
    pub idols_remaining: usize,
    pub round: usize,
}

/// Owns every running game, one per user
pub struct GameManager {
    games: DashMap<UserId, Arc<GameHandle>>,
    assets: SharedAssetManager,
    gateway: SharedGateway,
    documents: SharedDocumentStore,
    allowed_sizes: Vec<usize>,
    default_size: usize,
    round_delay: Duration,
}

impl GameManager {
    pub fn new(
        config: &BotConfig,
        assets: SharedAssetManager,
        gateway: SharedGateway,
        documents: SharedDocumentStore,
    ) -> Self {
        Self {
            games: DashMap::new(),
            assets,
            gateway,
            documents,
            allowed_sizes: config.allowed_game_sizes.clone(),
            default_size: config.default_game_size,
            round_delay: config.round_delay(),
        }
    }

    pub fn allowed_sizes(&self) -> &[usize] {
        &self.allowed_sizes
    }

    pub fn active_games(&self) -> usize {
        self.games.len()
    }

    pub fn get(&self, user: UserId) -> Option<Arc<GameHandle>> {
        self.games.get(&user).map(|h| h.clone())
    }

    /// Start a game, or continue the running one from `channel`.
    ///
    /// A running game keeps its filter and size; only its channel changes.
    pub async fn start_or_resume(
        &self,
        user: UserId,
        channel: ChannelId,
        filter: GenderFilter,
        size: Option<usize>,
    ) -> Result<Arc<GameHandle>> {
        if let Some(handle) = self.get(user) {
            handle.session.lock().await.channel_id = channel;
            debug!("Resuming bias game of user {} in channel {}", user, channel);
            return Ok(handle);
        }

        let size = size.unwrap_or(self.default_size);
        if !self.allowed_sizes.contains(&size) {
            return Err(ValidationError::InvalidGameSize { size }.into());
        }

        let contestants = self.assets.pick_contestants(filter, size)?;
        let handle = Arc::new(GameHandle::new(GameSession::new(
            user,
            channel,
            filter,
            contestants,
        )));

        let handle = match self.games.entry(user) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                info!("Started {} bias game of size {} for user {}", filter, size, user);
                slot.insert(handle).clone()
            }
        };
        Ok(handle)
    }

    /// Start or resume, then show the current round
    pub async fn play(
        &self,
        user: UserId,
        channel: ChannelId,
        filter: GenderFilter,
        size: Option<usize>,
    ) -> Result<()> {
        let handle = self.start_or_resume(user, channel, filter, size).await?;
        self.send_round(&handle).await
    }

    /// Compose and send the current round, replacing the previous round message.
    ///
    /// On a send failure the game stays where it is and waits for the user
    /// to call the game command again.
    pub async fn send_round(&self, handle: &GameHandle) -> Result<()> {
        let mut session = handle.session.lock().await;
        // the round on screen is about to be replaced
        handle.ready.store(false, Ordering::SeqCst);
        let Some((left, right)) = session.current_pair() else {
            return Ok(());
        };

        let left_img = self.assets.variant_for(&left, &mut session.chosen_variants)?;
        let right_img = self.assets.variant_for(&right, &mut session.chosen_variants)?;
        let overlays = self.assets.overlays();
        let bytes = tokio::task::spawn_blocking(move || {
            encode_png(&round_frame(&left_img, &right_img, &overlays))
        })
        .await??;

        let content = round_text(handle.user_id, session.idols_remaining(), &left, &right);
        let channel = session.channel_id;
        let message = self
            .gateway
            .send_file(channel, ROUND_FILE_NAME, bytes, &content)
            .await
            .map_err(|e| {
                warn!("Failed to send round for user {}: {}", handle.user_id, e);
                e
            })?;

        let previous = session.last_round_message.replace(message);
        handle.last_message.store(message.get(), Ordering::SeqCst);

        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            for glyph in [LEFT_ARROW, RIGHT_ARROW] {
                if let Err(e) = gateway.add_reaction(channel, message, glyph).await {
                    debug!("Failed to add {} to round message {}: {}", glyph, message, e);
                }
            }
        });
        if let Some(previous) = previous {
            self.delete_later(channel, previous);
        }

        handle.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Apply a reaction from `user` on `message`
    pub async fn on_reaction(
        &self,
        user: UserId,
        message: MessageId,
        glyph: &str,
    ) -> Result<ReactionOutcome> {
        let Some(side) = Side::from_glyph(glyph) else {
            return Ok(ReactionOutcome::Ignored);
        };
        let Some(handle) = self.get(user) else {
            return Ok(ReactionOutcome::Ignored);
        };
        if handle.last_message() != Some(message) {
            return Ok(ReactionOutcome::Ignored);
        }
        if handle
            .ready
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(ReactionOutcome::Ignored);
        }

        let mut session = handle.session.lock().await;
        if session.last_round_message != Some(message) {
            // a resume replaced the round while this reaction waited
            return Ok(ReactionOutcome::Ignored);
        }
        match session.advance(side)? {
            RoundOutcome::Continue => {
                drop(session);
                tokio::time::sleep(self.round_delay).await;
                self.send_round(&handle).await?;
                Ok(ReactionOutcome::Advanced)
            }
            RoundOutcome::Champion(champion) => {
                self.games.remove_if(&user, |_, h| Arc::ptr_eq(h, &handle));
                let result = self.finish(&mut session, champion).await?;
                Ok(ReactionOutcome::Completed(result))
            }
        }
    }

    async fn finish(
        &self,
        session: &mut GameSession,
        champion: Arc<IdolChoice>,
    ) -> Result<GameResult> {
        let channel = session.channel_id;
        if let Some(previous) = session.last_round_message.take() {
            self.delete_later(channel, previous);
        }

        let overlays = self.assets.overlays();
        let bytes = match session.bracket_contestants() {
            Some(contestants) => {
                let images = contestants
                    .iter()
                    .map(|idol| self.assets.variant_for(idol, &mut session.chosen_variants))
                    .collect::<Result<Vec<Arc<RgbaImage>>>>()?;
                tokio::task::spawn_blocking(move || {
                    build_bracket(&images, &overlays).and_then(|b| encode_png(&b))
                })
                .await??
            }
            None => {
                let image = self
                    .assets
                    .variant_for(&champion, &mut session.chosen_variants)?;
                tokio::task::spawn_blocking(move || encode_png(&champion_frame(&image, &overlays)))
                    .await??
            }
        };

        let content = format!(
            "<@{}>\nWinner: {}!",
            session.user_id,
            champion.display_name()
        );
        if let Err(e) = self
            .gateway
            .send_file(channel, WINNER_FILE_NAME, bytes, &content)
            .await
        {
            warn!("Failed to send winner of user {}: {}", session.user_id, e);
        }

        let guild = self.gateway.guild_of_channel(channel).await;
        let result = session.to_result(guild).ok_or_else(|| BotError::Internal {
            message: "finished game has no champion".to_string(),
        })?;
        self.documents.insert_game(result.clone()).await?;

        info!(
            "User {} finished a {} game: {}",
            session.user_id,
            session.size,
            champion.display_name()
        );
        Ok(result)
    }

    pub async fn summary(&self, user: UserId) -> Option<GameSummary> {
        let handle = self.get(user)?;
        let session = handle.session.lock().await;
        Some(GameSummary {
            filter: session.filter,
            size: session.size,
            idols_remaining: session.idols_remaining(),
            round: session.round_number(),
        })
    }

    fn delete_later(&self, channel: ChannelId, message: MessageId) {
        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway.delete_message(channel, message).await {
                debug!("Failed to delete round message {}: {}", message, e);
            }
        });
    }
}

fn round_text(user: UserId, remaining: usize, left: &IdolChoice, right: &IdolChoice) -> String {
    format!(
        "<@{}>\nIdols Remaining: {}\n{} vs {}",
        user,
        remaining,
        left.display_name(),
        right.display_name()
    )
}

/// Shared game manager type
pub type SharedGameManager = Arc<GameManager>;

pub fn create_shared_game_manager(
    config: &BotConfig,
    assets: SharedAssetManager,
    gateway: SharedGateway,
    documents: SharedDocumentStore,
) -> SharedGameManager {
    Arc::new(GameManager::new(config, assets, gateway, documents))
}
