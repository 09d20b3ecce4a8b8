use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, UserId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{IncomingMessage, IncomingReaction, Plugin};
use crate::commands::BiasCommand;
use crate::config::BotConfig;
use crate::error::{BotError, Result, ValidationError};
use crate::i18n::Translations;
use crate::managers::{
    ModerationOutcome, ReactionOutcome, SharedAssetManager, SharedGameManager,
    SharedStatsManager, SharedSuggestionManager, StatsTarget,
};
use crate::models::{Gender, GenderFilter};
use crate::services::{Embed, SharedGateway};
use crate::stats::{join_within_limit, StatsQuery, StatsScope, FIELD_VALUE_LIMIT};

/// The `biasgame` command and its reactions
pub struct BiasGamePlugin {
    config: Arc<BotConfig>,
    games: SharedGameManager,
    assets: SharedAssetManager,
    suggestions: Option<SharedSuggestionManager>,
    stats: SharedStatsManager,
    gateway: SharedGateway,
    translations: Arc<Translations>,
}

impl BiasGamePlugin {
    pub fn new(
        config: Arc<BotConfig>,
        games: SharedGameManager,
        assets: SharedAssetManager,
        suggestions: Option<SharedSuggestionManager>,
        stats: SharedStatsManager,
        gateway: SharedGateway,
        translations: Arc<Translations>,
    ) -> Self {
        Self {
            config,
            games,
            assets,
            suggestions,
            stats,
            gateway,
            translations,
        }
    }

    async fn say(&self, channel: ChannelId, key: &str) -> Result<()> {
        let text = self.translations.resolve(key);
        self.gateway.send_message(channel, &text).await?;
        Ok(())
    }

    async fn say_with(&self, channel: ChannelId, key: &str, args: &[&str]) -> Result<()> {
        let text = self.translations.resolve_with(key, args);
        self.gateway.send_message(channel, &text).await?;
        Ok(())
    }

    async fn run(&self, message: &IncomingMessage, content: &str) -> Result<()> {
        match BiasCommand::parse(content)? {
            BiasCommand::Start { filter, size } => self.start(message, filter, size).await,
            BiasCommand::Stats(text) => self.show_stats(message, &text).await,
            BiasCommand::Suggest(args) => self.suggest(message, &args).await,
            BiasCommand::SuggestionNote(text) => self.suggestion_note(message, &text).await,
            BiasCommand::Current => self.current(message).await,
            BiasCommand::Idols => self.idols(message).await,
            BiasCommand::RefreshImages => self.refresh_images(message).await,
        }
    }

    async fn start(
        &self,
        message: &IncomingMessage,
        filter: GenderFilter,
        size: Option<usize>,
    ) -> Result<()> {
        let result = self
            .games
            .play(message.author_id, message.channel_id, filter, size)
            .await;

        match result {
            Err(BotError::Discord { message: reason }) => {
                warn!(
                    "Could not send bias game round for {}: {}",
                    message.author_id, reason
                );
                self.say(message.channel_id, "biasgame.game.round-send-failed")
                    .await
            }
            other => other,
        }
    }

    async fn show_stats(&self, message: &IncomingMessage, text: &str) -> Result<()> {
        let mentioned = message.mentions.first();
        let query = StatsQuery::parse(text, mentioned.map(|m| m.id));

        let own = StatsTarget {
            name: message.author_name.clone(),
            icon_url: message.author_avatar.clone(),
        };
        let target = match query.scope {
            StatsScope::Own => own,
            StatsScope::User(_) => mentioned
                .map(|m| StatsTarget {
                    name: m.name.clone(),
                    icon_url: m.avatar_url.clone(),
                })
                .unwrap_or(own),
            StatsScope::Server if message.guild_id.is_some() => StatsTarget {
                name: "Server".to_string(),
                icon_url: None,
            },
            StatsScope::Server => own,
            StatsScope::Global => StatsTarget {
                name: "Global".to_string(),
                icon_url: None,
            },
        };

        let embed = self
            .stats
            .stats_embed(&query, message.author_id, message.guild_id, &target)
            .await?;
        match embed {
            Some(embed) => {
                self.gateway.send_embed(message.channel_id, &embed).await?;
                Ok(())
            }
            None => self.say(message.channel_id, "biasgame.stats.no-stats").await,
        }
    }

    async fn suggest(&self, message: &IncomingMessage, args: &[String]) -> Result<()> {
        let Some(suggestions) = &self.suggestions else {
            return self
                .say(message.channel_id, "biasgame.suggestion.not-configured")
                .await;
        };

        let attachment = message.attachments.first().map(String::as_str);
        suggestions
            .submit(message.author_id, message.channel_id, args, attachment)
            .await?;
        self.say(message.channel_id, "biasgame.suggestion.thanks-for-suggestion")
            .await
    }

    async fn suggestion_note(&self, message: &IncomingMessage, text: &str) -> Result<()> {
        if !self.config.is_owner(message.author_id.get()) {
            return self.say(message.channel_id, "bot.owners-only").await;
        }
        let Some(suggestions) = &self.suggestions else {
            return self
                .say(message.channel_id, "biasgame.suggestion.not-configured")
                .await;
        };
        if message.channel_id != suggestions.channel() {
            debug!(
                "Ignoring suggestion note outside the suggestion channel from {}",
                message.author_id
            );
            return Ok(());
        }
        if text.is_empty() {
            return Err(ValidationError::InvalidArguments.into());
        }

        if suggestions.annotate_head(text).await? {
            self.say(message.channel_id, "biasgame.suggestion.note-added")
                .await
        } else {
            self.say(message.channel_id, "biasgame.suggestion.no-suggestions")
                .await
        }
    }

    async fn current(&self, message: &IncomingMessage) -> Result<()> {
        match self.games.summary(message.author_id).await {
            Some(summary) => {
                self.say_with(
                    message.channel_id,
                    "biasgame.game.current-game",
                    &[
                        summary.filter.as_str(),
                        &summary.size.to_string(),
                        &summary.idols_remaining.to_string(),
                        &summary.round.to_string(),
                    ],
                )
                .await
            }
            None => {
                self.say(message.channel_id, "biasgame.game.no-game-running")
                    .await
            }
        }
    }

    async fn idols(&self, message: &IncomingMessage) -> Result<()> {
        let roster = self.assets.roster();
        if roster.is_empty() {
            return self.say(message.channel_id, "biasgame.idols.none").await;
        }

        let mut embed = Embed::new();
        embed.title = Some(self.translations.resolve("biasgame.idols.title"));
        embed.description = Some(format!("{} idols", roster.len()));

        for (gender, key) in [
            (Gender::Girl, "biasgame.idols.girls"),
            (Gender::Boy, "biasgame.idols.boys"),
        ] {
            let groups = roster.groups(gender);
            if groups.is_empty() {
                continue;
            }
            let labels: Vec<String> = groups
                .iter()
                .map(|(group, idols)| format!("{} ({})", group, idols.len()))
                .collect();
            let name = format!("{} - {}", self.translations.resolve(key), groups.len());
            for value in join_within_limit(&labels, FIELD_VALUE_LIMIT) {
                embed = embed.field(name.clone(), value, false);
            }
        }

        self.gateway.send_embed(message.channel_id, &embed).await?;
        Ok(())
    }

    async fn refresh_images(&self, message: &IncomingMessage) -> Result<()> {
        if !self.config.is_owner(message.author_id.get()) {
            return self.say(message.channel_id, "bot.owners-only").await;
        }
        self.say(message.channel_id, "biasgame.refresh.started").await?;

        let assets = self.assets.clone();
        let gateway = self.gateway.clone();
        let translations = self.translations.clone();
        let channel = message.channel_id;
        tokio::spawn(async move {
            let text = match assets.refresh().await {
                Ok(report) => translations.resolve_with(
                    "biasgame.refresh.done",
                    &[&report.idols.to_string(), &report.skipped.to_string()],
                ),
                Err(e) => {
                    error!("Refreshing idol images failed: {}", e);
                    translations.resolve_with("biasgame.refresh.failed", &[&e.to_string()])
                }
            };
            if let Err(e) = gateway.send_message(channel, &text).await {
                warn!("Failed to report refresh result: {}", e);
            }
        });
        Ok(())
    }

    /// User-facing text for an error, `None` when it is not the user's doing
    fn error_text(&self, err: &BotError) -> Option<String> {
        let t = &self.translations;
        match err {
            BotError::Validation(ValidationError::InvalidGameSize { .. }) => {
                let sizes: Vec<String> = self
                    .games
                    .allowed_sizes()
                    .iter()
                    .map(usize::to_string)
                    .collect();
                Some(t.resolve_with("biasgame.game.invalid-game-size", &[&sizes.join(", ")]))
            }
            BotError::Validation(validation) => Some(t.resolve(validation.message_key())),
            BotError::InsufficientRoster {
                requested,
                available,
            } => Some(t.resolve_with(
                "biasgame.game.insufficient-roster",
                &[&requested.to_string(), &available.to_string()],
            )),
            BotError::TransientFetch { .. } => Some(t.resolve("biasgame.suggestion.invalid-url")),
            BotError::Image(_) => Some(t.resolve("biasgame.suggestion.could-not-decode")),
            _ => None,
        }
    }

    async fn report(&self, channel: ChannelId, user: UserId, err: BotError) -> Result<()> {
        let text = match self.error_text(&err) {
            Some(text) => {
                debug!("Bias game request of {} rejected: {}", user, err);
                text
            }
            None => {
                error!("Bias game request of {} failed: {}", user, err);
                self.translations.resolve("bot.unexpected-error")
            }
        };
        self.gateway.send_message(channel, &text).await?;
        Ok(())
    }
}

#[async_trait]
impl Plugin for BiasGamePlugin {
    fn name(&self) -> &'static str {
        "biasgame"
    }

    fn commands(&self) -> &[&'static str] {
        &["biasgame"]
    }

    async fn handle(&self, message: &IncomingMessage, _command: &str, content: &str) -> Result<()> {
        match self.run(message, content).await {
            Ok(()) => Ok(()),
            Err(err) => self.report(message.channel_id, message.author_id, err).await,
        }
    }

    async fn handle_reaction(&self, reaction: &IncomingReaction) -> Result<()> {
        match self
            .games
            .on_reaction(reaction.user_id, reaction.message_id, &reaction.glyph)
            .await
        {
            Ok(ReactionOutcome::Completed(result)) => {
                debug!("Bias game {} of {} completed", result.id, result.user_id);
            }
            Ok(_) => {}
            Err(e) => warn!("Bias game reaction from {} failed: {}", reaction.user_id, e),
        }

        let Some(suggestions) = &self.suggestions else {
            return Ok(());
        };
        if reaction.channel_id != suggestions.channel() {
            return Ok(());
        }

        let outcome = suggestions
            .resolve(reaction.user_id, reaction.message_id, &reaction.glyph)
            .await?;
        if let ModerationOutcome::Approved { entry, file } = outcome {
            match self.assets.add_single(&file, entry.gender).await {
                Ok(()) => info!("Added approved idol {} {}", entry.group_name, entry.idol_name),
                Err(e) => warn!("Approved file {} could not be loaded: {}", file.name, e),
            }
        }
        Ok(())
    }
}
