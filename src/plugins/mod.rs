//! Command plugins and the registry that routes messages and reactions to them

pub mod biasgame;
pub mod pong;

use async_trait::async_trait;
use poise::serenity_prelude::{self as serenity, ChannelId, GuildId, MessageId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;

pub use biasgame::BiasGamePlugin;
pub use pong::PongPlugin;

/// A user mentioned in a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// The parts of a chat message plugins look at
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub author_id: UserId,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub author_is_bot: bool,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub content: String,
    /// Attachment URLs, in upload order
    pub attachments: Vec<String>,
    pub mentions: Vec<Mention>,
}

impl IncomingMessage {
    pub fn from_serenity(message: &serenity::Message) -> Self {
        Self {
            id: message.id,
            author_id: message.author.id,
            author_name: message.author.name.clone(),
            author_avatar: message.author.avatar_url(),
            author_is_bot: message.author.bot,
            channel_id: message.channel_id,
            guild_id: message.guild_id,
            content: message.content.clone(),
            attachments: message.attachments.iter().map(|a| a.url.clone()).collect(),
            mentions: message
                .mentions
                .iter()
                .map(|user| Mention {
                    id: user.id,
                    name: user.name.clone(),
                    avatar_url: user.avatar_url(),
                })
                .collect(),
        }
    }
}

/// A unicode reaction added to a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingReaction {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub guild_id: Option<GuildId>,
    pub glyph: String,
}

impl IncomingReaction {
    /// `None` for custom emoji and reactions without a user
    pub fn from_serenity(reaction: &serenity::Reaction) -> Option<Self> {
        let serenity::ReactionType::Unicode(glyph) = &reaction.emoji else {
            return None;
        };
        Some(Self {
            user_id: reaction.user_id?,
            channel_id: reaction.channel_id,
            message_id: reaction.message_id,
            guild_id: reaction.guild_id,
            glyph: glyph.clone(),
        })
    }
}

/// A set of prefix commands plus optional reaction handling
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lowercase command names this plugin answers to
    fn commands(&self) -> &[&'static str];

    fn matches(&self, command: &str) -> bool {
        self.commands().contains(&command)
    }

    async fn handle(&self, message: &IncomingMessage, command: &str, content: &str) -> Result<()>;

    async fn handle_reaction(&self, _reaction: &IncomingReaction) -> Result<()> {
        Ok(())
    }
}

/// Split `content` into a lowercased command and the trimmed rest, if it
/// starts with `prefix`
pub fn split_command(prefix: &str, content: &str) -> Option<(String, String)> {
    let body = content.strip_prefix(prefix)?;
    let body = body.trim_start();
    if body.is_empty() {
        return None;
    }
    let (command, rest) = match body.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (body, ""),
    };
    Some((command.to_lowercase(), rest.to_string()))
}

/// Command name -> plugin
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
    by_command: HashMap<&'static str, usize>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin. A command already claimed by an earlier plugin stays with it.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let index = self.plugins.len();
        for command in plugin.commands() {
            if let Some(existing) = self.by_command.get(command) {
                warn!(
                    "Command '{}' of plugin {} is already handled by {}",
                    command,
                    plugin.name(),
                    self.plugins[*existing].name()
                );
                continue;
            }
            self.by_command.insert(command, index);
        }
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn plugin_for(&self, command: &str) -> Option<&Arc<dyn Plugin>> {
        let command = command.to_lowercase();
        self.by_command
            .get(command.as_str())
            .map(|&i| &self.plugins[i])
            .filter(|plugin| plugin.matches(&command))
    }

    /// Run the plugin registered for `command`. False when none is.
    pub async fn dispatch(
        &self,
        message: &IncomingMessage,
        command: &str,
        content: &str,
    ) -> Result<bool> {
        let command = command.to_lowercase();
        let Some(plugin) = self.plugin_for(&command) else {
            debug!("No plugin for command '{}'", command);
            return Ok(false);
        };
        debug!("Dispatching '{}' to plugin {}", command, plugin.name());
        plugin.handle(message, &command, content).await?;
        Ok(true)
    }

    /// Offer a reaction to every plugin; failures are logged per plugin
    pub async fn dispatch_reaction(&self, reaction: &IncomingReaction) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.handle_reaction(reaction).await {
                warn!("Plugin {} failed to handle reaction: {}", plugin.name(), e);
            }
        }
    }
}

/// Shared plugin registry type
pub type SharedPluginRegistry = Arc<PluginRegistry>;
