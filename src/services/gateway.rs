//! Chat gateway capability and its Discord implementation

use async_trait::async_trait;
use poise::serenity_prelude::{
    self as serenity, ChannelId, GuildId, Http, MessageId, UserId,
};
use std::sync::Arc;

use crate::error::Result;

/// Embed colour used by every bias game embed
pub const EMBED_COLOR: u32 = 0x0FADED;

// Discord embed limits
const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_NAME_LIMIT: usize = 256;
const FIELD_VALUE_LIMIT: usize = 1024;
const FOOTER_LIMIT: usize = 2048;
const FIELD_COUNT_LIMIT: usize = 25;
const TOTAL_LIMIT: usize = 6000;

/// Platform-neutral embed description
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embed {
    pub author: Option<String>,
    pub author_icon: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: u32,
    pub image_url: Option<String>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl Embed {
    pub fn new() -> Self {
        Self {
            color: EMBED_COLOR,
            ..Default::default()
        }
    }

    pub fn author(mut self, name: impl Into<String>) -> Self {
        self.author = Some(name.into());
        self
    }

    pub fn author_icon(mut self, url: impl Into<String>) -> Self {
        self.author_icon = Some(url.into());
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    /// Apply Discord's embed limits, dropping empty fields
    pub fn truncated(mut self) -> Self {
        self.title = self.title.map(|t| truncate(&t, TITLE_LIMIT));
        self.description = self.description.map(|d| truncate(&d, DESCRIPTION_LIMIT));
        self.footer = self.footer.map(|f| truncate(&f, FOOTER_LIMIT));
        self.author = self.author.map(|a| truncate(&a, TITLE_LIMIT));

        self.fields = self
            .fields
            .into_iter()
            .filter(|f| !f.value.is_empty())
            .take(FIELD_COUNT_LIMIT)
            .map(|f| EmbedField {
                name: truncate(&f.name, FIELD_NAME_LIMIT),
                value: truncate(&f.value, FIELD_VALUE_LIMIT),
                inline: f.inline,
            })
            .collect();

        if self.total_length() > TOTAL_LIMIT {
            self.footer = None;
        }
        while self.total_length() > TOTAL_LIMIT && !self.fields.is_empty() {
            self.fields.pop();
        }
        self
    }

    fn total_length(&self) -> usize {
        let opt = |s: &Option<String>| s.as_ref().map(|s| s.chars().count()).unwrap_or(0);
        opt(&self.title)
            + opt(&self.description)
            + opt(&self.footer)
            + opt(&self.author)
            + self
                .fields
                .iter()
                .map(|f| f.name.chars().count() + f.value.chars().count())
                .sum::<usize>()
    }

    fn to_serenity(&self) -> serenity::CreateEmbed {
        let mut embed = serenity::CreateEmbed::new().color(self.color);
        if let Some(author) = &self.author {
            let mut builder = serenity::CreateEmbedAuthor::new(author);
            if let Some(icon) = &self.author_icon {
                builder = builder.icon_url(icon);
            }
            embed = embed.author(builder);
        }
        if let Some(title) = &self.title {
            embed = embed.title(title);
        }
        if let Some(description) = &self.description {
            embed = embed.description(description);
        }
        if let Some(url) = &self.image_url {
            embed = embed.image(url);
        }
        for field in &self.fields {
            embed = embed.field(&field.name, &field.value, field.inline);
        }
        if let Some(footer) = &self.footer {
            embed = embed.footer(serenity::CreateEmbedFooter::new(footer));
        }
        embed
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit - 1).collect();
    out.push('…');
    out
}

/// Everything the bot needs from the chat platform
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageId>;

    async fn send_file(
        &self,
        channel: ChannelId,
        file_name: &str,
        bytes: Vec<u8>,
        content: &str,
    ) -> Result<MessageId>;

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<MessageId>;

    async fn edit_embed(&self, channel: ChannelId, message: MessageId, embed: &Embed)
        -> Result<()>;

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()>;

    async fn add_reaction(&self, channel: ChannelId, message: MessageId, glyph: &str)
        -> Result<()>;

    async fn remove_all_reactions(&self, channel: ChannelId, message: MessageId) -> Result<()>;

    async fn send_direct_message(&self, user: UserId, content: &str) -> Result<MessageId>;

    /// Guild a channel belongs to, `None` for DMs or unknown channels
    async fn guild_of_channel(&self, channel: ChannelId) -> Option<GuildId>;

    /// "Guild | #channel" style label for display
    async fn channel_label(&self, channel: ChannelId) -> Option<String>;
}

/// Shared gateway type
pub type SharedGateway = Arc<dyn ChatGateway>;

/// Discord gateway backed by serenity's HTTP client
pub struct SerenityGateway {
    http: Arc<Http>,
}

impl SerenityGateway {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChatGateway for SerenityGateway {
    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageId> {
        let message = channel
            .send_message(
                self.http.as_ref(),
                serenity::CreateMessage::new().content(content),
            )
            .await?;
        Ok(message.id)
    }

    async fn send_file(
        &self,
        channel: ChannelId,
        file_name: &str,
        bytes: Vec<u8>,
        content: &str,
    ) -> Result<MessageId> {
        let attachment = serenity::CreateAttachment::bytes(bytes, file_name);
        let mut builder = serenity::CreateMessage::new().add_file(attachment);
        if !content.is_empty() {
            builder = builder.content(content);
        }
        let message = channel.send_message(self.http.as_ref(), builder).await?;
        Ok(message.id)
    }

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<MessageId> {
        let embed = embed.clone().truncated();
        let message = channel
            .send_message(
                self.http.as_ref(),
                serenity::CreateMessage::new().embed(embed.to_serenity()),
            )
            .await?;
        Ok(message.id)
    }

    async fn edit_embed(
        &self,
        channel: ChannelId,
        message: MessageId,
        embed: &Embed,
    ) -> Result<()> {
        let embed = embed.clone().truncated();
        channel
            .edit_message(
                self.http.as_ref(),
                message,
                serenity::EditMessage::new().embed(embed.to_serenity()),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()> {
        channel.delete_message(self.http.as_ref(), message).await?;
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        glyph: &str,
    ) -> Result<()> {
        channel
            .create_reaction(
                self.http.as_ref(),
                message,
                serenity::ReactionType::Unicode(glyph.to_string()),
            )
            .await?;
        Ok(())
    }

    async fn remove_all_reactions(&self, channel: ChannelId, message: MessageId) -> Result<()> {
        channel.delete_reactions(self.http.as_ref(), message).await?;
        Ok(())
    }

    async fn send_direct_message(&self, user: UserId, content: &str) -> Result<MessageId> {
        let dm_channel = user.create_dm_channel(self.http.as_ref()).await?;
        let message = dm_channel
            .id
            .send_message(
                self.http.as_ref(),
                serenity::CreateMessage::new().content(content),
            )
            .await?;
        Ok(message.id)
    }

    async fn guild_of_channel(&self, channel: ChannelId) -> Option<GuildId> {
        let channel = channel.to_channel(self.http.as_ref()).await.ok()?;
        channel.guild().map(|c| c.guild_id)
    }

    async fn channel_label(&self, channel: ChannelId) -> Option<String> {
        let channel = channel.to_channel(self.http.as_ref()).await.ok()?.guild()?;
        let guild = channel
            .guild_id
            .to_partial_guild(self.http.as_ref())
            .await
            .ok()?;
        Some(format!("{} | #{}", guild.name, channel.name))
    }
}
