use poise::serenity_prelude::{self as serenity, UserId};
use tracing::debug;

use crate::plugins::IncomingReaction;
use crate::{Data, Error};

/// The reaction in plugin form, unless the bot added it itself
fn accept(bot_user: UserId, reaction: &serenity::Reaction) -> Option<IncomingReaction> {
    let incoming = IncomingReaction::from_serenity(reaction)?;
    (incoming.user_id != bot_user).then_some(incoming)
}

/// Offer a reaction to every plugin on a separate task
pub async fn handle_reaction(reaction: &serenity::Reaction, data: &Data) -> Result<(), Error> {
    let Some(incoming) = accept(data.bot_user_id, reaction) else {
        return Ok(());
    };

    debug!(
        "Reaction {} by {} on message {}",
        incoming.glyph, incoming.user_id, incoming.message_id
    );
    let plugins = data.plugins.clone();
    tokio::spawn(async move {
        plugins.dispatch_reaction(&incoming).await;
    });
    Ok(())
}
