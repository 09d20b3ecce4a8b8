use poise::serenity_prelude as serenity;
use tracing::{debug, error};

use crate::plugins::{split_command, IncomingMessage};
use crate::{Data, Error};

/// Command and arguments of a message meant for the plugins
fn command_of(prefix: &str, message: &IncomingMessage) -> Option<(String, String)> {
    if message.author_is_bot {
        return None;
    }
    split_command(prefix, &message.content)
}

/// Route a prefixed message to its plugin on a separate task
pub async fn handle_message(message: &serenity::Message, data: &Data) -> Result<(), Error> {
    let incoming = IncomingMessage::from_serenity(message);
    let Some((command, content)) = command_of(&data.config.prefix, &incoming) else {
        return Ok(());
    };
    if data.plugins.plugin_for(&command).is_none() {
        return Ok(());
    }

    debug!(
        "Command '{}' from {} in channel {}",
        command, incoming.author_name, incoming.channel_id
    );
    let plugins = data.plugins.clone();
    tokio::spawn(async move {
        if let Err(e) = plugins.dispatch(&incoming, &command, &content).await {
            error!("Command '{}' from {} failed: {}", command, incoming.author_id, e);
        }
    });
    Ok(())
}
