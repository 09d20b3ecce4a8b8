use async_trait::async_trait;
use tracing::info;

use super::{IncomingMessage, Plugin};
use crate::error::Result;
use crate::services::SharedGateway;

/// Answers `ping` with "Pong!" and `pong` with "Ping!"
pub struct PongPlugin {
    gateway: SharedGateway,
}

impl PongPlugin {
    pub fn new(gateway: SharedGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Plugin for PongPlugin {
    fn name(&self) -> &'static str {
        "pong"
    }

    fn commands(&self) -> &[&'static str] {
        &["ping", "pong"]
    }

    async fn handle(&self, message: &IncomingMessage, command: &str, _content: &str) -> Result<()> {
        info!("Ping command called by {}", message.author_name);
        let reply = if command == "ping" { "Pong!" } else { "Ping!" };
        self.gateway.send_message(message.channel_id, reply).await?;
        Ok(())
    }
}
