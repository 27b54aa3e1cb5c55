//! Channel manager: fans in inbound streams and routes replies back.

use futures::stream;
use tracing::{info, warn};

use crate::channels::{Channel, CommandInfo, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Owns every active channel.
pub struct ChannelManager {
    channels: Vec<Box<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    pub fn add(&mut self, channel: Box<dyn Channel>) {
        self.channels.push(channel);
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Start every channel and merge their streams.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let s = channel.start().await?;
            info!(channel = channel.name(), "Channel started");
            streams.push(s);
        }
        Ok(Box::pin(stream::select_all(streams)))
    }

    /// Probe every channel. Failures are logged, not fatal.
    pub async fn check_health(&self) {
        for channel in &self.channels {
            match channel.health_check().await {
                Ok(()) => info!(channel = channel.name(), "Channel healthy"),
                Err(e) => warn!(channel = channel.name(), "Channel health check failed: {}", e),
            }
        }
    }

    /// Publish commands on every channel. Failures are logged, not fatal.
    pub async fn register_commands(&self, commands: &[CommandInfo]) {
        for channel in &self.channels {
            if let Err(e) = channel.register_commands(commands).await {
                warn!(channel = channel.name(), "Failed to register commands: {}", e);
            }
        }
    }

    /// Send a reply on the channel the message came from.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .iter()
            .find(|c| c.name() == msg.channel)
            .ok_or_else(|| {
                ChannelError::InvalidMessage(format!("unknown channel '{}'", msg.channel))
            })?;
        channel.respond(msg, response).await
    }

    pub async fn shutdown_all(&self) {
        for channel in &self.channels {
            if let Err(e) = channel.shutdown().await {
                warn!(channel = channel.name(), "Channel shutdown failed: {}", e);
            }
        }
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::CliChannel;

    #[tokio::test]
    async fn reply_to_unknown_channel_fails() {
        let mut manager = ChannelManager::new();
        manager.add(Box::new(CliChannel::new()));
        assert_eq!(manager.names(), vec!["cli"]);

        let msg = IncomingMessage::new("telegram", "1", "hi");
        let result = manager.respond(&msg, OutgoingResponse::text("hello")).await;
        assert!(matches!(result, Err(ChannelError::InvalidMessage(_))));
    }
}
