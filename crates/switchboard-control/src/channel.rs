//! Control channel for advisory kill instructions
//!
//! The edge fleet is not enumerable from the control service, so a kill is a
//! broadcast on one well-known channel. Whichever edge node holds the session
//! tears it down; everyone else ignores the message. There is no
//! acknowledgement: a completed broadcast means "instruction dispatched", not
//! "tunnel torn down".

use futures::stream::{BoxStream, StreamExt};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use switchboard_store::CoordinationStore;
use tracing::{debug, info, warn};

use crate::ControlError;

/// Channel carrying control messages
pub const CONTROL_CHANNEL: &str = "tunnel:control";

const KILL_PREFIX: &str = "kill:";

/// Message published on the control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Disconnect the session holding this identifier
    Kill(String),
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMessage::Kill(identifier) => write!(f, "{}{}", KILL_PREFIX, identifier),
        }
    }
}

impl FromStr for ControlMessage {
    type Err = ControlError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        match payload.strip_prefix(KILL_PREFIX) {
            Some(identifier) if !identifier.is_empty() => {
                Ok(ControlMessage::Kill(identifier.to_string()))
            }
            _ => Err(ControlError::InvalidControlMessage(payload.to_string())),
        }
    }
}

/// Publisher side of the control channel
#[derive(Clone)]
pub struct ControlChannel {
    store: Arc<dyn CoordinationStore>,
}

impl ControlChannel {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Broadcast a kill instruction for `identifier`
    ///
    /// Returns once the publish completes. Publishing the same instruction
    /// twice is harmless.
    pub async fn broadcast_kill(&self, identifier: &str) -> Result<(), ControlError> {
        let message = ControlMessage::Kill(identifier.to_string());
        let receivers = self
            .store
            .publish(CONTROL_CHANNEL, &message.to_string())
            .await?;

        // Subscriber count says nothing about whether one of them held the session
        info!(identifier = %identifier, receivers, "Dispatched kill instruction");
        Ok(())
    }

    /// Subscribe to the control channel, as an edge node does
    pub async fn subscribe(&self) -> Result<ControlSubscriber, ControlError> {
        let payloads = self.store.subscribe(CONTROL_CHANNEL).await?;
        debug!(channel = CONTROL_CHANNEL, "Subscribed to control channel");
        Ok(ControlSubscriber { payloads })
    }
}

/// Subscriber side of the control channel
pub struct ControlSubscriber {
    payloads: BoxStream<'static, String>,
}

impl ControlSubscriber {
    /// Wait for the next well-formed control message
    ///
    /// Malformed payloads are logged and skipped. Returns `None` once the
    /// subscription closes.
    pub async fn next_message(&mut self) -> Option<ControlMessage> {
        while let Some(payload) = self.payloads.next().await {
            match payload.parse::<ControlMessage>() {
                Ok(message) => return Some(message),
                Err(e) => warn!("Ignoring control payload: {}", e),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_store::MemoryStore;

    #[test]
    fn test_kill_message_format() {
        let message = ControlMessage::Kill("pretty-cake".to_string());
        assert_eq!(message.to_string(), "kill:pretty-cake");
        assert_eq!("kill:pretty-cake".parse::<ControlMessage>().unwrap(), message);
    }

    #[test]
    fn test_malformed_messages_rejected() {
        assert!("kill:".parse::<ControlMessage>().is_err());
        assert!("restart:pretty-cake".parse::<ControlMessage>().is_err());
        assert!("".parse::<ControlMessage>().is_err());
    }

    #[test]
    fn test_identifier_may_contain_colons() {
        let message: ControlMessage = "kill:tcp://odd:1".parse().unwrap();
        assert_eq!(message, ControlMessage::Kill("tcp://odd:1".to_string()));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_succeeds() {
        let store = Arc::new(MemoryStore::new());
        let channel = ControlChannel::new(store.clone());

        channel.broadcast_kill("pretty-cake").await.unwrap();
        assert_eq!(store.operation_count(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_skips_malformed_payloads() {
        let store = Arc::new(MemoryStore::new());
        let channel = ControlChannel::new(store.clone());
        let mut subscriber = channel.subscribe().await.unwrap();

        store.publish(CONTROL_CHANNEL, "garbage").await.unwrap();
        channel.broadcast_kill("pretty-cake").await.unwrap();

        assert_eq!(
            subscriber.next_message().await,
            Some(ControlMessage::Kill("pretty-cake".to_string()))
        );
    }
}
