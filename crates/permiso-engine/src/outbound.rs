//! Outbound message contract.
//!
//! The transport collaborator (the actual messaging provider client) sits
//! behind [`MessageSink`]. The engine only ever hands it a rendered
//! [`OutboundMessage`]; delivery failures surface as errors and are
//! classified, not swallowed.

use std::sync::Mutex;

use async_trait::async_trait;
use permiso_core::identity::UserId;
use thiserror::Error;

/// A message to deliver to one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Plain text.
    Text(String),
    /// Text followed by numbered options.
    Prompt {
        /// Message body.
        body: String,
        /// Options, rendered 1-based.
        options: Vec<String>,
    },
}

impl OutboundMessage {
    /// Convenience constructor for plain text.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text(body.into())
    }

    /// Convenience constructor for a numbered prompt.
    #[must_use]
    pub fn prompt(body: impl Into<String>, options: Vec<String>) -> Self {
        Self::Prompt {
            body: body.into(),
            options,
        }
    }

    /// Renders the message as a single text block.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(body) => body.clone(),
            Self::Prompt { body, options } => {
                let mut out = body.clone();
                for (i, option) in options.iter().enumerate() {
                    out.push_str(&format!("\n{}. {option}", i + 1));
                }
                out
            },
        }
    }
}

/// Delivery failure reported by the transport collaborator.
#[derive(Debug, Clone, Error)]
#[error("message delivery failed: {reason}")]
pub struct SendError {
    /// Transport-level detail.
    pub reason: String,
}

/// Delivers messages to the transport collaborator.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Sends one message to one identity.
    async fn send(&self, to: &UserId, message: OutboundMessage) -> Result<(), SendError>;
}

/// Sink that records every message in memory. Test double.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(UserId, OutboundMessage)>>,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<(UserId, OutboundMessage)> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of messages sent.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, to: &UserId, message: OutboundMessage) -> Result<(), SendError> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((to.clone(), message));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_renders_numbered_options() {
        let msg = OutboundMessage::prompt(
            "Elige una opción:",
            vec!["Nuevo permiso".to_string(), "Estado".to_string()],
        );
        assert_eq!(msg.render(), "Elige una opción:\n1. Nuevo permiso\n2. Estado");
    }

    #[tokio::test]
    async fn recording_sink_captures_messages() {
        let sink = RecordingSink::new();
        let id = UserId::parse("5210000000012").unwrap();
        sink.send(&id, OutboundMessage::text("hola")).await.unwrap();
        assert_eq!(sink.count(), 1);
        assert_eq!(sink.sent()[0].1, OutboundMessage::text("hola"));
    }
}
