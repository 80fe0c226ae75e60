//! Broker publish interface and recording implementation.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::error::PublishError;
use crate::upstream::CallJournal;

/// Publishes one message to the broker.
///
/// A call returns once the broker has accepted the message or failed; the
/// forwarder publishes strictly one message at a time.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, routing_key: &str, body: &[u8]) -> Result<(), PublishError>;
}

/// A message captured by [`RecordingPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub routing_key: String,
    pub body: Vec<u8>,
}

impl PublishedMessage {
    /// Parses the body as JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }
}

/// Publisher that keeps messages in memory, for tests and dry runs.
pub struct RecordingPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
    journal: Option<CallJournal>,
    fail_after: Option<usize>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            journal: None,
            fail_after: None,
        }
    }

    /// Record `publish:<routing key>` entries into a shared journal.
    #[must_use]
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Accept `accepted` messages, then reject every later one.
    #[must_use]
    pub fn failing_after(mut self, accepted: usize) -> Self {
        self.fail_after = Some(accepted);
        self
    }

    /// Messages accepted so far, in publish order.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, routing_key: &str, body: &[u8]) -> Result<(), PublishError> {
        if let Some(journal) = &self.journal {
            journal.record(format!("publish:{routing_key}"));
        }

        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        if self.fail_after.is_some_and(|limit| messages.len() >= limit) {
            return Err(PublishError::Rejected {
                status: 503,
                body: "recording publisher configured to fail".to_string(),
            });
        }

        debug!(routing_key, bytes = body.len(), "[RECORDING] Published message");
        messages.push(PublishedMessage {
            routing_key: routing_key.to_string(),
            body: body.to_vec(),
        });
        Ok(())
    }
}
