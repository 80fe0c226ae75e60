//! Error types for the event forwarder.

use thiserror::Error;
use vcev_events::FlattenError;

/// Errors from the remote management API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request did not complete (connection refused, reset, timed out).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a fault.
    #[error("server fault (status {status}): {message}")]
    Fault { status: u16, message: String },

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Errors from the message broker.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The broker could not be reached.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The broker endpoint is not a usable URL.
    #[error("invalid broker endpoint: {0}")]
    InvalidEndpoint(String),

    /// The broker refused the message.
    #[error("broker rejected message (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Errors that stop the delivery loop.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Subscription or event collector call failed.
    #[error("subscription error: {0}")]
    Subscription(#[from] UpstreamError),

    /// An event could not be flattened.
    #[error("serialization error: {0}")]
    Serialization(#[from] FlattenError),

    /// The broker did not accept an event.
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
}

impl ForwardError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Subscription(_) => "subscription",
            ForwardError::Serialization(_) => "serialization",
            ForwardError::Publish(_) => "publish",
        }
    }
}
