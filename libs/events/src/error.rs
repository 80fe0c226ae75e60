//! Error types for event flattening.

use thiserror::Error;

/// Errors that can occur while flattening or encoding an event.
#[derive(Debug, Error)]
pub enum FlattenError {
    /// A binary field does not hold UTF-8 text.
    #[error("field {field:?} at depth {depth} is not valid UTF-8 text: {source}")]
    InvalidText {
        field: String,
        depth: usize,
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// The envelope could not be encoded as JSON.
    #[error("envelope encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}
