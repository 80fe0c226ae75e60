//! # vcev-events
//!
//! Turns typed vCenter events into flat, JSON-compatible records and wraps
//! them in the envelope published to the message broker.
//!
//! ## Flattening
//!
//! [`flatten`] walks a [`vcev_vmodl::TypedNode`] and produces a
//! [`FlatValue`]: a tree of records whose leaves are strings or null.
//!
//! - Empty values (null, empty string, empty record) are never stored under a
//!   key; consumers rely on absent keys rather than empty ones.
//! - Links and managed object references render as identity strings and are
//!   never expanded.
//! - Arrays become records keyed `data1`, `data2`, ...
//! - Booleans render as the strings `"true"` / `"false"`.
//!
//! ## Event Envelope
//!
//! Every published message carries the source vCenter (`vcenter`) and the
//! event identifier (`event_id`, also the routing key) ahead of the
//! flattened event fields.

mod envelope;
mod error;
mod flat;
mod flatten;

pub use envelope::{event_id, EventEnvelope, EVENT_ID_KEY, MESSAGE_KEY, VCENTER_KEY};
pub use error::FlattenError;
pub use flat::{FlatRecord, FlatValue};
pub use flatten::{flatten, flatten_event, format_timestamp};
