//! vSphere VI/JSON protocol support.
//!
//! - `client`: authenticated session implementing [`ManagementApi`](crate::upstream::ManagementApi)
//! - `decode`: JSON payloads to typed nodes
//! - `schema`: descriptor tables for data object types

mod client;
mod decode;
mod schema;

pub use client::{ServiceContent, VijsonClient, SESSION_HEADER};
pub use decode::{decode_event, decode_moref, decode_node, decode_update_set, encode_moref};
pub use schema::{FieldSchema, Schema, EVENT_TYPE};
