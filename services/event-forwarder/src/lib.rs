//! vCenter event forwarder
//!
//! Watches a vCenter event history collector and republishes every newly
//! created event, flattened to a JSON record, on a RabbitMQ exchange.
//!
//! ## Architecture
//!
//! - **Upstream**: [`ManagementApi`] abstracts the vCenter calls (VI/JSON in
//!   production, scripted mock in tests)
//! - **Subscription**: [`ChangeSubscription`] long-polls a single property of
//!   a managed object and tracks the version token
//! - **Forwarder**: [`EventForwarder`] drains the collector on every change and
//!   publishes events one at a time
//! - **Publisher**: [`Publisher`] hands messages to the broker

pub mod config;
pub mod error;
pub mod forwarder;
pub mod publisher;
pub mod rabbitmq;
pub mod subscription;
pub mod upstream;
pub mod vijson;

pub use config::Config;
pub use error::{ForwardError, PublishError, UpstreamError};
pub use forwarder::{EventForwarder, ForwarderConfig, ForwarderStats};
pub use publisher::{Publisher, RecordingPublisher};
pub use rabbitmq::RabbitMqPublisher;
pub use subscription::ChangeSubscription;
pub use upstream::{ManagementApi, MockManagementApi};
pub use vijson::VijsonClient;
