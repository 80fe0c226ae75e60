//! RabbitMQ publisher over the management HTTP API.
//!
//! Messages go to `POST /api/exchanges/{vhost}/{exchange}/publish` with
//! persistent delivery. The broker answers with whether the message was
//! routed to at least one queue; an unroutable message is accepted but
//! logged, since binding queues is a topology concern.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::BrokerConfig;
use crate::error::PublishError;
use crate::publisher::Publisher;

/// Persistent delivery mode.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    properties: MessageProperties,
    routing_key: &'a str,
    payload: String,
    payload_encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct MessageProperties {
    content_type: &'static str,
    delivery_mode: u8,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    routed: bool,
}

/// Publishes to one exchange of one RabbitMQ virtual host.
pub struct RabbitMqPublisher {
    client: reqwest::Client,
    publish_url: Url,
    user: String,
    password: String,
    exchange: String,
}

impl RabbitMqPublisher {
    /// Create a publisher for the configured exchange.
    pub fn new(config: &BrokerConfig) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let publish_url = publish_url(&config.url, &config.vhost, &config.exchange)?;

        Ok(Self {
            client,
            publish_url,
            user: config.user.clone(),
            password: config.password.clone(),
            exchange: config.exchange.clone(),
        })
    }

    /// The endpoint messages are posted to.
    pub fn publish_url(&self) -> &Url {
        &self.publish_url
    }
}

/// Builds the publish endpoint, percent-encoding vhost and exchange.
fn publish_url(base: &str, vhost: &str, exchange: &str) -> Result<Url, PublishError> {
    let mut url = Url::parse(base)
        .map_err(|e| PublishError::InvalidEndpoint(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| PublishError::InvalidEndpoint(format!("{base}: cannot be a base")))?
        .pop_if_empty()
        .extend(["api", "exchanges", vhost, exchange, "publish"]);
    Ok(url)
}

#[async_trait]
impl Publisher for RabbitMqPublisher {
    async fn publish(&self, routing_key: &str, body: &[u8]) -> Result<(), PublishError> {
        let (payload, payload_encoding) = match std::str::from_utf8(body) {
            Ok(text) => (text.to_string(), "string"),
            Err(_) => (
                base64::engine::general_purpose::STANDARD.encode(body),
                "base64",
            ),
        };

        let request = PublishRequest {
            properties: MessageProperties {
                content_type: "application/json",
                delivery_mode: DELIVERY_MODE_PERSISTENT,
            },
            routing_key,
            payload,
            payload_encoding,
        };

        let response = self
            .client
            .post(self.publish_url.clone())
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, routing_key, "Broker rejected message");
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let result: PublishResponse = response.json().await?;
        if result.routed {
            debug!(exchange = %self.exchange, routing_key, "Message routed");
        } else {
            warn!(exchange = %self.exchange, routing_key, "Message not routed to any queue");
        }

        Ok(())
    }
}
