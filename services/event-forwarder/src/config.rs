//! Configuration for the event forwarder.
//!
//! Everything comes from environment variables. The broker is reached
//! through the RabbitMQ management HTTP API, so its port is
//! `RABBIT_API_PORT` (default 15672). `RABBIT_PORT`, the AMQP listener port
//! of older deployments, is not read.

use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Default number of events read per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page the event collector accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Default long-poll duration for change waits.
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 60;

/// vCenter connection settings.
#[derive(Clone)]
pub struct VcenterConfig {
    /// Host name, or a full `http(s)://host[:port]` base URL.
    pub host: String,

    pub user: String,

    pub password: String,

    /// Accept self-signed certificates.
    pub insecure: bool,

    /// VI/JSON release path segment (e.g. `8.0.1.0`).
    pub api_release: String,
}

impl VcenterConfig {
    /// Base URL of the VI/JSON endpoint.
    pub fn sdk_url(&self) -> String {
        let base = if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.host)
        };
        format!("{}/sdk/vim25/{}", base, self.api_release)
    }
}

impl std::fmt::Debug for VcenterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcenterConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("insecure", &self.insecure)
            .field("api_release", &self.api_release)
            .finish()
    }
}

/// RabbitMQ management API settings.
#[derive(Clone)]
pub struct BrokerConfig {
    /// Management API base URL (e.g. `http://rabbit:15672`).
    pub url: String,

    pub user: String,

    pub password: String,

    pub vhost: String,

    pub exchange: String,
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .field("exchange", &self.exchange)
            .finish()
    }
}

/// Event forwarder configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub vcenter: VcenterConfig,

    pub broker: BrokerConfig,

    /// Events read per collector page.
    pub page_size: u32,

    /// Long-poll duration for change waits; `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => bail!("{key} must be set"),
            }
        };

        let vcenter = VcenterConfig {
            host: required("VCENTER")?,
            user: required("VSPHERE_USER")?,
            password: required("VSPHERE_PASSWORD")?,
            insecure: lookup("VSPHERE_INSECURE")
                .map(|v| parse_bool(&v).with_context(|| "VSPHERE_INSECURE"))
                .transpose()?
                .unwrap_or(false),
            api_release: lookup("VSPHERE_API_RELEASE").unwrap_or_else(|| "8.0.1.0".to_string()),
        };

        let rabbit_host = required("RABBIT_HOST")?;
        let rabbit_port: u16 = lookup("RABBIT_API_PORT")
            .map(|v| v.parse().with_context(|| format!("invalid RABBIT_API_PORT: {v}")))
            .transpose()?
            .unwrap_or(15672);
        let url = if rabbit_host.starts_with("http://") || rabbit_host.starts_with("https://") {
            format!("{}:{}", rabbit_host.trim_end_matches('/'), rabbit_port)
        } else {
            format!("http://{rabbit_host}:{rabbit_port}")
        };

        let broker = BrokerConfig {
            url,
            user: required("RABBIT_USER")?,
            password: required("RABBIT_PASSWORD")?,
            vhost: lookup("RABBIT_VHOST").unwrap_or_else(|| "vcenter_events".to_string()),
            exchange: lookup("RABBIT_EXCHANGE").unwrap_or_else(|| "vcenter.events".to_string()),
        };

        let page_size: u32 = lookup("EVENT_PAGE_SIZE")
            .map(|v| v.parse().with_context(|| format!("invalid EVENT_PAGE_SIZE: {v}")))
            .transpose()?
            .unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            bail!("EVENT_PAGE_SIZE must be between 1 and {MAX_PAGE_SIZE}, got {page_size}");
        }

        let wait_secs: u64 = lookup("WAIT_TIMEOUT_SECS")
            .map(|v| v.parse().with_context(|| format!("invalid WAIT_TIMEOUT_SECS: {v}")))
            .transpose()?
            .unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS);
        let wait_timeout = (wait_secs > 0).then(|| Duration::from_secs(wait_secs));

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            vcenter,
            broker,
            page_size,
            wait_timeout,
            log_level,
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("invalid boolean: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("VCENTER", "vc01.example.com"),
            ("VSPHERE_USER", "svc-events@vsphere.local"),
            ("VSPHERE_PASSWORD", "secret"),
            ("RABBIT_HOST", "rabbit"),
            ("RABBIT_USER", "guest"),
            ("RABBIT_PASSWORD", "guest"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&minimal())).unwrap();

        assert_eq!(config.vcenter.sdk_url(), "https://vc01.example.com/sdk/vim25/8.0.1.0");
        assert!(!config.vcenter.insecure);
        assert_eq!(config.broker.url, "http://rabbit:15672");
        assert_eq!(config.broker.vhost, "vcenter_events");
        assert_eq!(config.broker.exchange, "vcenter.events");
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.wait_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_missing_required() {
        let mut vars = minimal();
        vars.retain(|(k, _)| *k != "VSPHERE_PASSWORD");

        let err = Config::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(err.to_string().contains("VSPHERE_PASSWORD"));
    }

    #[test]
    fn test_overrides() {
        let mut vars = minimal();
        vars.extend([
            ("VCENTER", "http://127.0.0.1:8989/"),
            ("VSPHERE_INSECURE", "true"),
            ("RABBIT_API_PORT", "8080"),
            ("EVENT_PAGE_SIZE", "25"),
            ("WAIT_TIMEOUT_SECS", "0"),
        ]);

        let config = Config::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(config.vcenter.sdk_url(), "http://127.0.0.1:8989/sdk/vim25/8.0.1.0");
        assert!(config.vcenter.insecure);
        assert_eq!(config.broker.url, "http://rabbit:8080");
        assert_eq!(config.page_size, 25);
        assert_eq!(config.wait_timeout, None);
    }

    #[rstest]
    #[case("1", true)]
    #[case("true", true)]
    #[case(" YES ", true)]
    #[case("on", true)]
    #[case("0", false)]
    #[case("False", false)]
    #[case("no", false)]
    #[case("off", false)]
    #[case("", false)]
    fn test_parse_bool(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(parse_bool(input).unwrap(), expected);
    }

    #[rstest]
    #[case("maybe")]
    #[case("2")]
    fn test_parse_bool_rejects(#[case] input: &str) {
        assert!(parse_bool(input).is_err());
    }

    #[test]
    fn test_amqp_port_is_not_the_api_port() {
        let mut vars = minimal();
        vars.push(("RABBIT_PORT", "5672"));

        let config = Config::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(config.broker.url, "http://rabbit:15672");
    }

    #[test]
    fn test_invalid_api_port() {
        let mut vars = minimal();
        vars.push(("RABBIT_API_PORT", "http"));

        let err = Config::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(err.to_string().contains("RABBIT_API_PORT"));
    }

    #[test]
    fn test_page_size_bounds() {
        let mut vars = minimal();
        vars.push(("EVENT_PAGE_SIZE", "5000"));
        assert!(Config::from_lookup(lookup_from(&vars)).is_err());
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let config = Config::from_lookup(lookup_from(&minimal())).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
