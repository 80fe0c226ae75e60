//! vCenter event forwarder binary.
//!
//! Connects to vCenter, opens an event collector starting at the server's
//! current time and forwards every new event to RabbitMQ until SIGINT or
//! SIGTERM. Exits non-zero if the delivery loop fails.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vcev_forwarder::config::Config;
use vcev_forwarder::{EventForwarder, ForwarderConfig, ManagementApi, RabbitMqPublisher, VijsonClient};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // RUST_LOG wins over LOG_LEVEL
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("{},hyper=warn,reqwest=warn", config.log_level).into()
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        vcenter = %config.vcenter.host,
        broker = %config.broker.url,
        vhost = %config.broker.vhost,
        exchange = %config.broker.exchange,
        page_size = config.page_size,
        "Starting vCenter event forwarder"
    );

    let client = Arc::new(
        VijsonClient::connect(&config.vcenter)
            .await
            .context("failed to connect to vCenter")?,
    );

    let publisher = Arc::new(
        RabbitMqPublisher::new(&config.broker).context("failed to create broker publisher")?,
    );

    let begin_time = client
        .current_time()
        .await
        .context("failed to read vCenter time")?;
    let collector = client
        .create_event_collector(begin_time)
        .await
        .context("failed to create event collector")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let forwarder = EventForwarder::new(
        client.clone(),
        publisher,
        ForwarderConfig::from_config(&config),
    );
    let mut forwarder_handle =
        tokio::spawn(async move { forwarder.run(collector, shutdown_rx).await });

    let joined = tokio::select! {
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            (&mut forwarder_handle).await
        }
        result = &mut forwarder_handle => result,
    };

    let outcome = match joined {
        Ok(Ok(stats)) => {
            info!(
                updates = stats.updates,
                pages = stats.pages,
                published = stats.published,
                "Event forwarder stopped"
            );
            Ok(())
        }
        Ok(Err(e)) => Err(anyhow::Error::new(e).context("event delivery loop failed")),
        Err(e) => {
            error!(error = %e, "Event delivery task panicked");
            Err(anyhow::Error::new(e).context("event delivery task panicked"))
        }
    };

    if let Err(e) = client.logout().await {
        warn!(error = %e, "Failed to log out of vCenter");
    }

    outcome
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
