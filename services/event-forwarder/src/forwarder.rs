//! Event delivery loop.
//!
//! The forwarder:
//! - Subscribes to the event collector's `latestPage` property
//! - Discards the first (baseline) update, which describes events that
//!   existed before the loop started
//! - On every later update, pages through the collector's new events
//! - Flattens each event, wraps it in an envelope and publishes it before
//!   touching the next one
//!
//! The loop only stops on shutdown or on the first error. The subscription
//! and the event collector are destroyed on every exit path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};
use vcev_events::EventEnvelope;
use vcev_vmodl::{Composite, ManagedObjectRef};

use crate::config::{Config, DEFAULT_PAGE_SIZE, DEFAULT_WAIT_TIMEOUT_SECS};
use crate::error::{ForwardError, UpstreamError};
use crate::publisher::Publisher;
use crate::subscription::ChangeSubscription;
use crate::upstream::{ManagementApi, UpdateSet};

/// Collector property that changes whenever new events arrive.
pub const LATEST_PAGE: &str = "latestPage";

/// Delivery loop configuration.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Identity of the monitored vCenter, stamped on every envelope.
    pub vcenter: String,

    /// Events read per collector page.
    pub page_size: u32,

    /// Long-poll duration for change waits.
    pub wait_timeout: Option<Duration>,
}

impl ForwarderConfig {
    pub fn new(vcenter: impl Into<String>) -> Self {
        Self {
            vcenter: vcenter.into(),
            page_size: DEFAULT_PAGE_SIZE,
            wait_timeout: Some(Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            vcenter: config.vcenter.host.clone(),
            page_size: config.page_size,
            wait_timeout: config.wait_timeout,
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    /// Updates received after the baseline.
    pub updates: u64,

    /// Non-empty pages read.
    pub pages: u64,

    /// Events published.
    pub published: u64,
}

enum Wake {
    Shutdown,
    Update(Option<UpdateSet>),
}

/// Forwards events from one event collector to the broker.
pub struct EventForwarder {
    api: Arc<dyn ManagementApi>,
    publisher: Arc<dyn Publisher>,
    config: ForwarderConfig,
}

impl EventForwarder {
    pub fn new(
        api: Arc<dyn ManagementApi>,
        publisher: Arc<dyn Publisher>,
        config: ForwarderConfig,
    ) -> Self {
        Self {
            api,
            publisher,
            config,
        }
    }

    /// Run until shutdown or the first error.
    ///
    /// Takes ownership of `collector`: it is destroyed before this returns,
    /// or scheduled for destruction if this future is dropped first.
    pub async fn run(
        &self,
        collector: ManagedObjectRef,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ForwarderStats, ForwardError> {
        info!(
            vcenter = %self.config.vcenter,
            collector = %collector,
            page_size = self.config.page_size,
            wait_timeout_secs = self.config.wait_timeout.map(|t| t.as_secs()),
            "Starting event delivery loop"
        );

        let guard = CollectorGuard::new(Arc::clone(&self.api), collector);
        let result = self.run_subscription(guard.collector(), &mut shutdown).await;

        let collector = guard.collector().clone();
        match guard.destroy().await {
            Ok(()) => info!(collector = %collector, "Event collector destroyed"),
            Err(e) => {
                warn!(collector = %collector, error = %e, "Failed to destroy event collector");
                if result.is_ok() {
                    return Err(e.into());
                }
            }
        }

        if let Err(e) = &result {
            error!(kind = e.kind(), error = %e, "Event delivery loop failed");
        }
        result
    }

    async fn run_subscription(
        &self,
        collector: &ManagedObjectRef,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<ForwarderStats, ForwardError> {
        let mut subscription =
            ChangeSubscription::arm(Arc::clone(&self.api), collector.clone(), &[LATEST_PAGE])
                .await?;

        let mut stats = ForwarderStats::default();
        let result = self
            .pump(&mut subscription, collector, shutdown, &mut stats)
            .await;
        let released = subscription.release().await;

        info!(
            updates = stats.updates,
            pages = stats.pages,
            published = stats.published,
            "Event delivery loop stopped"
        );

        match (result, released) {
            (Ok(()), Ok(())) => Ok(stats),
            (Ok(()), Err(e)) => Err(e.into()),
            (Err(e), _) => Err(e),
        }
    }

    async fn pump(
        &self,
        subscription: &mut ChangeSubscription,
        collector: &ManagedObjectRef,
        shutdown: &mut watch::Receiver<bool>,
        stats: &mut ForwarderStats,
    ) -> Result<(), ForwardError> {
        // The baseline describes events from before the collector's start time.
        match self.next_update(subscription, shutdown).await? {
            Wake::Shutdown => return Ok(()),
            Wake::Update(_) => debug!(version = %subscription.version(), "Discarded baseline update"),
        }

        loop {
            match self.next_update(subscription, shutdown).await? {
                Wake::Shutdown => return Ok(()),
                Wake::Update(None) => trace!("No new events"),
                Wake::Update(Some(update)) => {
                    stats.updates += 1;
                    debug!(
                        version = %update.version,
                        changes = update.changes.len(),
                        "Event collector changed"
                    );
                    self.drain(collector, stats).await?;
                }
            }
        }
    }

    /// Wait for the next update unless shutdown is requested first.
    async fn next_update(
        &self,
        subscription: &mut ChangeSubscription,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Wake, UpstreamError> {
        loop {
            if *shutdown.borrow_and_update() {
                info!("Event delivery loop shutting down");
                return Ok(Wake::Shutdown);
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown channel closed");
                        return Ok(Wake::Shutdown);
                    }
                }
                update = subscription.wait(self.config.wait_timeout) => {
                    return Ok(Wake::Update(update?));
                }
            }
        }
    }

    /// Read and publish pages until the collector has caught up.
    async fn drain(
        &self,
        collector: &ManagedObjectRef,
        stats: &mut ForwarderStats,
    ) -> Result<(), ForwardError> {
        loop {
            let page = self
                .api
                .read_next_events(collector, self.config.page_size)
                .await?;
            if page.is_empty() {
                return Ok(());
            }

            stats.pages += 1;
            let full = page.len() >= self.config.page_size as usize;
            debug!(events = page.len(), full, "Read event page");

            for event in &page {
                self.deliver(event).await?;
                stats.published += 1;
            }

            if !full {
                return Ok(());
            }
        }
    }

    async fn deliver(&self, event: &Composite) -> Result<(), ForwardError> {
        let envelope = EventEnvelope::from_event(self.config.vcenter.as_str(), event)?;
        let body = envelope.to_json_bytes()?;

        self.publisher
            .publish(envelope.routing_key(), &body)
            .await?;

        debug!(
            vcenter = %envelope.vcenter,
            event_id = %envelope.event_id,
            message = envelope.message().unwrap_or_default(),
            "Event published"
        );
        Ok(())
    }
}

/// Owns the event collector for the duration of a run.
///
/// If the run future is dropped before [`CollectorGuard::destroy`] is
/// reached (timeout, task abort, panic), the drop handler schedules the
/// destroy call on the current tokio runtime.
struct CollectorGuard {
    api: Arc<dyn ManagementApi>,
    collector: ManagedObjectRef,
    armed: bool,
}

impl CollectorGuard {
    fn new(api: Arc<dyn ManagementApi>, collector: ManagedObjectRef) -> Self {
        Self {
            api,
            collector,
            armed: true,
        }
    }

    fn collector(&self) -> &ManagedObjectRef {
        &self.collector
    }

    async fn destroy(mut self) -> Result<(), UpstreamError> {
        self.armed = false;
        self.api.destroy_event_collector(&self.collector).await
    }
}

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        warn!(collector = %self.collector, "Delivery loop dropped, scheduling event collector cleanup");

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(collector = %self.collector, "No runtime available, event collector leaked");
            return;
        };

        let api = Arc::clone(&self.api);
        let collector = self.collector.clone();
        handle.spawn(async move {
            if let Err(e) = api.destroy_event_collector(&collector).await {
                warn!(collector = %collector, error = %e, "Deferred event collector cleanup failed");
            }
        });
    }
}
