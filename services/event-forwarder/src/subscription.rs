//! Change subscription on a single managed object.
//!
//! A subscription owns a private property collector with one filter on it.
//! The first wait after arming returns the complete current values of the
//! watched paths; later waits return only what changed since the version
//! the previous wait reported.
//!
//! Releasing destroys the filter and the collector. Call
//! [`ChangeSubscription::release`] on every exit path; if a subscription is
//! dropped while still armed (e.g. its task was aborted), the drop handler
//! schedules the same cleanup on the current tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use vcev_vmodl::ManagedObjectRef;

use crate::error::UpstreamError;
use crate::upstream::{FilterSpec, ManagementApi, SubscriptionVersion, UpdateSet, WaitOptions};

/// An armed change subscription.
pub struct ChangeSubscription {
    api: Arc<dyn ManagementApi>,
    object: ManagedObjectRef,
    collector: ManagedObjectRef,
    filter: ManagedObjectRef,
    version: SubscriptionVersion,
    armed: bool,
}

impl ChangeSubscription {
    /// Create a property collector and register a filter for `paths` on
    /// `object`.
    pub async fn arm(
        api: Arc<dyn ManagementApi>,
        object: ManagedObjectRef,
        paths: &[&str],
    ) -> Result<Self, UpstreamError> {
        let collector = api.create_property_collector().await?;
        let spec = FilterSpec::new(object.clone(), paths);

        let filter = match api.create_filter(&collector, &spec).await {
            Ok(filter) => filter,
            Err(e) => {
                if let Err(destroy_err) = api.destroy_property_collector(&collector).await {
                    warn!(
                        collector = %collector,
                        error = %destroy_err,
                        "Failed to destroy property collector after filter error"
                    );
                }
                return Err(e);
            }
        };

        info!(
            object = %object,
            collector = %collector,
            filter = %filter,
            paths = ?spec.paths,
            "Change subscription armed"
        );

        Ok(Self {
            api,
            object,
            collector,
            filter,
            version: SubscriptionVersion::initial(),
            armed: true,
        })
    }

    /// Version reported by the last wait that saw changes.
    pub fn version(&self) -> &SubscriptionVersion {
        &self.version
    }

    /// The watched object.
    pub fn object(&self) -> &ManagedObjectRef {
        &self.object
    }

    /// Wait for the next update.
    ///
    /// Returns `Ok(None)` when `timeout` elapses without changes; the version
    /// only advances when an update arrives. Dropping the returned future
    /// before it completes leaves the version untouched.
    pub async fn wait(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<UpdateSet>, UpstreamError> {
        let options = WaitOptions {
            max_wait_seconds: timeout.map(max_wait_seconds),
        };

        let update = self
            .api
            .wait_for_updates(&self.collector, &self.version, &options)
            .await?;

        match &update {
            Some(update) => {
                debug!(
                    previous_version = %self.version,
                    version = %update.version,
                    changes = update.changes.len(),
                    "Subscription update"
                );
                self.version = update.version.clone();
            }
            None => debug!(version = %self.version, "Subscription wait timed out"),
        }

        Ok(update)
    }

    /// Destroy the filter and the collector.
    ///
    /// Both are attempted; the first failure is returned.
    pub async fn release(mut self) -> Result<(), UpstreamError> {
        self.armed = false;
        let result = destroy(self.api.as_ref(), &self.filter, &self.collector).await;
        match &result {
            Ok(()) => info!(object = %self.object, "Change subscription released"),
            Err(e) => warn!(object = %self.object, error = %e, "Change subscription release failed"),
        }
        result
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        warn!(
            object = %self.object,
            collector = %self.collector,
            "Change subscription dropped while armed, scheduling cleanup"
        );

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(collector = %self.collector, "No runtime available, property collector leaked");
            return;
        };

        let api = Arc::clone(&self.api);
        let filter = self.filter.clone();
        let collector = self.collector.clone();
        handle.spawn(async move {
            if let Err(e) = destroy(api.as_ref(), &filter, &collector).await {
                warn!(collector = %collector, error = %e, "Deferred subscription cleanup failed");
            }
        });
    }
}

/// Whole seconds for the server-side wait, rounded up and never below one.
///
/// The server treats zero as a non-blocking poll.
fn max_wait_seconds(timeout: Duration) -> u32 {
    let secs = timeout
        .as_secs()
        .saturating_add(u64::from(timeout.subsec_nanos() > 0));
    u32::try_from(secs.max(1)).unwrap_or(u32::MAX)
}

async fn destroy(
    api: &dyn ManagementApi,
    filter: &ManagedObjectRef,
    collector: &ManagedObjectRef,
) -> Result<(), UpstreamError> {
    let filter_result = api.destroy_filter(filter).await;
    let collector_result = api.destroy_property_collector(collector).await;
    filter_result.and(collector_result)
}
