//! Management API interface and mock implementation.
//!
//! The interface covers the calls the forwarder needs from vCenter:
//! - Property collectors and filters (change notification)
//! - Event history collectors (paged reads of new events)
//! - Server time
//!
//! A mock implementation is provided for testing and development.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use vcev_vmodl::{Composite, ManagedObjectRef, TypedNode};

use crate::error::UpstreamError;

/// Opaque change-notification version.
///
/// Only ever round-tripped to the server; the empty version asks for the
/// complete current state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriptionVersion(String);

impl SubscriptionVersion {
    /// The version used before any update has been seen.
    #[must_use]
    pub fn initial() -> Self {
        Self(String::new())
    }

    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn is_initial(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which properties of which object a filter watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    /// The watched object.
    pub object: ManagedObjectRef,

    /// Property paths on the object.
    pub paths: Vec<String>,

    /// Whether the server may report partial updates of the paths.
    pub partial_updates: bool,
}

impl FilterSpec {
    pub fn new(object: ManagedObjectRef, paths: &[&str]) -> Self {
        Self {
            object,
            paths: paths.iter().map(|p| (*p).to_string()).collect(),
            partial_updates: false,
        }
    }
}

/// Options for a wait call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitOptions {
    /// Return empty-handed after this many seconds; `None` waits indefinitely.
    pub max_wait_seconds: Option<u32>,
}

/// How a property changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Add,
    Remove,
    Assign,
    IndirectRemove,
}

impl ChangeOp {
    /// Parses the wire token (`add`, `remove`, `assign`, `indirectRemove`).
    pub fn from_wire(op: &str) -> Option<Self> {
        match op {
            "add" => Some(ChangeOp::Add),
            "remove" => Some(ChangeOp::Remove),
            "assign" => Some(ChangeOp::Assign),
            "indirectRemove" => Some(ChangeOp::IndirectRemove),
            _ => None,
        }
    }
}

/// A single property change.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub path: String,
    pub op: ChangeOp,
    pub value: TypedNode,
}

/// Result of a wait call that saw changes.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSet {
    pub version: SubscriptionVersion,
    pub changes: Vec<PropertyChange>,
}

impl UpdateSet {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: SubscriptionVersion::new(version),
            changes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_change(mut self, path: &str, op: ChangeOp, value: impl Into<TypedNode>) -> Self {
        self.changes.push(PropertyChange {
            path: path.to_string(),
            op,
            value: value.into(),
        });
        self
    }
}

/// Management API interface.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Current time on the server.
    async fn current_time(&self) -> Result<DateTime<Utc>, UpstreamError>;

    /// Create an event history collector returning events created at or
    /// after `begin_time`.
    async fn create_event_collector(
        &self,
        begin_time: DateTime<Utc>,
    ) -> Result<ManagedObjectRef, UpstreamError>;

    /// Create a property collector private to the caller.
    async fn create_property_collector(&self) -> Result<ManagedObjectRef, UpstreamError>;

    /// Register a filter on a property collector.
    async fn create_filter(
        &self,
        collector: &ManagedObjectRef,
        spec: &FilterSpec,
    ) -> Result<ManagedObjectRef, UpstreamError>;

    /// Block until the collector sees changes after `version`, or the wait
    /// times out (`Ok(None)`).
    async fn wait_for_updates(
        &self,
        collector: &ManagedObjectRef,
        version: &SubscriptionVersion,
        options: &WaitOptions,
    ) -> Result<Option<UpdateSet>, UpstreamError>;

    /// Destroy a property filter.
    async fn destroy_filter(&self, filter: &ManagedObjectRef) -> Result<(), UpstreamError>;

    /// Destroy a property collector created by `create_property_collector`.
    async fn destroy_property_collector(
        &self,
        collector: &ManagedObjectRef,
    ) -> Result<(), UpstreamError>;

    /// Read up to `max_count` events the collector has not returned yet.
    async fn read_next_events(
        &self,
        collector: &ManagedObjectRef,
        max_count: u32,
    ) -> Result<Vec<Composite>, UpstreamError>;

    /// Destroy an event history collector.
    async fn destroy_event_collector(
        &self,
        collector: &ManagedObjectRef,
    ) -> Result<(), UpstreamError>;
}

/// Ordered log of calls made against test doubles.
///
/// Shared between [`MockManagementApi`] and
/// [`RecordingPublisher`](crate::publisher::RecordingPublisher) so tests can
/// assert on the interleaving of waits, reads and publishes.
#[derive(Debug, Clone, Default)]
pub struct CallJournal(Arc<Mutex<Vec<String>>>);

impl CallJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of entries starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

type WaitResult = Result<Option<UpdateSet>, UpstreamError>;

/// Mock management API for testing and development.
///
/// Wait results and event pages are scripted up front. Once the wait script
/// runs out, further waits block forever, like a long poll on an idle
/// server; once the page script runs out, reads return no events.
pub struct MockManagementApi {
    journal: CallJournal,
    waits: Mutex<VecDeque<WaitResult>>,
    pages: Mutex<VecDeque<Vec<Composite>>>,
    server_time: DateTime<Utc>,
    fail_filters: bool,
    ids: AtomicU64,
}

impl MockManagementApi {
    /// Create a new mock with empty scripts.
    pub fn new() -> Self {
        Self {
            journal: CallJournal::new(),
            waits: Mutex::new(VecDeque::new()),
            pages: Mutex::new(VecDeque::new()),
            server_time: Utc::now(),
            fail_filters: false,
            ids: AtomicU64::new(0),
        }
    }

    /// Record calls into a shared journal.
    #[must_use]
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Fix the server time.
    #[must_use]
    pub fn with_server_time(mut self, time: DateTime<Utc>) -> Self {
        self.server_time = time;
        self
    }

    /// Make every `create_filter` call fail.
    #[must_use]
    pub fn failing_filters(mut self) -> Self {
        self.fail_filters = true;
        self
    }

    /// Script a wait that reports changes at `version`.
    #[must_use]
    pub fn with_update(self, version: &str) -> Self {
        self.push_wait(Ok(Some(UpdateSet::new(version))));
        self
    }

    /// Script a wait that times out.
    #[must_use]
    pub fn with_timeout(self) -> Self {
        self.push_wait(Ok(None));
        self
    }

    /// Script a failing wait.
    #[must_use]
    pub fn with_wait_error(self, message: &str) -> Self {
        self.push_wait(Err(UpstreamError::Fault {
            status: 500,
            message: message.to_string(),
        }));
        self
    }

    /// Script a page of events.
    #[must_use]
    pub fn with_page(self, events: Vec<Composite>) -> Self {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(events);
        self
    }

    pub fn journal(&self) -> &CallJournal {
        &self.journal
    }

    fn push_wait(&self, result: WaitResult) {
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    fn next_ref(&self, type_name: &str) -> ManagedObjectRef {
        let id = self.ids.fetch_add(1, Ordering::SeqCst);
        ManagedObjectRef::new(type_name, format!("{}-{}", type_name.to_lowercase(), id))
    }
}

impl Default for MockManagementApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManagementApi for MockManagementApi {
    async fn current_time(&self) -> Result<DateTime<Utc>, UpstreamError> {
        self.journal.record("current_time");
        Ok(self.server_time)
    }

    async fn create_event_collector(
        &self,
        begin_time: DateTime<Utc>,
    ) -> Result<ManagedObjectRef, UpstreamError> {
        self.journal.record("create_event_collector");
        let collector = self.next_ref("EventHistoryCollector");
        debug!(collector = %collector, begin_time = %begin_time, "[MOCK] Created event collector");
        Ok(collector)
    }

    async fn create_property_collector(&self) -> Result<ManagedObjectRef, UpstreamError> {
        self.journal.record("create_property_collector");
        Ok(self.next_ref("PropertyCollector"))
    }

    async fn create_filter(
        &self,
        _collector: &ManagedObjectRef,
        spec: &FilterSpec,
    ) -> Result<ManagedObjectRef, UpstreamError> {
        self.journal
            .record(format!("create_filter:{}:{}", spec.object, spec.paths.join(",")));
        if self.fail_filters {
            return Err(UpstreamError::Fault {
                status: 500,
                message: "InvalidProperty".to_string(),
            });
        }
        Ok(self.next_ref("PropertyFilter"))
    }

    async fn wait_for_updates(
        &self,
        _collector: &ManagedObjectRef,
        version: &SubscriptionVersion,
        options: &WaitOptions,
    ) -> Result<Option<UpdateSet>, UpstreamError> {
        self.journal.record(format!("wait:{version}"));
        let next = self
            .waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match next {
            Some(result) => result,
            None => {
                debug!(
                    max_wait_seconds = ?options.max_wait_seconds,
                    "[MOCK] Wait script exhausted, blocking"
                );
                std::future::pending().await
            }
        }
    }

    async fn destroy_filter(&self, filter: &ManagedObjectRef) -> Result<(), UpstreamError> {
        self.journal.record("destroy_filter");
        debug!(filter = %filter, "[MOCK] Destroyed filter");
        Ok(())
    }

    async fn destroy_property_collector(
        &self,
        _collector: &ManagedObjectRef,
    ) -> Result<(), UpstreamError> {
        self.journal.record("destroy_property_collector");
        Ok(())
    }

    async fn read_next_events(
        &self,
        _collector: &ManagedObjectRef,
        max_count: u32,
    ) -> Result<Vec<Composite>, UpstreamError> {
        self.journal.record(format!("read_next_events:{max_count}"));
        let page = self
            .pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_default();
        Ok(page)
    }

    async fn destroy_event_collector(
        &self,
        _collector: &ManagedObjectRef,
    ) -> Result<(), UpstreamError> {
        self.journal.record("destroy_event_collector");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_op_from_wire() {
        assert_eq!(ChangeOp::from_wire("assign"), Some(ChangeOp::Assign));
        assert_eq!(
            ChangeOp::from_wire("indirectRemove"),
            Some(ChangeOp::IndirectRemove)
        );
        assert_eq!(ChangeOp::from_wire("modify"), None);
    }

    #[test]
    fn test_initial_version() {
        assert!(SubscriptionVersion::initial().is_initial());
        assert!(!SubscriptionVersion::new("1").is_initial());
        assert_eq!(SubscriptionVersion::new("42").to_string(), "42");
    }

    #[tokio::test]
    async fn test_mock_scripts_waits_in_order() {
        let mock = MockManagementApi::new().with_update("1").with_timeout();
        let collector = mock.create_property_collector().await.unwrap();
        let options = WaitOptions::default();

        let first = mock
            .wait_for_updates(&collector, &SubscriptionVersion::initial(), &options)
            .await
            .unwrap();
        assert_eq!(first.unwrap().version.as_str(), "1");

        let second = mock
            .wait_for_updates(&collector, &SubscriptionVersion::new("1"), &options)
            .await
            .unwrap();
        assert!(second.is_none());

        assert_eq!(
            mock.journal().entries(),
            vec!["create_property_collector", "wait:", "wait:1"]
        );
    }

    #[tokio::test]
    async fn test_mock_pages_run_dry() {
        let mock = MockManagementApi::new().with_page(vec![Composite::new("VmPoweredOnEvent")]);
        let collector = mock.create_event_collector(Utc::now()).await.unwrap();
        assert_eq!(collector.type_name, "EventHistoryCollector");

        assert_eq!(mock.read_next_events(&collector, 100).await.unwrap().len(), 1);
        assert!(mock.read_next_events(&collector, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mock_failing_filters() {
        let mock = MockManagementApi::new().failing_filters();
        let collector = mock.create_property_collector().await.unwrap();
        let spec = FilterSpec::new(ManagedObjectRef::new("EventHistoryCollector", "c-1"), &["latestPage"]);

        let err = mock.create_filter(&collector, &spec).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Fault { status: 500, .. }));
        assert_eq!(mock.journal().count("create_filter:"), 1);
    }
}
