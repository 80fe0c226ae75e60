//! Event envelope - the message handed to the broker.

use serde::ser::{Serialize, SerializeMap, Serializer};
use vcev_vmodl::{Composite, TypedNode};

use crate::error::FlattenError;
use crate::flat::{FlatRecord, FlatValue};
use crate::flatten::flatten_event;

/// Envelope key holding the source vCenter.
pub const VCENTER_KEY: &str = "vcenter";

/// Envelope key holding the event identifier.
pub const EVENT_ID_KEY: &str = "event_id";

/// Event field holding the human readable message.
pub const MESSAGE_KEY: &str = "fullFormattedMessage";

/// Field carried by extensible events (`EventEx`, `ExtendedEvent`) naming
/// their registered event type.
const EVENT_TYPE_ID_FIELD: &str = "eventTypeId";

/// Returns the identifier used to route an event.
///
/// Extensible events carry an explicit type identifier
/// (e.g. `com.vmware.vc.HA.ClusterFailoverActionTriggeredEvent`); all other
/// events are identified by their type name.
pub fn event_id(event: &Composite) -> String {
    match event.field(EVENT_TYPE_ID_FIELD) {
        Some(TypedNode::Primitive(p)) => match p.as_str() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => event.type_name().to_string(),
        },
        _ => event.type_name().to_string(),
    }
}

/// A flattened event ready for publishing.
///
/// Serializes as a single JSON object: `vcenter` and `event_id` first, then
/// the event's own fields. Event fields named like the routing keys are
/// skipped so the routing keys always hold the envelope's values.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    /// The vCenter the event came from.
    pub vcenter: String,

    /// Event identifier; also the routing key.
    pub event_id: String,

    /// Flattened event fields.
    pub body: FlatRecord,
}

impl EventEnvelope {
    pub fn new(vcenter: impl Into<String>, event_id: impl Into<String>, body: FlatRecord) -> Self {
        Self {
            vcenter: vcenter.into(),
            event_id: event_id.into(),
            body,
        }
    }

    /// Flattens `event` and wraps it.
    pub fn from_event(vcenter: impl Into<String>, event: &Composite) -> Result<Self, FlattenError> {
        let body = flatten_event(event)?;
        Ok(Self::new(vcenter, event_id(event), body))
    }

    /// Routing key for the broker.
    pub fn routing_key(&self) -> &str {
        &self.event_id
    }

    /// The event's formatted message, if it has one.
    pub fn message(&self) -> Option<&str> {
        self.body.get(MESSAGE_KEY).and_then(FlatValue::as_text)
    }

    /// UTF-8 JSON encoding of the envelope.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, FlattenError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl Serialize for EventEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(VCENTER_KEY, &self.vcenter)?;
        map.serialize_entry(EVENT_ID_KEY, &self.event_id)?;
        for (key, value) in self.body.iter() {
            if key == VCENTER_KEY || key == EVENT_ID_KEY {
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
