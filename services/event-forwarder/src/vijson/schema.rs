//! Descriptor tables for data object types.
//!
//! VI/JSON payloads name each object's type (`_typeName`) but not the
//! declared types or flags of its fields. The schema supplies those for the
//! types the forwarder cares about; fields it does not know are decoded with
//! types inferred from the JSON value.

use std::collections::HashMap;

use vcev_vmodl::{FieldDescriptor, FieldFlags};

/// Declared type and flags of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub declared_type: String,
    pub flags: FieldFlags,
}

/// Per-type field tables with single inheritance.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: HashMap<String, HashMap<String, FieldSchema>>,
    parents: HashMap<String, String>,
    enums: Vec<String>,
}

/// Root of the event type hierarchy.
pub const EVENT_TYPE: &str = "Event";

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema for the `Event` hierarchy and its argument types.
    pub fn builtin() -> Self {
        let mut schema = Self::new();

        schema.register(
            EVENT_TYPE,
            None,
            &[
                ("key", "int"),
                ("chainId", "int"),
                ("createdTime", "dateTime"),
                ("userName", "string"),
                ("datacenter", "DatacenterEventArgument"),
                ("computeResource", "ComputeResourceEventArgument"),
                ("host", "HostEventArgument"),
                ("vm", "VmEventArgument"),
                ("ds", "DatastoreEventArgument"),
                ("net", "NetworkEventArgument"),
                ("dvs", "DvsEventArgument"),
                ("fullFormattedMessage", "string"),
                ("changeTag", "string"),
            ],
        );
        schema.register(
            "EventEx",
            Some(EVENT_TYPE),
            &[
                ("eventTypeId", "string"),
                ("severity", "string"),
                ("message", "string"),
                ("arguments", "KeyAnyValue[]"),
                ("objectId", "string"),
                ("objectType", "string"),
                ("objectName", "string"),
                ("fault", "LocalizedMethodFault"),
            ],
        );
        schema.register("GeneralEvent", Some(EVENT_TYPE), &[("message", "string")]);
        schema.register(
            "ExtendedEvent",
            Some("GeneralEvent"),
            &[
                ("eventTypeId", "string"),
                ("managedObject", "ManagedObjectReference"),
                ("data", "ExtendedEventPair[]"),
            ],
        );
        schema.register(
            "ExtendedEventPair",
            None,
            &[("key", "string"), ("value", "string")],
        );
        schema.register("KeyAnyValue", None, &[("key", "string"), ("value", "anyType")]);

        schema.register("EventArgument", None, &[]);
        schema.register("EntityEventArgument", Some("EventArgument"), &[("name", "string")]);
        for (arg, field, target) in [
            ("DatacenterEventArgument", "datacenter", "Datacenter"),
            ("ComputeResourceEventArgument", "computeResource", "ComputeResource"),
            ("HostEventArgument", "host", "HostSystem"),
            ("VmEventArgument", "vm", "VirtualMachine"),
            ("DatastoreEventArgument", "datastore", "Datastore"),
            ("NetworkEventArgument", "network", "Network"),
            ("DvsEventArgument", "dvs", "DistributedVirtualSwitch"),
            ("FolderEventArgument", "folder", "Folder"),
            ("ResourcePoolEventArgument", "resourcePool", "ResourcePool"),
            ("AlarmEventArgument", "alarm", "Alarm"),
            ("ScheduledTaskEventArgument", "scheduledTask", "ScheduledTask"),
        ] {
            schema.register(arg, Some("EntityEventArgument"), &[(field, target)]);
        }

        schema.register(
            "LocalizedMethodFault",
            None,
            &[("fault", "MethodFault"), ("localizedMessage", "string")],
        );

        schema.register_enum("EventEventSeverity");
        schema
    }

    /// Registers a type's own fields (without flags) and its parent.
    pub fn register(&mut self, type_name: &str, parent: Option<&str>, fields: &[(&str, &str)]) {
        let table = self.fields.entry(type_name.to_string()).or_default();
        for (name, declared_type) in fields {
            table.insert(
                (*name).to_string(),
                FieldSchema {
                    declared_type: (*declared_type).to_string(),
                    flags: FieldFlags::NONE,
                },
            );
        }
        if let Some(parent) = parent {
            self.parents.insert(type_name.to_string(), parent.to_string());
        }
    }

    /// Registers or replaces one field, with flags.
    pub fn register_field(
        &mut self,
        type_name: &str,
        field: &str,
        declared_type: &str,
        flags: FieldFlags,
    ) {
        self.fields.entry(type_name.to_string()).or_default().insert(
            field.to_string(),
            FieldSchema {
                declared_type: declared_type.to_string(),
                flags,
            },
        );
    }

    /// Marks a type name as an enumeration.
    pub fn register_enum(&mut self, type_name: &str) {
        self.enums.push(type_name.to_string());
    }

    pub fn is_enum(&self, type_name: &str) -> bool {
        self.enums.iter().any(|e| e == type_name)
    }

    /// Looks a field up on the type and its ancestors.
    ///
    /// Unregistered types whose name ends in `Event` resolve through the
    /// `Event` table, since every event type derives from it.
    pub fn field(&self, type_name: &str, field: &str) -> Option<&FieldSchema> {
        let mut current = Some(type_name);
        while let Some(ty) = current {
            if let Some(schema) = self.fields.get(ty).and_then(|t| t.get(field)) {
                return Some(schema);
            }
            current = self.parent(ty);
        }
        None
    }

    /// Builds the descriptor for a field, inferring its type when unknown.
    pub fn descriptor(&self, type_name: &str, field: &str, inferred_type: &str) -> FieldDescriptor {
        match self.field(type_name, field) {
            Some(schema) => {
                FieldDescriptor::new(field, schema.declared_type.as_str()).with_flags(schema.flags)
            }
            None => FieldDescriptor::new(field, inferred_type),
        }
    }

    fn parent(&self, type_name: &str) -> Option<&str> {
        match self.parents.get(type_name) {
            Some(parent) => Some(parent.as_str()),
            None if type_name != EVENT_TYPE
                && !self.fields.contains_key(type_name)
                && type_name.ends_with("Event") =>
            {
                Some(EVENT_TYPE)
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inherited_fields() {
        let schema = Schema::builtin();

        let created = schema.field("EventEx", "createdTime").unwrap();
        assert_eq!(created.declared_type, "dateTime");

        let name = schema.field("VmEventArgument", "name").unwrap();
        assert_eq!(name.declared_type, "string");

        let data = schema.field("ExtendedEvent", "data").unwrap();
        assert_eq!(data.declared_type, "ExtendedEventPair[]");
    }

    #[test]
    fn test_unregistered_events_resolve_through_event() {
        let schema = Schema::builtin();
        let created = schema.field("VmPoweredOnEvent", "createdTime").unwrap();
        assert_eq!(created.declared_type, "dateTime");
        assert!(schema.field("VmPoweredOnEvent", "template").is_none());
        assert!(schema.field("HostConnectInfo", "createdTime").is_none());
    }

    #[test]
    fn test_register_field_with_flags() {
        let mut schema = Schema::new();
        schema.register_field("AlarmSettingEvent", "setting", "AlarmSetting", FieldFlags::LINK);

        let descriptor = schema.descriptor("AlarmSettingEvent", "setting", "anyType");
        assert!(descriptor.flags.is_link());
        assert_eq!(descriptor.declared_type, "AlarmSetting");

        let inferred = schema.descriptor("AlarmSettingEvent", "other", "string");
        assert_eq!(inferred.declared_type, "string");
        assert!(!inferred.flags.is_link());
    }
}
