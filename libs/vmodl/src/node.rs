//! Object graph nodes.

use std::fmt;

use crate::descriptor::{FieldDescriptor, FieldFlags};
use crate::primitive::Primitive;

/// A value from the remote object model.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TypedNode {
    /// Unset value.
    #[default]
    Nil,

    /// Data object with named, typed fields.
    Composite(Composite),

    /// Managed object reference; identity only.
    Reference(ManagedObjectRef),

    /// Ordered, homogeneous list.
    Sequence(Sequence),

    /// Scalar value.
    Primitive(Primitive),
}

impl TypedNode {
    /// Returns true for `Nil`.
    pub fn is_nil(&self) -> bool {
        matches!(self, TypedNode::Nil)
    }

    /// Returns the composite if this node is one.
    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            TypedNode::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the primitive if this node is one.
    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            TypedNode::Primitive(p) => Some(p),
            _ => None,
        }
    }
}

impl From<Composite> for TypedNode {
    fn from(value: Composite) -> Self {
        TypedNode::Composite(value)
    }
}

impl From<ManagedObjectRef> for TypedNode {
    fn from(value: ManagedObjectRef) -> Self {
        TypedNode::Reference(value)
    }
}

impl From<Sequence> for TypedNode {
    fn from(value: Sequence) -> Self {
        TypedNode::Sequence(value)
    }
}

impl From<Primitive> for TypedNode {
    fn from(value: Primitive) -> Self {
        TypedNode::Primitive(value)
    }
}

macro_rules! node_from_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for TypedNode {
                fn from(value: $ty) -> Self {
                    TypedNode::Primitive(Primitive::from(value))
                }
            }
        )*
    };
}

node_from_primitive!(&str, String, i64, i32, f64, bool, chrono::DateTime<chrono::Utc>, Vec<u8>);

/// A field of a composite: descriptor plus value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub descriptor: FieldDescriptor,
    pub value: TypedNode,
}

/// A data object.
///
/// Fields keep their declared order; serialization walks them in that order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Composite {
    type_name: String,
    fields: Vec<Field>,
}

impl Composite {
    /// Creates an empty composite of the given type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// The data object's type name (e.g. `VmPoweredOnEvent`).
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Declared fields, in order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Appends a field.
    pub fn push_field(&mut self, descriptor: FieldDescriptor, value: TypedNode) {
        self.fields.push(Field { descriptor, value });
    }

    /// Appends a field without flags.
    #[must_use]
    pub fn with_field(
        mut self,
        name: &str,
        declared_type: &str,
        value: impl Into<TypedNode>,
    ) -> Self {
        self.push_field(FieldDescriptor::new(name, declared_type), value.into());
        self
    }

    /// Appends a field flagged LINK.
    #[must_use]
    pub fn with_link(
        mut self,
        name: &str,
        declared_type: &str,
        value: impl Into<TypedNode>,
    ) -> Self {
        self.push_field(
            FieldDescriptor::new(name, declared_type).with_flags(FieldFlags::LINK),
            value.into(),
        );
        self
    }

    /// Looks up a field value by name.
    pub fn field(&self, name: &str) -> Option<&TypedNode> {
        self.fields
            .iter()
            .find(|f| f.descriptor.name == name)
            .map(|f| &f.value)
    }

    /// Returns true if the composite has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Reference to a managed object on the server.
///
/// The server GUID is only set for references that cross vCenter instances
/// (linked mode); local references leave it unset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagedObjectRef {
    pub type_name: String,
    pub value: String,
    pub server_guid: Option<String>,
}

impl ManagedObjectRef {
    /// Creates a local reference.
    pub fn new(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: value.into(),
            server_guid: None,
        }
    }

    /// Sets the server GUID, making this a cross-server reference.
    #[must_use]
    pub fn with_server_guid(mut self, guid: impl Into<String>) -> Self {
        self.server_guid = Some(guid.into());
        self
    }
}

impl fmt::Display for ManagedObjectRef {
    /// `Type:moId`, or `Type:serverGuid:moId` for cross-server references.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.server_guid {
            Some(guid) => write!(f, "{}:{}:{}", self.type_name, guid, self.value),
            None => write!(f, "{}:{}", self.type_name, self.value),
        }
    }
}

/// An array value with its declared element type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sequence {
    pub element_type: String,
    pub items: Vec<TypedNode>,
}

impl Sequence {
    /// Creates a sequence of the given element type.
    pub fn new(element_type: impl Into<String>, items: Vec<TypedNode>) -> Self {
        Self {
            element_type: element_type.into(),
            items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_display() {
        let local = ManagedObjectRef::new("VirtualMachine", "vm-42");
        assert_eq!(local.to_string(), "VirtualMachine:vm-42");

        let remote = local.with_server_guid("6f2c0a7e");
        assert_eq!(remote.to_string(), "VirtualMachine:6f2c0a7e:vm-42");
    }

    #[test]
    fn test_composite_field_lookup() {
        let event = Composite::new("VmPoweredOnEvent")
            .with_field("key", "int", 17i64)
            .with_field("userName", "string", "VSPHERE.LOCAL\\admin");

        assert_eq!(event.type_name(), "VmPoweredOnEvent");
        assert_eq!(event.fields().len(), 2);
        assert_eq!(
            event.field("key"),
            Some(&TypedNode::Primitive(Primitive::Int(17)))
        );
        assert!(event.field("missing").is_none());
    }

    #[test]
    fn test_primitive_conversions() {
        assert_eq!(
            TypedNode::from(true),
            TypedNode::Primitive(Primitive::Bool(true))
        );
        assert_eq!(
            TypedNode::from("x"),
            TypedNode::Primitive(Primitive::String("x".to_string()))
        );
        assert!(TypedNode::default().is_nil());
    }

    #[test]
    fn test_link_field_flags() {
        let arg = Composite::new("Alarm").with_link("alarm", "Alarm", "alarm-1");
        assert!(arg.fields()[0].descriptor.flags.is_link());
    }
}
