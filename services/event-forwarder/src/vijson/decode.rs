//! VI/JSON payloads to typed nodes.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use vcev_vmodl::{Composite, ManagedObjectRef, Primitive, Sequence, TypedNode};

use super::schema::{Schema, EVENT_TYPE};
use crate::error::UpstreamError;
use crate::upstream::{ChangeOp, PropertyChange, SubscriptionVersion, UpdateSet};

const TYPE_NAME_KEY: &str = "_typeName";
const BOXED_VALUE_KEY: &str = "_value";
const MOREF_TYPE: &str = "ManagedObjectReference";

fn decode_error(detail: impl Into<String>) -> UpstreamError {
    UpstreamError::Decode(detail.into())
}

/// Decodes a value whose declared type is `declared_type`.
pub fn decode_node(
    schema: &Schema,
    value: &Value,
    declared_type: &str,
) -> Result<TypedNode, UpstreamError> {
    match value {
        Value::Null => Ok(TypedNode::Nil),
        Value::Object(map) => decode_object(schema, map, declared_type),
        Value::Array(items) => {
            let element_type = declared_type.strip_suffix("[]").unwrap_or("anyType");
            decode_sequence(schema, items, element_type)
        }
        Value::String(s) => decode_string(schema, s, declared_type),
        Value::Bool(b) => Ok(TypedNode::from(*b)),
        Value::Number(n) => {
            let float_declared = matches!(declared_type, "float" | "double");
            match n.as_i64() {
                Some(i) if !float_declared => Ok(TypedNode::from(i)),
                _ => n
                    .as_f64()
                    .map(TypedNode::from)
                    .ok_or_else(|| decode_error(format!("number out of range: {n}"))),
            }
        }
    }
}

/// Decodes one event returned by the event collector.
pub fn decode_event(schema: &Schema, value: &Value) -> Result<Composite, UpstreamError> {
    match decode_node(schema, value, EVENT_TYPE)? {
        TypedNode::Composite(event) => Ok(event),
        other => Err(decode_error(format!("expected an event object, got {other:?}"))),
    }
}

/// Decodes a `ManagedObjectReference` object.
pub fn decode_moref(value: &Value) -> Result<ManagedObjectRef, UpstreamError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct MoRefWire {
        #[serde(rename = "type")]
        type_name: String,
        value: String,
        #[serde(default)]
        server_guid: Option<String>,
    }

    let wire = MoRefWire::deserialize(value)
        .map_err(|e| decode_error(format!("invalid managed object reference: {e}")))?;
    Ok(ManagedObjectRef {
        type_name: wire.type_name,
        value: wire.value,
        server_guid: wire.server_guid.filter(|guid| !guid.is_empty()),
    })
}

/// Encodes a reference for a request body.
pub fn encode_moref(reference: &ManagedObjectRef) -> Value {
    let mut map = Map::new();
    map.insert(TYPE_NAME_KEY.to_string(), Value::from(MOREF_TYPE));
    map.insert("type".to_string(), Value::from(reference.type_name.as_str()));
    map.insert("value".to_string(), Value::from(reference.value.as_str()));
    if let Some(guid) = &reference.server_guid {
        map.insert("serverGuid".to_string(), Value::from(guid.as_str()));
    }
    Value::Object(map)
}

/// Decodes a `WaitForUpdatesEx` result.
pub fn decode_update_set(schema: &Schema, value: &Value) -> Result<UpdateSet, UpstreamError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct UpdateSetWire {
        version: String,
        #[serde(default)]
        filter_set: Vec<FilterUpdateWire>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct FilterUpdateWire {
        #[serde(default)]
        object_set: Vec<ObjectUpdateWire>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ObjectUpdateWire {
        #[serde(default)]
        change_set: Vec<PropertyChangeWire>,
    }

    #[derive(Deserialize)]
    struct PropertyChangeWire {
        name: String,
        op: String,
        #[serde(default)]
        val: Value,
    }

    let wire = UpdateSetWire::deserialize(value)
        .map_err(|e| decode_error(format!("invalid update set: {e}")))?;

    let mut update = UpdateSet {
        version: SubscriptionVersion::new(wire.version),
        changes: Vec::new(),
    };
    for change in wire
        .filter_set
        .into_iter()
        .flat_map(|f| f.object_set)
        .flat_map(|o| o.change_set)
    {
        let op = ChangeOp::from_wire(&change.op)
            .ok_or_else(|| decode_error(format!("unknown change op: {}", change.op)))?;
        update.changes.push(PropertyChange {
            value: decode_node(schema, &change.val, "anyType")?,
            path: change.name,
            op,
        });
    }
    Ok(update)
}

fn decode_object(
    schema: &Schema,
    map: &Map<String, Value>,
    declared_type: &str,
) -> Result<TypedNode, UpstreamError> {
    let type_name = map.get(TYPE_NAME_KEY).and_then(Value::as_str);

    match type_name {
        Some(MOREF_TYPE) => Ok(TypedNode::Reference(decode_moref(&Value::Object(
            map.clone(),
        ))?)),
        Some(boxed) if map.contains_key(BOXED_VALUE_KEY) => {
            let inner = &map[BOXED_VALUE_KEY];
            match boxed.strip_prefix("ArrayOf") {
                Some(element) => {
                    let element_type = primitive_type_name(element);
                    match inner {
                        Value::Array(items) => decode_sequence(schema, items, &element_type),
                        _ => Err(decode_error(format!("{boxed} without an array value"))),
                    }
                }
                None => decode_node(schema, inner, boxed),
            }
        }
        _ => {
            let type_name = type_name.unwrap_or(declared_type);
            let mut composite = Composite::new(type_name);
            for (key, value) in map {
                if key.starts_with('_') {
                    continue;
                }
                let descriptor = schema.descriptor(type_name, key, &inferred_type(value));
                let node = decode_node(schema, value, &descriptor.declared_type)?;
                composite.push_field(descriptor, node);
            }
            Ok(TypedNode::Composite(composite))
        }
    }
}

fn decode_sequence(
    schema: &Schema,
    items: &[Value],
    element_type: &str,
) -> Result<TypedNode, UpstreamError> {
    let items = items
        .iter()
        .map(|item| decode_node(schema, item, element_type))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TypedNode::Sequence(Sequence::new(element_type, items)))
}

fn decode_string(schema: &Schema, s: &str, declared_type: &str) -> Result<TypedNode, UpstreamError> {
    let primitive = match declared_type {
        "dateTime" => {
            let ts = DateTime::parse_from_rfc3339(s)
                .map_err(|e| decode_error(format!("invalid dateTime {s:?}: {e}")))?;
            Primitive::DateTime(ts.with_timezone(&Utc))
        }
        "base64Binary" => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|e| decode_error(format!("invalid base64Binary: {e}")))?;
            Primitive::Binary(bytes)
        }
        "TypeName" => Primitive::TypeName(s.to_string()),
        "MethodName" => Primitive::UnresolvedMethod(s.to_string()),
        ty if schema.is_enum(ty) => Primitive::Enum(s.to_string()),
        _ => Primitive::String(s.to_string()),
    };
    Ok(TypedNode::Primitive(primitive))
}

/// `ArrayOfString` names its element `String`; the element type is `string`.
fn primitive_type_name(element: &str) -> String {
    match element {
        "String" | "Int" | "Long" | "Short" | "Byte" | "Boolean" | "Float" | "Double"
        | "DateTime" | "AnyType" => {
            let mut chars = element.chars();
            match chars.next() {
                Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        }
        other => other.to_string(),
    }
}

fn inferred_type(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .get(TYPE_NAME_KEY)
            .and_then(Value::as_str)
            .unwrap_or("anyType")
            .to_string(),
        Value::Array(_) => "anyType[]".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(n) if n.is_i64() => "long".to_string(),
        Value::Number(_) => "double".to_string(),
        Value::Null => "anyType".to_string(),
    }
}
