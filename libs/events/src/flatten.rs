//! Type-directed conversion of typed nodes into flat records.
//!
//! Recursion is bounded by the structure of the input: references and links
//! are rendered as identity strings, so the object graph is a finite tree.

use chrono::{DateTime, Utc};
use vcev_vmodl::{Composite, FieldDescriptor, Primitive, Sequence, TypedNode};

use crate::error::FlattenError;
use crate::flat::{FlatRecord, FlatValue};

/// Flattens a node, returning the descriptor's name and the flat value.
///
/// `depth` counts the nesting level for diagnostics only; it does not bound
/// the recursion.
pub fn flatten(
    node: &TypedNode,
    descriptor: &FieldDescriptor,
    depth: usize,
) -> Result<(String, FlatValue), FlattenError> {
    let value = match node {
        TypedNode::Nil => FlatValue::Null,
        TypedNode::Composite(composite) if descriptor.flags.is_link() => {
            FlatValue::Text(link_identity(composite, descriptor, depth)?)
        }
        TypedNode::Composite(composite) => {
            FlatValue::Record(flatten_composite(composite, depth)?)
        }
        TypedNode::Reference(reference) => FlatValue::Text(reference.to_string()),
        TypedNode::Sequence(sequence) if sequence.is_empty() => FlatValue::Null,
        TypedNode::Sequence(sequence) => {
            FlatValue::Record(flatten_sequence(sequence, descriptor, depth)?)
        }
        TypedNode::Primitive(primitive) => {
            FlatValue::Text(primitive_text(primitive, descriptor, depth)?)
        }
    };

    Ok((descriptor.name.clone(), value))
}

/// Flattens an event at the root of a message.
pub fn flatten_event(event: &Composite) -> Result<FlatRecord, FlattenError> {
    flatten_composite(event, 0)
}

fn flatten_composite(composite: &Composite, depth: usize) -> Result<FlatRecord, FlattenError> {
    let mut record = FlatRecord::new();
    for field in composite.fields() {
        let (name, value) = flatten(&field.value, &field.descriptor, depth + 1)?;
        if !value.is_empty() {
            record.insert(name, value);
        }
    }
    Ok(record)
}

// Elements are anonymous, so every kept element gets the next `dataN` key.
// Empty elements are dropped and do not consume a number.
fn flatten_sequence(
    sequence: &Sequence,
    descriptor: &FieldDescriptor,
    depth: usize,
) -> Result<FlatRecord, FlattenError> {
    let element = descriptor.element(&sequence.element_type);
    let mut record = FlatRecord::new();
    let mut counter = 1usize;

    for item in &sequence.items {
        let (_, value) = flatten(item, &element, depth + 1)?;
        if value.is_empty() {
            continue;
        }
        record.insert(format!("data{counter}"), value);
        counter += 1;
    }

    Ok(record)
}

/// `Type:key` for a linked data object. A missing key leaves the key part empty.
fn link_identity(
    composite: &Composite,
    descriptor: &FieldDescriptor,
    depth: usize,
) -> Result<String, FlattenError> {
    let key = match composite.field("key") {
        Some(TypedNode::Primitive(p)) => primitive_text(p, descriptor, depth)?,
        Some(TypedNode::Reference(r)) => r.to_string(),
        _ => String::new(),
    };
    Ok(format!("{}:{}", composite.type_name(), key))
}

fn primitive_text(
    primitive: &Primitive,
    descriptor: &FieldDescriptor,
    depth: usize,
) -> Result<String, FlattenError> {
    let text = match primitive {
        Primitive::TypeName(name) => name.clone(),
        Primitive::UnresolvedMethod(name) => name.clone(),
        Primitive::Method {
            declaring_type,
            name,
        } => format!("{declaring_type}.{name}"),
        Primitive::Bool(true) => "true".to_string(),
        Primitive::Bool(false) => "false".to_string(),
        Primitive::DateTime(ts) => format_timestamp(ts),
        Primitive::Binary(bytes) => {
            String::from_utf8(bytes.clone()).map_err(|source| FlattenError::InvalidText {
                field: descriptor.name.clone(),
                depth,
                source,
            })?
        }
        Primitive::String(s) | Primitive::Enum(s) => s.clone(),
        Primitive::Int(n) => n.to_string(),
        Primitive::Float(n) => float_text(*n),
    };
    Ok(text)
}

/// Whole-number floats keep a `.0` suffix so they stay distinguishable from
/// integers (`1.0`, not `1`).
fn float_text(n: f64) -> String {
    let text = n.to_string();
    if n.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

/// ISO-8601 in UTC: `2024-03-05T10:15:30Z`, with a fractional part only when
/// the sub-second component is non-zero (trailing zeros trimmed).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    let mut out = ts.format("%Y-%m-%dT%H:%M:%S").to_string();
    let micros = ts.timestamp_subsec_micros();
    if micros != 0 {
        let fraction = format!("{micros:06}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out.push('Z');
    out
}
