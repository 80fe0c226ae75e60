//! Property tests for the flattening invariants.

use proptest::prelude::*;
use vcev_events::{flatten, FlatValue};
use vcev_vmodl::{Composite, FieldDescriptor, FieldFlags, ManagedObjectRef, Primitive, Sequence, TypedNode};

fn leaf() -> impl Strategy<Value = TypedNode> {
    prop_oneof![
        Just(TypedNode::Nil),
        ".{0,8}".prop_map(TypedNode::from),
        any::<bool>().prop_map(TypedNode::from),
        any::<i64>().prop_map(TypedNode::from),
        ("[A-Z][a-z]{0,6}", "[a-z]{1,4}-[0-9]{1,3}", proptest::option::of("[0-9a-f]{8}")).prop_map(
            |(ty, id, guid)| {
                let mut r = ManagedObjectRef::new(ty, id);
                r.server_guid = guid;
                TypedNode::Reference(r)
            }
        ),
        "[A-Za-z]{1,8}".prop_map(|s| TypedNode::Primitive(Primitive::Enum(s))),
    ]
}

fn node() -> impl Strategy<Value = TypedNode> {
    leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(("[a-z]{1,6}", inner.clone(), any::<bool>()), 0..6).prop_map(
                |fields| {
                    let mut composite = Composite::new("Data");
                    for (name, value, link) in fields {
                        let mut descriptor = FieldDescriptor::new(name, "anyType");
                        if link {
                            descriptor = descriptor.with_flags(FieldFlags::LINK);
                        }
                        composite.push_field(descriptor, value);
                    }
                    TypedNode::Composite(composite)
                }
            ),
            prop::collection::vec(inner, 0..6)
                .prop_map(|items| TypedNode::Sequence(Sequence::new("anyType", items))),
        ]
    })
}

fn assert_compacted(value: &FlatValue) {
    if let FlatValue::Record(record) = value {
        for (key, child) in record.iter() {
            assert!(!child.is_empty(), "empty value stored under {key:?}");
            assert_compacted(child);
        }
    }
}

proptest! {
    #[test]
    fn no_empty_value_is_ever_stored(node in node()) {
        let (_, value) = flatten(&node, &FieldDescriptor::root(), 0).unwrap();
        assert_compacted(&value);
    }

    #[test]
    fn link_composites_render_as_identity(node in node()) {
        let descriptor = FieldDescriptor::new("link", "Data").with_flags(FieldFlags::LINK);
        if let TypedNode::Composite(composite) = &node {
            let (_, value) = flatten(&node, &descriptor, 0).unwrap();
            let text = value.as_text().expect("link must render as text");
            let prefix = format!("{}:", composite.type_name());
            prop_assert!(text.starts_with(&prefix));
        }
    }

    #[test]
    fn sequence_keys_are_dense(items in prop::collection::vec(leaf(), 1..12)) {
        let (_, value) = flatten(
            &TypedNode::Sequence(Sequence::new("anyType", items)),
            &FieldDescriptor::root(),
            0,
        ).unwrap();
        if let FlatValue::Record(record) = value {
            for (index, key) in record.keys().enumerate() {
                prop_assert_eq!(key.to_string(), format!("data{}", index + 1));
            }
        }
    }
}
