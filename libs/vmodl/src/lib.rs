//! # vcev-vmodl
//!
//! The typed object model used by the vCenter management API.
//!
//! Every value read from the server is a [`TypedNode`]:
//!
//! - `Nil` for unset optional properties
//! - `Composite` for data objects (events, event arguments, specs)
//! - `Reference` for managed object references, which are never inlined
//! - `Sequence` for arrays, carrying their declared element type
//! - `Primitive` for strings, numbers, booleans, timestamps, binary blobs,
//!   type names and method references
//!
//! Composites do not rely on runtime reflection: each one carries an ordered
//! list of fields, and every field carries its own [`FieldDescriptor`]
//! (name, declared type and flags). Decoders build that table explicitly.

mod descriptor;
mod node;
mod primitive;

pub use descriptor::{FieldDescriptor, FieldFlags};
pub use node::{Composite, Field, ManagedObjectRef, Sequence, TypedNode};
pub use primitive::Primitive;
