//! Per-field metadata.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Field flag bits, as declared by the management API type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldFlags(u32);

impl FieldFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);

    /// The field points at another data object by key; render by identity.
    pub const LINK: Self = Self(1);

    /// The field can be the target of a link.
    pub const LINKABLE: Self = Self(1 << 1);

    /// The field may be unset.
    pub const OPTIONAL: Self = Self(1 << 2);

    /// The field holds a secret.
    pub const SECRET: Self = Self(1 << 3);

    /// Creates flags from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Returns true if the LINK bit is set.
    #[must_use]
    pub const fn is_link(self) -> bool {
        self.contains(Self::LINK)
    }
}

impl BitOr for FieldFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FieldFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for FieldFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06b}", self.0)
    }
}

/// Metadata attached to a composite's field.
///
/// The root of a serialization and the elements of a sequence use an
/// anonymous descriptor (empty name).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldDescriptor {
    /// Field name; empty for anonymous positions.
    pub name: String,

    /// Declared wire type (e.g. `string`, `dateTime`, `ManagedEntity[]`).
    pub declared_type: String,

    /// Field flags.
    pub flags: FieldFlags,
}

impl FieldDescriptor {
    /// Creates a descriptor with no flags.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            flags: FieldFlags::NONE,
        }
    }

    /// The anonymous descriptor used at the root of a serialization.
    #[must_use]
    pub fn root() -> Self {
        Self::new("", "anyType")
    }

    /// Adds flags to the descriptor.
    #[must_use]
    pub fn with_flags(mut self, flags: FieldFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Returns true if the descriptor has no name.
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    /// Derives the anonymous descriptor for the elements of a sequence.
    ///
    /// Elements take the sequence's element type and inherit its flags.
    #[must_use]
    pub fn element(&self, element_type: &str) -> Self {
        Self {
            name: String::new(),
            declared_type: element_type.to_string(),
            flags: self.flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_contains() {
        let flags = FieldFlags::LINK | FieldFlags::OPTIONAL;
        assert!(flags.is_link());
        assert!(flags.contains(FieldFlags::OPTIONAL));
        assert!(!flags.contains(FieldFlags::SECRET));
        assert!(!FieldFlags::NONE.contains(FieldFlags::NONE));
        assert_eq!(flags.bits(), 0b101);
    }

    #[test]
    fn test_element_descriptor_inherits_flags() {
        let field = FieldDescriptor::new("vm", "VirtualMachine[]").with_flags(FieldFlags::LINK);
        let element = field.element("VirtualMachine");

        assert!(element.is_anonymous());
        assert_eq!(element.declared_type, "VirtualMachine");
        assert!(element.flags.is_link());
    }

    #[test]
    fn test_root_descriptor() {
        let root = FieldDescriptor::root();
        assert!(root.is_anonymous());
        assert_eq!(root.flags, FieldFlags::NONE);
    }
}
