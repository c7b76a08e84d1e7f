//! Errors raised by the patch primitives and the host heap.

use std::error::Error;
use std::fmt;

use crate::{Kind, ObjectType};

/// Every variant is raised before any memory is written, so the objects
/// involved are unchanged when one is returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchError {
    /// An argument is not of the expected array kind.
    TypeKind {
        /// The kind the operation works on.
        expected: ObjectType,
        /// What was passed instead.
        found: Kind,
    },
    /// Single-slot write into an array with no live slots.
    EmptyContainer,
    /// Index or start index outside `[0, length)`.
    IndexOutOfRange {
        /// The rejected index.
        index: isize,
        /// Length of the target at the time of the call.
        length: usize,
    },
    /// A write or length change would pass the permitted bound: the
    /// target's length for splices, the allocation capacity for length
    /// rewrites and allocations, the largest value a narrow header field
    /// can hold.
    Capacity {
        /// Slots the operation needs.
        requested: usize,
        /// Slots available.
        capacity: usize,
    },
    /// Field widths that cannot describe an object header.
    InvalidLayout {
        /// Which rule the configuration broke.
        reason: &'static str,
    },
    /// A reference the heap did not allocate or has already freed.
    UnknownObject {
        /// Untagged address of the reference.
        address: usize,
    },
    /// Mutable access to an array that other references can still observe.
    Shared {
        /// Current reference count.
        refcount: usize,
    },
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeKind { expected, found } => {
                write!(f, "expected {expected:?} object, found {found}")
            }
            Self::EmptyContainer => write!(f, "array can't be empty"),
            Self::IndexOutOfRange { index, length } => {
                write!(f, "index {index} out of range for length {length}")
            }
            Self::Capacity {
                requested,
                capacity,
            } => {
                write!(
                    f,
                    "capacity exceeded: requested {requested} slots, capacity {capacity} slots"
                )
            }
            Self::InvalidLayout { reason } => {
                write!(f, "invalid object layout: {reason}")
            }
            Self::UnknownObject { address } => {
                write!(f, "no live object at {address:#x}")
            }
            Self::Shared { refcount } => {
                write!(f, "array is shared ({refcount} references)")
            }
        }
    }
}

impl Error for PatchError {}
