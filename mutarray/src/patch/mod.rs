//! In-place patching of fixed array objects
//!
//! The writers here bypass the host's immutability and reference counting.
//! Each one validates every precondition first and only then touches memory,
//! so a returned error means nothing was written.

mod length;
mod slot;
mod splice;

use crate::{Kind, LayoutDescriptor, ObjectRef, ObjectType, PatchError, Value};

/// Slot writer, range splicer and length rewriter for one object layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Patcher {
    layout: LayoutDescriptor,
    array_type: ObjectType,
}

impl Patcher {
    pub fn new(layout: LayoutDescriptor) -> Self {
        Self::with_array_type(layout, ObjectType::Array)
    }

    /// Patcher that accepts objects tagged `array_type` as arrays.
    pub fn with_array_type(layout: LayoutDescriptor, array_type: ObjectType) -> Self {
        Self { layout, array_type }
    }

    #[inline]
    pub fn layout(&self) -> &LayoutDescriptor {
        &self.layout
    }

    #[inline]
    pub fn array_type(&self) -> ObjectType {
        self.array_type
    }

    #[inline]
    pub fn compute_slot_offset(&self, index: usize) -> usize {
        self.layout.slot_offset(index)
    }

    /// View `value` as an array, or say what it is instead.
    ///
    /// # Safety
    /// If `value` is a reference it must point at a live object laid out per
    /// this patcher's layout.
    unsafe fn array<'a>(&self, value: Value) -> Result<ObjectRef<'a>, PatchError> {
        if value.is_fixnum() {
            return Err(self.kind_error(Kind::Fixnum));
        }
        // SAFETY: forwarded from the caller
        let Some(object) = (unsafe { ObjectRef::from_value(value, self.layout) }) else {
            return Err(self.kind_error(Kind::Malformed(value.raw())));
        };
        if object.object_type() != Some(self.array_type) {
            return Err(self.kind_error(object.kind()));
        }
        Ok(object)
    }

    fn kind_error(&self, found: Kind) -> PatchError {
        PatchError::TypeKind {
            expected: self.array_type,
            found,
        }
    }
}

/// `index` as a slot number if it lies in `[0, length)`.
fn checked_index(index: isize, length: usize) -> Result<usize, PatchError> {
    match usize::try_from(index) {
        Ok(slot) if slot < length => Ok(slot),
        _ => Err(PatchError::IndexOutOfRange { index, length }),
    }
}
