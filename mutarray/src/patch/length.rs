use crate::{PatchError, Value};

use super::Patcher;

impl Patcher {
    /// Overwrite the length field of `target` with `new_length`.
    ///
    /// Payload slots are neither moved nor cleared: after shrinking, the cut
    /// slots are still in memory but length-bounded access no longer reaches
    /// them. Only the kind and the range of the length field are checked.
    ///
    /// # Safety
    /// Same liveness contract as [`Patcher::replace_at`]. In addition
    /// `new_length` must not exceed the object's allocated slot capacity,
    /// which this call cannot see. Use [`Patcher::set_length_within`] or
    /// [`Heap::set_length`](crate::Heap::set_length) when the capacity is known.
    pub unsafe fn set_length(&self, target: Value, new_length: usize) -> Result<(), PatchError> {
        // SAFETY: forwarded from the caller
        let array = unsafe { self.array(target)? };
        let max_length = self.layout().max_length();
        if new_length > max_length {
            return Err(PatchError::Capacity {
                requested: new_length,
                capacity: max_length,
            });
        }
        log::debug!(
            "length of {:p}: {} -> {new_length}",
            array.as_ptr(),
            array.len()
        );
        // SAFETY: caller guarantees new_length fits the allocation
        unsafe { array.store_len(new_length) }
    }

    /// [`Patcher::set_length`] that refuses to grow past `capacity`.
    ///
    /// # Safety
    /// Same liveness contract as [`Patcher::replace_at`], and `capacity` must
    /// be the real slot capacity of `target`'s allocation.
    pub unsafe fn set_length_within(
        &self,
        target: Value,
        new_length: usize,
        capacity: usize,
    ) -> Result<(), PatchError> {
        // SAFETY: forwarded from the caller
        unsafe { self.array(target)? };
        if new_length > capacity {
            return Err(PatchError::Capacity {
                requested: new_length,
                capacity,
            });
        }
        // SAFETY: new_length <= capacity
        unsafe { self.set_length(target, new_length) }
    }
}
