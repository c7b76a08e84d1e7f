use crate::{ObjectRef, Ownership, PatchError, Value};

use super::{Patcher, checked_index, slot::write_slot};

impl Patcher {
    /// Overwrite `target[start_index..start_index + len(source)]` with the
    /// elements of `source`, left to right. An empty `source` writes nothing.
    ///
    /// Reference counts are left alone, as in [`Patcher::replace_at`].
    ///
    /// # Safety
    /// Every reference among `target` and `source` must point at a live
    /// object laid out per this patcher's layout, and no other thread may
    /// access either during the call.
    pub unsafe fn splice_from(
        &self,
        target: Value,
        source: Value,
        start_index: isize,
    ) -> Result<(), PatchError> {
        // SAFETY: forwarded from the caller
        let (target, source, start) = unsafe { self.splice_target(target, source, start_index)? };
        for j in 0..source.len() {
            // SAFETY: start + j < len(target) was checked
            unsafe { write_slot(target, start + j, source.get_unchecked(j)) };
        }
        Ok(())
    }

    /// Like [`Patcher::splice_from`], but every element of `source` is
    /// retained through `owner` before the writes and every displaced element
    /// is released after them.
    ///
    /// # Safety
    /// Same contract as [`Patcher::splice_from`].
    pub unsafe fn transfer_from(
        &self,
        owner: &mut impl Ownership,
        target: Value,
        source: Value,
        start_index: isize,
    ) -> Result<(), PatchError> {
        // SAFETY: forwarded from the caller
        let (target, source, start) = unsafe { self.splice_target(target, source, start_index)? };
        let incoming = source.to_vec();
        let displaced: Vec<Value> = (start..start + incoming.len())
            // SAFETY: checked against len(target)
            .map(|slot| unsafe { target.get_unchecked(slot) })
            .collect();

        incoming.iter().for_each(|&value| owner.retain(value));
        for (j, &value) in incoming.iter().enumerate() {
            // SAFETY: checked against len(target)
            unsafe { write_slot(target, start + j, value) };
        }
        displaced.into_iter().for_each(|value| owner.release(value));
        Ok(())
    }

    unsafe fn splice_target<'a>(
        &self,
        target: Value,
        source: Value,
        start_index: isize,
    ) -> Result<(ObjectRef<'a>, ObjectRef<'a>, usize), PatchError> {
        // SAFETY: forwarded from the caller
        let (target, source) = unsafe { (self.array(target)?, self.array(source)?) };
        let length = target.len();
        let start = checked_index(start_index, length)?;
        let requested = start.checked_add(source.len()).unwrap_or(usize::MAX);
        if requested > length {
            return Err(PatchError::Capacity {
                requested,
                capacity: length,
            });
        }
        Ok((target, source, start))
    }
}
