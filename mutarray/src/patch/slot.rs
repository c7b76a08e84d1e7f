use crate::{ObjectRef, Ownership, PatchError, Value};

use super::{Patcher, checked_index};

impl Patcher {
    /// Overwrite slot `index` of `target` with `new_element`.
    ///
    /// Neither the displaced nor the inserted element has its reference
    /// count adjusted. Every holder of `target` sees the new element.
    ///
    /// # Safety
    /// If `target` is a reference it must point at a live object laid out per
    /// this patcher's layout, and no other thread may access it during the call.
    pub unsafe fn replace_at(
        &self,
        target: Value,
        new_element: Value,
        index: isize,
    ) -> Result<(), PatchError> {
        // SAFETY: forwarded from the caller
        let (array, slot) = unsafe { self.slot_target(target, index)? };
        // SAFETY: slot < length
        unsafe { write_slot(array, slot, new_element) };
        Ok(())
    }

    /// Like [`Patcher::replace_at`], but moves ownership through `owner`:
    /// `new_element` is retained before the write, the displaced element is
    /// released after it. Returns the displaced element.
    ///
    /// # Safety
    /// Same contract as [`Patcher::replace_at`].
    pub unsafe fn transfer_at(
        &self,
        owner: &mut impl Ownership,
        target: Value,
        new_element: Value,
        index: isize,
    ) -> Result<Value, PatchError> {
        // SAFETY: forwarded from the caller
        let (array, slot) = unsafe { self.slot_target(target, index)? };
        // SAFETY: slot < length
        let displaced = unsafe { array.get_unchecked(slot) };
        owner.retain(new_element);
        // SAFETY: slot < length
        unsafe { write_slot(array, slot, new_element) };
        owner.release(displaced);
        Ok(displaced)
    }

    unsafe fn slot_target<'a>(
        &self,
        target: Value,
        index: isize,
    ) -> Result<(ObjectRef<'a>, usize), PatchError> {
        // SAFETY: forwarded from the caller
        let array = unsafe { self.array(target)? };
        let length = array.len();
        if length == 0 {
            return Err(PatchError::EmptyContainer);
        }
        let slot = checked_index(index, length)?;
        Ok((array, slot))
    }
}

/// # Safety
/// `slot` must be inside the allocated capacity of `array`.
#[inline]
pub(super) unsafe fn write_slot(array: ObjectRef<'_>, slot: usize, value: Value) {
    log::trace!(
        "slot {slot} of {:p} at +{}: {:#x} -> {:#x}",
        array.as_ptr(),
        array.layout().slot_offset(slot),
        // SAFETY: forwarded from the caller
        unsafe { array.get_unchecked(slot) }.raw(),
        value.raw()
    );
    // SAFETY: forwarded from the caller
    unsafe { array.set_unchecked(slot, value) };
}

#[cfg(test)]
mod tests {
    use crate::{Heap, Kind, ObjectType, PatchError, Value};

    fn fixnums(values: &[isize]) -> Vec<Value> {
        values.iter().copied().map(Value::from_fixnum).collect()
    }

    #[test]
    fn replace_middle_slot() {
        let mut heap = Heap::default();
        let t = heap.allocate_array(&fixnums(&[1, 2, 3, 4, 5])).unwrap();
        let patcher = heap.patcher();

        unsafe { patcher.replace_at(t, Value::from(315), 1) }.unwrap();

        assert_eq!(
            heap.view(t).unwrap().to_vec(),
            fixnums(&[1, 315, 3, 4, 5])
        );
    }

    #[test]
    fn replace_first_and_last() {
        let mut heap = Heap::default();
        let t = heap.allocate_array(&fixnums(&[1, 2, 3])).unwrap();
        let patcher = heap.patcher();

        unsafe {
            patcher.replace_at(t, Value::from(-1), 0).unwrap();
            patcher.replace_at(t, Value::from(-3), 2).unwrap();
        }

        assert_eq!(heap.view(t).unwrap().to_vec(), fixnums(&[-1, 2, -3]));
    }

    #[test]
    fn empty_array_rejected() {
        let mut heap = Heap::default();
        let t = heap.allocate_array(&[]).unwrap();
        let err = unsafe { heap.patcher().replace_at(t, Value::from(1), 0) }.unwrap_err();
        assert_eq!(err, PatchError::EmptyContainer);
    }

    #[test]
    fn out_of_range_leaves_array_untouched() {
        let mut heap = Heap::default();
        let t = heap.allocate_array(&fixnums(&[1, 2, 3])).unwrap();
        let patcher = heap.patcher();

        for index in [-1, 3, 100, isize::MIN] {
            let err = unsafe { patcher.replace_at(t, Value::from(9), index) }.unwrap_err();
            assert_eq!(err, PatchError::IndexOutOfRange { index, length: 3 });
        }
        assert_eq!(heap.view(t).unwrap().to_vec(), fixnums(&[1, 2, 3]));
    }

    #[test]
    fn wrong_kind_rejected() {
        let mut heap = Heap::default();
        let record = heap
            .allocate_object(ObjectType::Record, &fixnums(&[1, 2]), 2)
            .unwrap();
        let patcher = heap.patcher();

        let err = unsafe { patcher.replace_at(record, Value::from(9), 0) }.unwrap_err();
        assert_eq!(
            err,
            PatchError::TypeKind {
                expected: ObjectType::Array,
                found: Kind::Object(ObjectType::Record)
            }
        );
        assert_eq!(heap.view(record).unwrap().to_vec(), fixnums(&[1, 2]));

        let err = unsafe { patcher.replace_at(Value::from(5), Value::from(9), 0) }.unwrap_err();
        assert!(matches!(err, PatchError::TypeKind { found: Kind::Fixnum, .. }));
    }

    #[test]
    fn raw_replace_does_not_touch_refcounts() {
        let mut heap = Heap::default();
        let old = heap.allocate_object(ObjectType::Boxed, &[Value::from(1)], 1).unwrap();
        let new = heap.allocate_object(ObjectType::Boxed, &[Value::from(2)], 1).unwrap();
        let t = heap.allocate_array(&[old]).unwrap();
        assert_eq!(heap.refcount_of(old), Some(2));

        unsafe { heap.patcher().replace_at(t, new, 0) }.unwrap();

        assert_eq!(heap.refcount_of(old), Some(2));
        assert_eq!(heap.refcount_of(new), Some(1));
        assert_eq!(heap.refcount_of(t), Some(1));
        assert_eq!(
            heap.view(t).unwrap().object_type(),
            Some(ObjectType::Array)
        );
    }

    #[test]
    fn transfer_balances_refcounts() {
        let mut heap = Heap::default();
        let old = heap.allocate_object(ObjectType::Boxed, &[Value::from(1)], 1).unwrap();
        let new = heap.allocate_object(ObjectType::Boxed, &[Value::from(2)], 1).unwrap();
        let t = heap.allocate_array(&[old, Value::from(7)]).unwrap();
        heap.release(old);
        let patcher = heap.patcher();

        let displaced = unsafe { patcher.transfer_at(&mut heap, t, new, 0) }.unwrap();

        assert_eq!(displaced, old);
        assert!(!heap.is_live(old), "displaced element was freed");
        assert_eq!(heap.refcount_of(new), Some(2));
        assert_eq!(heap.view(t).unwrap().to_vec(), vec![new, Value::from(7)]);
    }

    #[test]
    fn transfer_same_element_keeps_it_alive() {
        let mut heap = Heap::default();
        let e = heap.allocate_object(ObjectType::Boxed, &[], 0).unwrap();
        let t = heap.allocate_array(&[e]).unwrap();
        heap.release(e);
        let patcher = heap.patcher();

        unsafe { patcher.transfer_at(&mut heap, t, e, 0) }.unwrap();

        assert!(heap.is_live(e));
        assert_eq!(heap.refcount_of(e), Some(1));
    }
}
