use crate::{Allocator, Heap, ObjectRef, PatchError, Patcher, RustAllocator, Value};

/// Mutable access to an array that has exactly one reference.
///
/// Obtained through [`Heap::unique_mut`]. The heap stays mutably borrowed
/// while this exists, so no new reference to the array can be created and
/// nothing can observe it mid-edit. Unlike the raw [`Patcher`] calls,
/// every write here keeps reference counts balanced and every length change
/// is checked against the allocated capacity.
pub struct ArrayMut<'h, A: Allocator = RustAllocator> {
    heap: &'h mut Heap<A>,
    array: Value,
    patcher: Patcher,
}

impl<'h, A: Allocator> ArrayMut<'h, A> {
    pub(crate) fn new(heap: &'h mut Heap<A>, array: Value) -> Self {
        let patcher = heap.patcher();
        Self {
            heap,
            array,
            patcher,
        }
    }

    fn object(&self) -> ObjectRef<'_> {
        // SAFETY: the array is live and uniquely owned while the heap is borrowed
        unsafe { ObjectRef::from_value(self.array, *self.heap.layout()) }
            .unwrap_or_else(|| unreachable!("unique_mut only hands out references"))
    }

    #[inline]
    pub fn value(&self) -> Value {
        self.array
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.object().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.heap.capacity_of(self.array).unwrap_or(0)
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.object().get(index)
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.object().to_vec()
    }

    /// Store `value` at `index` and return the element it displaced.
    ///
    /// The returned value has already been released by this array; it is
    /// only safe to use if something else still holds it.
    pub fn replace(&mut self, index: usize, value: Value) -> Result<Value, PatchError> {
        self.check_element(value)?;
        let index = slot_index(index, self.len())?;
        // SAFETY: live array of this heap's layout, no other access while borrowed
        unsafe { self.patcher.transfer_at(&mut *self.heap, self.array, value, index) }
    }

    /// Overwrite `self[start..start + source.len()]` with `source`.
    pub fn splice(&mut self, start: usize, source: &[Value]) -> Result<(), PatchError> {
        for &value in source {
            self.check_element(value)?;
        }
        let length = self.len();
        let start_index = slot_index(start, length)?;
        if start >= length {
            return Err(PatchError::IndexOutOfRange {
                index: start_index,
                length,
            });
        }
        let requested = start.saturating_add(source.len());
        if requested > length {
            return Err(PatchError::Capacity {
                requested,
                capacity: length,
            });
        }

        let object = self.object();
        let displaced: Vec<Value> = (start..requested)
            // SAFETY: below length
            .map(|slot| unsafe { object.get_unchecked(slot) })
            .collect();
        source.iter().for_each(|&value| self.heap.retain(value));
        let object = self.object();
        for (j, &value) in source.iter().enumerate() {
            // SAFETY: below length
            unsafe { object.set_unchecked(start + j, value) };
        }
        displaced.into_iter().for_each(|value| self.heap.release(value));
        Ok(())
    }

    /// Shrink to `new_len`, releasing and clearing the cut slots. Does
    /// nothing if the array is already that short.
    pub fn truncate(&mut self, new_len: usize) {
        if let Err(err) = self.heap.shrink(self.array, new_len) {
            log::warn!("truncate of {:#x} failed: {err}", self.array.raw());
        }
    }

    /// Relabel the length. Growing exposes slots that were cleared by a
    /// shrink or never written, so they read as fixnum zero unless they were
    /// hidden by a raw [`Patcher::set_length`].
    pub fn set_length(&mut self, new_len: usize) -> Result<(), PatchError> {
        self.heap.set_length(self.array, new_len)
    }

    fn check_element(&self, value: Value) -> Result<(), PatchError> {
        match value.address() {
            Some(address) if !self.heap.is_live(value) => {
                Err(PatchError::UnknownObject { address })
            }
            _ => Ok(()),
        }
    }
}

fn slot_index(index: usize, length: usize) -> Result<isize, PatchError> {
    isize::try_from(index).map_err(|_| PatchError::IndexOutOfRange {
        index: isize::MAX,
        length,
    })
}
