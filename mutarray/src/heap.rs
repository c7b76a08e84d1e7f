//! Reference-counted host heap.
//!
//! This is the collaborator the patch primitives assume but never manage:
//! it allocates objects in the configured layout, keeps their reference
//! counts, records the real slot capacity of every allocation and frees an
//! object once its count reaches zero. Freeing an object releases the
//! elements in its live slots, so a slot overwritten by the raw writers
//! releases whatever it holds at that moment, not what it was built with.

use std::{
    alloc::{self, Layout},
    collections::HashMap,
    ptr::NonNull,
};

use crate::{
    ArrayMut, Kind, LayoutDescriptor, ObjectRef, ObjectType, Ownership, PatchError, Patcher, Value,
};

pub trait Allocator {
    fn allocate(&mut self, layout: Layout) -> NonNull<u8>;

    /// # Safety
    /// `ptr` must come from `allocate` on this allocator with the same `layout`.
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout);
}

/// Global allocator, memory zeroed.
#[derive(Debug, Default)]
pub struct RustAllocator;

impl Allocator for RustAllocator {
    fn allocate(&mut self, layout: Layout) -> NonNull<u8> {
        // SAFETY: object layouts always contain the header, so size > 0
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout))
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: by contract
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

#[derive(Debug, Copy, Clone)]
struct Allocation {
    layout: Layout,
    capacity: usize,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct HeapStats {
    pub allocated: usize,
    pub freed: usize,
    pub live: usize,
}

pub struct Heap<A: Allocator = RustAllocator> {
    allocator: A,
    layout: LayoutDescriptor,
    /// keyed by untagged object address
    live: HashMap<usize, Allocation>,
    allocated: usize,
    freed: usize,
}

impl Heap<RustAllocator> {
    pub fn new(layout: LayoutDescriptor) -> Self {
        Self::with_allocator(layout, RustAllocator)
    }
}

impl Default for Heap<RustAllocator> {
    fn default() -> Self {
        Self::new(LayoutDescriptor::native())
    }
}

impl<A: Allocator> Heap<A> {
    pub fn with_allocator(layout: LayoutDescriptor, allocator: A) -> Self {
        Self {
            allocator,
            layout,
            live: HashMap::new(),
            allocated: 0,
            freed: 0,
        }
    }

    #[inline]
    pub fn layout(&self) -> &LayoutDescriptor {
        &self.layout
    }

    /// Patcher for objects of this heap.
    #[inline]
    pub fn patcher(&self) -> Patcher {
        Patcher::new(self.layout)
    }

    pub fn allocate_array(&mut self, elements: &[Value]) -> Result<Value, PatchError> {
        self.allocate_object(ObjectType::Array, elements, elements.len())
    }

    pub fn allocate_array_with_capacity(
        &mut self,
        elements: &[Value],
        capacity: usize,
    ) -> Result<Value, PatchError> {
        self.allocate_object(ObjectType::Array, elements, capacity)
    }

    /// Allocate an object with refcount 1 holding `elements` in its first
    /// slots. Every referenced element is retained. Slots past the length
    /// read as fixnum zero.
    pub fn allocate_object(
        &mut self,
        ty: ObjectType,
        elements: &[Value],
        capacity: usize,
    ) -> Result<Value, PatchError> {
        if elements.len() > capacity {
            return Err(PatchError::Capacity {
                requested: elements.len(),
                capacity,
            });
        }
        if let Some(address) = elements.iter().find_map(|&e| self.dangling(e)) {
            return Err(PatchError::UnknownObject { address });
        }
        let max_length = self.layout.max_length();
        if capacity > max_length {
            return Err(PatchError::Capacity {
                requested: capacity,
                capacity: max_length,
            });
        }

        let layout = self.layout.object_layout(capacity)?;
        let base = self.allocator.allocate(layout);
        // SAFETY: freshly allocated with room for the header and `capacity` slots
        let object = unsafe { ObjectRef::from_raw(base, self.layout) };
        // SAFETY: as above
        let header = unsafe {
            object
                .store_refcount(1)
                .and_then(|()| object.store_type_tag(ty.tag()))
                .and_then(|()| object.store_len(elements.len()))
        };
        if let Err(err) = header {
            // SAFETY: allocated above with this layout, never published
            unsafe { self.allocator.deallocate(base, layout) };
            return Err(err);
        }
        for (slot, &element) in elements.iter().enumerate() {
            // SAFETY: slot < capacity
            unsafe { object.set_unchecked(slot, element) };
        }
        elements.iter().for_each(|&e| self.retain(e));

        self.live
            .insert(base.as_ptr() as usize, Allocation { layout, capacity });
        self.allocated += 1;
        log::debug!(
            "allocated {ty:?} at {:p}: length {}, capacity {capacity}",
            base.as_ptr(),
            elements.len()
        );
        // SAFETY: heap objects are pointer aligned
        Ok(unsafe { Value::from_ptr(base.as_ptr()) })
    }

    /// Address of `value` if it is a reference this heap does not own.
    fn dangling(&self, value: Value) -> Option<usize> {
        value
            .address()
            .filter(|address| !self.live.contains_key(address))
    }

    fn allocation(&self, value: Value) -> Option<(usize, Allocation)> {
        let address = value.address()?;
        self.live.get(&address).map(|a| (address, *a))
    }

    #[inline]
    pub fn is_live(&self, value: Value) -> bool {
        self.allocation(value).is_some()
    }

    /// View of a live object, `None` for fixnums and unknown addresses.
    pub fn view(&self, value: Value) -> Option<ObjectRef<'_>> {
        let (address, _) = self.allocation(value)?;
        let base = NonNull::new(address as *mut u8)?;
        // SAFETY: registered allocations are live until removed from `live`
        Some(unsafe { ObjectRef::from_raw(base, self.layout) })
    }

    pub fn capacity_of(&self, value: Value) -> Option<usize> {
        self.allocation(value).map(|(_, a)| a.capacity)
    }

    pub fn refcount_of(&self, value: Value) -> Option<usize> {
        self.view(value).map(|object| object.refcount())
    }

    #[inline]
    pub fn live_objects(&self) -> usize {
        self.live.len()
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            allocated: self.allocated,
            freed: self.freed,
            live: self.live.len(),
        }
    }

    /// Increment the reference count of a live object.
    pub fn retain(&mut self, value: Value) {
        if value.is_fixnum() {
            return;
        }
        let Some(object) = self.view(value) else {
            log::warn!("retain of unknown object {:#x}", value.raw());
            return;
        };
        let refcount = object.refcount().saturating_add(1);
        // SAFETY: live object
        if let Err(err) = unsafe { object.store_refcount(refcount) } {
            log::warn!("refcount of {:#x} pinned at its maximum: {err}", value.raw());
        }
    }

    /// Decrement the reference count of a live object, freeing it and
    /// releasing its live elements once the count reaches zero.
    pub fn release(&mut self, value: Value) {
        let mut pending = vec![value];
        while let Some(value) = pending.pop() {
            if value.is_fixnum() {
                continue;
            }
            let Some(object) = self.view(value) else {
                log::warn!("release of unknown object {:#x}", value.raw());
                continue;
            };
            let refcount = object.refcount().saturating_sub(1);
            // SAFETY: live object; a smaller count always fits the field
            if let Err(err) = unsafe { object.store_refcount(refcount) } {
                log::warn!("release of {:#x} failed: {err}", value.raw());
                continue;
            }
            if refcount == 0 {
                pending.extend(object.iter());
                self.free(value);
            }
        }
    }

    fn free(&mut self, value: Value) {
        let Some((address, allocation)) = self.allocation(value) else {
            return;
        };
        self.live.remove(&address);
        self.freed += 1;
        log::debug!("freed object at {address:#x}");
        if let Some(ptr) = NonNull::new(address as *mut u8) {
            // SAFETY: allocated by this allocator with this layout, now unregistered
            unsafe { self.allocator.deallocate(ptr, allocation.layout) };
        }
    }

    /// Rewrite the length of a live array, refusing to grow past the
    /// capacity it was allocated with.
    ///
    /// Shrinking releases the elements of the cut slots and clears them to
    /// fixnum zero, so growing again later never exposes a freed reference.
    /// Every holder of the array sees the new length.
    pub fn set_length(&mut self, value: Value, new_length: usize) -> Result<(), PatchError> {
        let object = self.view(value).ok_or_else(|| self.unknown(value))?;
        if object.object_type() != Some(ObjectType::Array) {
            return Err(PatchError::TypeKind {
                expected: ObjectType::Array,
                found: object.kind(),
            });
        }
        if new_length < object.len() {
            return self.shrink(value, new_length);
        }
        let capacity = self.capacity_of(value).unwrap_or(0);
        // SAFETY: live object of this heap's layout, capacity is the real one
        unsafe {
            self.patcher()
                .set_length_within(value, new_length, capacity)
        }
    }

    /// Cut a live object down to `new_length` slots, releasing and clearing
    /// what was cut. Does nothing if it is not longer than that.
    pub(crate) fn shrink(&mut self, value: Value, new_length: usize) -> Result<(), PatchError> {
        let object = self.view(value).ok_or_else(|| self.unknown(value))?;
        let length = object.len();
        if new_length >= length {
            return Ok(());
        }
        // SAFETY: live object, new_length < current length
        unsafe { object.store_len(new_length)? };
        let cut: Vec<Value> = (new_length..length)
            .map(|slot| {
                // SAFETY: below the old length
                let element = unsafe { object.get_unchecked(slot) };
                // SAFETY: below the old length
                unsafe { object.set_unchecked(slot, Value::zero()) };
                element
            })
            .collect();
        log::debug!("truncated {:p} from {length} to {new_length}", object.as_ptr());
        cut.into_iter().for_each(|element| self.release(element));
        Ok(())
    }

    /// Exclusive mutable access to an array nobody else references.
    pub fn unique_mut(&mut self, value: Value) -> Result<ArrayMut<'_, A>, PatchError> {
        let object = self.view(value).ok_or_else(|| self.unknown(value))?;
        if object.object_type() != Some(ObjectType::Array) {
            return Err(PatchError::TypeKind {
                expected: ObjectType::Array,
                found: object.kind(),
            });
        }
        let refcount = object.refcount();
        if refcount != 1 {
            return Err(PatchError::Shared { refcount });
        }
        Ok(ArrayMut::new(self, value))
    }

    fn unknown(&self, value: Value) -> PatchError {
        let found = match value.address() {
            Some(address) => return PatchError::UnknownObject { address },
            None if value.is_fixnum() => Kind::Fixnum,
            None => Kind::Malformed(value.raw()),
        };
        PatchError::TypeKind {
            expected: ObjectType::Array,
            found,
        }
    }
}

impl<A: Allocator> Ownership for Heap<A> {
    #[inline]
    fn retain(&mut self, value: Value) {
        Heap::retain(self, value);
    }

    #[inline]
    fn release(&mut self, value: Value) {
        Heap::release(self, value);
    }
}

impl<A: Allocator> Drop for Heap<A> {
    fn drop(&mut self) {
        if !self.live.is_empty() {
            log::debug!("dropping heap with {} live objects", self.live.len());
        }
        for (address, allocation) in self.live.drain() {
            if let Some(ptr) = NonNull::new(address as *mut u8) {
                // SAFETY: allocated by this allocator with this layout
                unsafe { self.allocator.deallocate(ptr, allocation.layout) };
            }
        }
    }
}
