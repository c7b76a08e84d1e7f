use std::{fmt, marker::PhantomData, ptr::NonNull};

use crate::{LayoutDescriptor, PatchError, Value, layout::field_max};

/// Type tags written into the `type_tag` header field.
#[rustfmt::skip]
#[repr(usize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Array  = 0b0010,
    Record = 0b0011,
    Boxed  = 0b0100,
}

impl ObjectType {
    #[inline]
    pub const fn tag(self) -> usize {
        self as usize
    }

    pub const fn from_tag(tag: usize) -> Option<Self> {
        Some(match tag {
            0b0010 => Self::Array,
            0b0011 => Self::Record,
            0b0100 => Self::Boxed,
            _ => return None,
        })
    }
}

/// What a value turned out to be when an array was expected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    Fixnum,
    Object(ObjectType),
    /// Object whose type tag is not one of [`ObjectType`].
    Unknown(usize),
    /// Word that is neither a fixnum nor a usable reference.
    Malformed(usize),
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixnum => write!(f, "fixnum"),
            Self::Object(ty) => write!(f, "{ty:?} object"),
            Self::Unknown(tag) => write!(f, "object with unknown tag {tag:#x}"),
            Self::Malformed(raw) => write!(f, "malformed word {raw:#x}"),
        }
    }
}

/// Raw view of one object's header and slots.
///
/// Reads go straight to memory through the layout's offsets, so a view
/// always observes the latest state, including writes made through other
/// views of the same object.
#[derive(Copy, Clone)]
pub struct ObjectRef<'a> {
    base: NonNull<u8>,
    layout: LayoutDescriptor,
    _marker: PhantomData<&'a ()>,
}

impl<'a> ObjectRef<'a> {
    /// # Safety
    /// `base` must point at a live object laid out per `layout` for all of `'a`.
    #[inline]
    pub unsafe fn from_raw(base: NonNull<u8>, layout: LayoutDescriptor) -> Self {
        Self {
            base,
            layout,
            _marker: PhantomData,
        }
    }

    /// View of the object a reference points to, `None` for fixnums.
    ///
    /// # Safety
    /// If `value` is a reference, the object behind it must be live and laid
    /// out per `layout` for all of `'a`.
    pub unsafe fn from_value(value: Value, layout: LayoutDescriptor) -> Option<Self> {
        let base = NonNull::new(value.as_ptr()?)?;
        // SAFETY: forwarded from the caller
        Some(unsafe { Self::from_raw(base, layout) })
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub fn layout(&self) -> &LayoutDescriptor {
        &self.layout
    }

    #[inline]
    pub fn refcount(&self) -> usize {
        // SAFETY: header fields are inside every live object
        unsafe { self.load(self.layout.refcount_offset(), self.layout.refcount_width()) }
    }

    #[inline]
    pub fn type_tag(&self) -> usize {
        // SAFETY: header fields are inside every live object
        unsafe { self.load(self.layout.type_tag_offset(), self.layout.type_tag_width()) }
    }

    #[inline]
    pub fn object_type(&self) -> Option<ObjectType> {
        ObjectType::from_tag(self.type_tag())
    }

    pub fn kind(&self) -> Kind {
        match self.object_type() {
            Some(ty) => Kind::Object(ty),
            None => Kind::Unknown(self.type_tag()),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        // SAFETY: header fields are inside every live object
        unsafe { self.load(self.layout.length_offset(), self.layout.length_width()) }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<Value> {
        if index < self.len() {
            // SAFETY: checked against length
            Some(unsafe { self.get_unchecked(index) })
        } else {
            None
        }
    }

    /// # Safety
    /// `index` must be inside the object's allocated capacity.
    #[inline]
    pub unsafe fn get_unchecked(&self, index: usize) -> Value {
        // SAFETY: caller guarantees the slot is allocated
        unsafe {
            let word = self
                .base
                .as_ptr()
                .add(self.layout.slot_offset(index))
                .cast::<usize>()
                .read();
            Value::from_raw(word)
        }
    }

    /// Length-bounded iteration over the live slots.
    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        // SAFETY: every index is below length
        (0..self.len()).map(move |index| unsafe { self.get_unchecked(index) })
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.iter().collect()
    }

    /// # Safety
    /// `index` must be inside the object's allocated capacity.
    #[inline]
    pub(crate) unsafe fn set_unchecked(&self, index: usize, value: Value) {
        // SAFETY: caller guarantees the slot is allocated
        unsafe {
            self.base
                .as_ptr()
                .add(self.layout.slot_offset(index))
                .cast::<usize>()
                .write(value.raw())
        };
    }

    /// # Safety
    /// Writing a length past the allocated capacity exposes memory outside
    /// the object to every length-bounded access.
    #[inline]
    pub(crate) unsafe fn store_len(&self, length: usize) -> Result<(), PatchError> {
        // SAFETY: header fields are inside every live object
        unsafe {
            self.store(
                self.layout.length_offset(),
                self.layout.length_width(),
                length,
            )
        }
    }

    #[inline]
    pub(crate) unsafe fn store_refcount(&self, refcount: usize) -> Result<(), PatchError> {
        // SAFETY: header fields are inside every live object
        unsafe {
            self.store(
                self.layout.refcount_offset(),
                self.layout.refcount_width(),
                refcount,
            )
        }
    }

    #[inline]
    pub(crate) unsafe fn store_type_tag(&self, tag: usize) -> Result<(), PatchError> {
        // SAFETY: header fields are inside every live object
        unsafe {
            self.store(
                self.layout.type_tag_offset(),
                self.layout.type_tag_width(),
                tag,
            )
        }
    }

    unsafe fn load(&self, offset: usize, width: usize) -> usize {
        // SAFETY: LayoutDescriptor keeps every field aligned to its width
        unsafe {
            let field = self.base.as_ptr().add(offset);
            match width {
                4 => field.cast::<u32>().read() as usize,
                _ => field.cast::<u64>().read() as usize,
            }
        }
    }

    /// Values that do not fit the field are rejected before anything is written.
    unsafe fn store(&self, offset: usize, width: usize, value: usize) -> Result<(), PatchError> {
        // SAFETY: offset is a header field offset of this layout
        let field = unsafe { self.base.as_ptr().add(offset) };
        match width {
            4 => {
                let narrow = u32::try_from(value).map_err(|_| PatchError::Capacity {
                    requested: value,
                    capacity: field_max(width),
                })?;
                // SAFETY: LayoutDescriptor keeps every field aligned to its width
                unsafe { field.cast::<u32>().write(narrow) };
            }
            // SAFETY: LayoutDescriptor keeps every field aligned to its width
            _ => unsafe { field.cast::<u64>().write(value as u64) },
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("address", &self.base)
            .field("refcount", &self.refcount())
            .field("kind", &self.kind())
            .field("slots", &self.to_vec())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-built object: refcount 1, array tag, length 3, slots 10 20 30 99.
    fn words() -> Vec<usize> {
        vec![
            1,
            ObjectType::Array.tag(),
            3,
            Value::from(10).raw(),
            Value::from(20).raw(),
            Value::from(30).raw(),
            Value::from(99).raw(),
        ]
    }

    fn view(words: &mut [usize]) -> ObjectRef<'_> {
        let base = NonNull::new(words.as_mut_ptr().cast::<u8>()).unwrap();
        unsafe { ObjectRef::from_raw(base, LayoutDescriptor::native()) }
    }

    #[test]
    fn reads_header_fields() {
        let mut words = words();
        let obj = view(&mut words);
        assert_eq!(obj.refcount(), 1);
        assert_eq!(obj.object_type(), Some(ObjectType::Array));
        assert_eq!(obj.len(), 3);
    }

    #[test]
    fn iteration_is_length_bounded() {
        let mut words = words();
        let obj = view(&mut words);
        assert_eq!(
            obj.to_vec(),
            vec![Value::from(10), Value::from(20), Value::from(30)]
        );
        assert_eq!(obj.get(3), None);
        assert_eq!(unsafe { obj.get_unchecked(3) }, Value::from(99));
    }

    #[test]
    fn unknown_tag_reported() {
        let mut words = words();
        words[1] = 0x77;
        assert_eq!(view(&mut words).kind(), Kind::Unknown(0x77));
    }

    #[test]
    fn object_type_tags_roundtrip() {
        for ty in [ObjectType::Array, ObjectType::Record, ObjectType::Boxed] {
            assert_eq!(ObjectType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(ObjectType::from_tag(0), None);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn narrow_field_rejects_values_that_do_not_fit() {
        let mut words = words();
        let layout = LayoutDescriptor::new(8, 4, 4, 8).unwrap();
        let base = NonNull::new(words.as_mut_ptr().cast::<u8>()).unwrap();
        let obj = unsafe { ObjectRef::from_raw(base, layout) };
        let words_of = |obj: &ObjectRef<'_>| (obj.refcount(), obj.type_tag(), obj.len());
        let before = words_of(&obj);

        let err = unsafe { obj.store_len(u32::MAX as usize + 2) }.unwrap_err();

        assert_eq!(
            err,
            PatchError::Capacity {
                requested: u32::MAX as usize + 2,
                capacity: u32::MAX as usize
            }
        );
        assert_eq!(words_of(&obj), before);

        unsafe { obj.store_len(u32::MAX as usize) }.unwrap();
        assert_eq!(obj.len(), u32::MAX as usize);
    }

    #[test]
    fn fixnum_has_no_view() {
        let view = unsafe { ObjectRef::from_value(Value::from(7), LayoutDescriptor::native()) };
        assert!(view.is_none());
    }
}
