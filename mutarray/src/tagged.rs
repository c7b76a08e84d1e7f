//! Value: one slot word, either a small integer or a reference
//!
//! Fixnums keep the low bit clear and store the integer shifted left by one.
//! References are object addresses with the low two bits set to `0b01`.
//! Every heap object is pointer aligned, so the low bits of its address are
//! always free for the tag.

#[allow(unused)]
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueTag {
    Fixnum = 0b0,
    Reference = 0b01,
}

pub const OBJECT_TAG_MASK: usize = 0b11;

/// A raw slot word
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Value(usize);

impl Value {
    pub const fn from_fixnum(value: isize) -> Self {
        Self((value as usize) << 1)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    /// Tag an object address as a reference.
    ///
    /// # Safety
    /// `ptr` must be aligned to at least 4 bytes. Dereferencing the returned
    /// value later is only sound while the object is alive.
    pub unsafe fn from_ptr(ptr: *mut u8) -> Self {
        let address = ptr as usize;
        debug_assert_eq!(
            address & OBJECT_TAG_MASK,
            0,
            "pointer must be aligned so low 2 bits are free"
        );
        Self(address | ValueTag::Reference as usize)
    }

    /// Rebuild a value from a word previously read out of a slot.
    ///
    /// # Safety
    /// `raw` must be a word produced by [`Value::raw`].
    pub const unsafe fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_fixnum(self) -> bool {
        self.0 & 0b1 == ValueTag::Fixnum as usize
    }

    #[inline]
    pub const fn is_object(self) -> bool {
        self.0 & OBJECT_TAG_MASK == ValueTag::Reference as usize
    }

    /// The integer stored in a fixnum, `None` for references.
    #[inline]
    pub const fn as_fixnum(self) -> Option<isize> {
        if self.is_fixnum() {
            Some((self.0 as isize) >> 1)
        } else {
            None
        }
    }

    /// Untagged object address, `None` for fixnums.
    #[inline]
    pub fn as_ptr(self) -> Option<*mut u8> {
        if self.is_object() {
            Some((self.0 & !OBJECT_TAG_MASK) as *mut u8)
        } else {
            None
        }
    }

    #[inline]
    pub fn address(self) -> Option<usize> {
        self.as_ptr().map(|ptr| ptr as usize)
    }
}

impl From<isize> for Value {
    fn from(value: isize) -> Self {
        Self::from_fixnum(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::from_fixnum(value as isize)
    }
}
