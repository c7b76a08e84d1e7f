use std::{alloc::Layout, mem};

use crate::PatchError;

const WORD: usize = mem::size_of::<usize>();

/// Byte layout of a fixed array object.
///
/// ```text
/// [ refcount | type_tag | length | slot 0 | slot 1 | ... ]
/// ```
///
/// The widths are supplied by whoever knows the host runtime. They are
/// checked once in [`LayoutDescriptor::new`] and never change afterwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LayoutDescriptor {
    refcount_width: usize,
    type_tag_width: usize,
    length_width: usize,
    slot_width: usize,
}

impl LayoutDescriptor {
    pub fn new(
        refcount_width: usize,
        type_tag_width: usize,
        length_width: usize,
        slot_width: usize,
    ) -> Result<Self, PatchError> {
        if slot_width != WORD {
            return Err(PatchError::InvalidLayout {
                reason: "slot width must be one pointer width",
            });
        }
        for width in [refcount_width, type_tag_width, length_width] {
            if !matches!(width, 4 | 8) || width > WORD {
                return Err(PatchError::InvalidLayout {
                    reason: "header fields must be 4 or 8 bytes and fit in a pointer",
                });
            }
        }
        let layout = Self {
            refcount_width,
            type_tag_width,
            length_width,
            slot_width,
        };
        if layout.header_size() % mem::align_of::<usize>() != 0 {
            return Err(PatchError::InvalidLayout {
                reason: "header size must keep slots pointer aligned",
            });
        }
        Ok(layout)
    }

    /// Every field one pointer wide.
    pub const fn native() -> Self {
        Self {
            refcount_width: WORD,
            type_tag_width: WORD,
            length_width: WORD,
            slot_width: WORD,
        }
    }

    #[inline]
    pub const fn refcount_width(&self) -> usize {
        self.refcount_width
    }

    #[inline]
    pub const fn type_tag_width(&self) -> usize {
        self.type_tag_width
    }

    #[inline]
    pub const fn length_width(&self) -> usize {
        self.length_width
    }

    #[inline]
    pub const fn slot_width(&self) -> usize {
        self.slot_width
    }

    #[inline]
    pub const fn header_size(&self) -> usize {
        self.refcount_width + self.type_tag_width + self.length_width
    }

    #[inline]
    pub const fn refcount_offset(&self) -> usize {
        0
    }

    #[inline]
    pub const fn type_tag_offset(&self) -> usize {
        self.refcount_width
    }

    #[inline]
    pub const fn length_offset(&self) -> usize {
        self.refcount_width + self.type_tag_width
    }

    /// Largest length the length field can hold.
    #[inline]
    pub const fn max_length(&self) -> usize {
        field_max(self.length_width)
    }

    /// Largest count the refcount field can hold.
    #[inline]
    pub const fn max_refcount(&self) -> usize {
        field_max(self.refcount_width)
    }

    /// Byte offset of slot `index` from the start of the object.
    ///
    /// Unchecked: the result is only meaningful for indices the caller has
    /// already validated against the object's length.
    #[inline]
    pub const fn slot_offset(&self, index: usize) -> usize {
        self.header_size() + index * self.slot_width
    }

    /// calculate the layout of an object with `capacity` slots
    pub fn object_layout(&self, capacity: usize) -> Result<Layout, PatchError> {
        let overflow = PatchError::Capacity {
            requested: capacity,
            capacity: (isize::MAX as usize - self.header_size()) / self.slot_width,
        };
        let size = capacity
            .checked_mul(self.slot_width)
            .and_then(|slots| slots.checked_add(self.header_size()))
            .ok_or_else(|| overflow.clone())?;
        Layout::from_size_align(size, mem::align_of::<usize>())
            .map_err(|_| overflow)
    }
}

pub(crate) const fn field_max(width: usize) -> usize {
    match width {
        4 => u32::MAX as usize,
        _ => usize::MAX,
    }
}

impl Default for LayoutDescriptor {
    fn default() -> Self {
        Self::native()
    }
}
