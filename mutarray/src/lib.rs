//! In-place mutation of reference-counted fixed arrays.
//!
//! An array object is a header (refcount, type tag, length) followed by
//! pointer-wide slots. [`Patcher`] writes straight into that memory instead
//! of building a new array: one slot, a run of slots copied from another
//! array, or the length field itself. The raw calls are `unsafe` and leave
//! reference counts alone. [`ArrayMut`] wraps the same writes for arrays
//! with a single owner and keeps counts and capacity in check.
//!
//! ```
//! use mutarray::{Heap, Value};
//!
//! let mut heap = Heap::default();
//! let t = heap.allocate_array(&[1, 2, 3, 4, 5].map(Value::from)).unwrap();
//!
//! // SAFETY: `t` is a live array of `heap`
//! unsafe { heap.patcher().replace_at(t, Value::from(315), 1) }.unwrap();
//!
//! let view = heap.view(t).unwrap();
//! assert_eq!(view.to_vec(), [1, 315, 3, 4, 5].map(Value::from));
//! ```

mod buffer;
mod error;
mod heap;
mod layout;
mod object;
mod ownership;
mod patch;
mod tagged;

pub use buffer::ArrayMut;
pub use error::PatchError;
pub use heap::{Allocator, Heap, HeapStats, RustAllocator};
pub use layout::LayoutDescriptor;
pub use object::{Kind, ObjectRef, ObjectType};
pub use ownership::{Ownership, Unmanaged};
pub use patch::Patcher;
pub use tagged::{OBJECT_TAG_MASK, Value, ValueTag};
