use crate::Value;

/// Reference counting policy applied when a slot changes hands.
///
/// A store through [`Patcher::transfer_at`](crate::Patcher::transfer_at) or
/// [`Patcher::transfer_from`](crate::Patcher::transfer_from) retains the
/// inserted value before the write and releases the displaced value after it.
pub trait Ownership {
    fn retain(&mut self, value: Value);
    fn release(&mut self, value: Value);
}

/// No accounting at all.
///
/// Only correct when every element involved is a fixnum or outlives the
/// arrays that reference it (an arena, or objects pinned for the whole
/// program).
#[derive(Debug, Default, Copy, Clone)]
pub struct Unmanaged;

impl Ownership for Unmanaged {
    #[inline]
    fn retain(&mut self, _value: Value) {}

    #[inline]
    fn release(&mut self, _value: Value) {}
}
