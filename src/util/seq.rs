use std::sync::atomic::{
    AtomicU16,
    Ordering,
};

pub trait Seq {
    type Output;

    fn next(&self) -> Self::Output;
}

/// Post-incrementing message-id source. Wraps at `u16::MAX`; the pending
/// map catches the (practically unreachable) case of a wrapped id colliding
/// with one still in flight.
pub struct U16Sequence(AtomicU16);

impl U16Sequence {
    #[inline]
    pub fn new() -> Self {
        Self(AtomicU16::new(0))
    }

    #[cfg(test)]
    pub fn set_next(&self, value: u16) {
        self.0.store(value, Ordering::Release);
    }
}

impl Default for U16Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Seq for U16Sequence {
    type Output = u16;

    #[inline]
    fn next(&self) -> Self::Output {
        self.0.fetch_add(1, Ordering::AcqRel)
    }
}
