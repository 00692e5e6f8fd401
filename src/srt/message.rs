//! 26-bit wrapping message numbers.
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::ops::{Add, AddAssign};

use super::serial;

const BITS: usize = 26;

/// A 26-bit message number identifying the application message a data packet belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageNumber(u32);

impl MessageNumber {
    /// # Panics
    ///
    /// Panics if `num` exceeds `(1 << 26) - 1`.
    #[inline]
    pub const fn new(num: u32) -> Self {
        assert!(num <= (1 << BITS) - 1, "MessageNumber::new overflow");
        Self(num)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Add<u32> for MessageNumber {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(serial::add::<BITS>(self.0, rhs))
    }
}

impl AddAssign<u32> for MessageNumber {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 = serial::add::<BITS>(self.0, rhs);
    }
}

impl PartialOrd for MessageNumber {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MessageNumber {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        serial::cmp::<BITS>(self.0, other.0)
    }
}

impl From<MessageNumber> for u32 {
    #[inline]
    fn from(src: MessageNumber) -> Self {
        src.0
    }
}

impl From<u32> for MessageNumber {
    #[inline]
    fn from(src: u32) -> Self {
        Self(src & ((1 << BITS) - 1))
    }
}

impl Display for MessageNumber {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
