//! RFC 1982 serial number arithmetic over an `N`-bit field.
//!
//! Sequence numbers and message numbers both wrap well before reaching `u32::MAX`, so ordinary
//! integer comparison is wrong once a field wraps. All three operations here normalize both
//! operands into the `N`-bit field first.

use std::cmp::Ordering;

#[inline]
pub fn add<const N: usize>(lhs: u32, rhs: u32) -> u32 {
    let max = (1 << N) - 1;
    (lhs & max).wrapping_add(rhs & max) & max
}

#[inline]
pub fn sub<const N: usize>(lhs: u32, rhs: u32) -> u32 {
    let max = (1 << N) - 1;
    (lhs & max).wrapping_sub(rhs & max) & max
}

/// Serial-number comparison per RFC 1982 §3.2: `lhs` is considered to precede `rhs` if the
/// forward distance from `lhs` to `rhs` is less than half the field's range.
pub fn cmp<const N: usize>(lhs: u32, rhs: u32) -> Ordering {
    let max = (1u32 << N) - 1;
    let half = 1u32 << (N - 1);

    let lhs = lhs & max;
    let rhs = rhs & max;

    if lhs == rhs {
        return Ordering::Equal;
    }

    let fwd = lhs.wrapping_sub(rhs) & max;
    if fwd == 0 {
        Ordering::Equal
    } else if fwd < half {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}
