mod precomputed_sum;
mod sum;
mod value_map;

use core::fmt;
use std::ops::{Add, AddAssign, Sub};

pub(crate) use precomputed_sum::PrecomputedSum;
pub(crate) use sum::Sum;
pub(crate) use value_map::ValueMap;

/// The numeric kind an aggregator sums.
///
/// An aggregator instance is bound to one kind for its whole life; it is
/// implemented for `i64` and `f64`.
pub trait Number:
    Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + PartialOrd
    + fmt::Debug
    + Clone
    + Copy
    + PartialEq
    + Default
    + Send
    + Sync
    + 'static
{
    /// Adds `rhs`, wrapping around at the bounds of integer kinds.
    fn wrapping_add(self, rhs: Self) -> Self;

    /// Subtracts `rhs`, wrapping around at the bounds of integer kinds.
    fn wrapping_sub(self, rhs: Self) -> Self;
}

impl Number for i64 {
    fn wrapping_add(self, rhs: Self) -> Self {
        i64::wrapping_add(self, rhs)
    }

    fn wrapping_sub(self, rhs: Self) -> Self {
        i64::wrapping_sub(self, rhs)
    }
}

impl Number for f64 {
    fn wrapping_add(self, rhs: Self) -> Self {
        self + rhs
    }

    fn wrapping_sub(self, rhs: Self) -> Self {
        self - rhs
    }
}
