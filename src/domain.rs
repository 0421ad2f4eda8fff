//! Value domains used by aggregation.

use std::fmt;

use crate::error::{Error, Result};

/// Arithmetic and ordering over the constants of a program.
///
/// Only aggregation calls into the domain. `Count` folds [`Domain::unit`]
/// with [`Domain::sum`], the other functions use the matching operation.
pub trait Domain<T>: fmt::Debug {
    /// The value counted once per row.
    ///
    /// # Errors
    ///
    /// Fails if the domain has no unit.
    fn unit(&self) -> Result<T>;

    /// The sum of two values.
    ///
    /// # Errors
    ///
    /// Fails if the domain cannot add, or the addition overflows.
    fn sum(&self, a: &T, b: &T) -> Result<T>;

    /// The larger of two values.
    ///
    /// # Errors
    ///
    /// Fails if the domain is not ordered.
    fn max(&self, a: &T, b: &T) -> Result<T>;

    /// The smaller of two values.
    ///
    /// # Errors
    ///
    /// Fails if the domain is not ordered.
    fn min(&self, a: &T, b: &T) -> Result<T>;
}

/// Domain of the primitive integer types, with checked addition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NumberDomain;

macro_rules! number_domain {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Domain<$ty> for NumberDomain {
                fn unit(&self) -> Result<$ty> {
                    Ok(1)
                }

                fn sum(&self, a: &$ty, b: &$ty) -> Result<$ty> {
                    a.checked_add(*b).ok_or(Error::Overflow)
                }

                fn max(&self, a: &$ty, b: &$ty) -> Result<$ty> {
                    Ok(*a.max(b))
                }

                fn min(&self, a: &$ty, b: &$ty) -> Result<$ty> {
                    Ok(*a.min(b))
                }
            }
        )*
    };
}

number_domain!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

/// Domain of strings: ordered, but without unit or sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringDomain;

impl Domain<String> for StringDomain {
    fn unit(&self) -> Result<String> {
        Err(Error::UnsupportedOperation("unit"))
    }

    fn sum(&self, _: &String, _: &String) -> Result<String> {
        Err(Error::UnsupportedOperation("sum"))
    }

    fn max(&self, a: &String, b: &String) -> Result<String> {
        Ok(a.max(b).clone())
    }

    fn min(&self, a: &String, b: &String) -> Result<String> {
        Ok(a.min(b).clone())
    }
}
