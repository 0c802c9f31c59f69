//! Utilities related to numbers.

use num;
use std::fmt;

/// Floating point marker trait for easier control over trait bounds.
pub trait CFloat:
    Sync + Send + num::Float + num::cast::FromPrimitive + Into<f64> + fmt::Debug + 'static
{
}

impl CFloat for f32 {}
impl CFloat for f64 {}

/// Converts a double precision value into the working precision.
pub fn from_f64<F: CFloat>(value: f64) -> F {
    F::from_f64(value).expect("Conversion from f64 failed")
}

/// Converts an integer into the working precision.
pub fn from_usize<F: CFloat>(value: usize) -> F {
    F::from_usize(value).expect("Conversion from usize failed")
}

/// Absolute tolerance used when deciding whether a point lies within a cell.
pub const CONTAINMENT_EPSILON: f64 = 1e-7;

/// Relative tolerance for treating a singular value as zero.
pub const NULL_SPACE_TOLERANCE: f64 = 1e-10;
