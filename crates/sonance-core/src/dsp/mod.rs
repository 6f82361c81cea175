//! Stateless signal-processing building blocks
//!
//! - [`vector`]: elementwise kernels over explicit-length regions
//! - [`resample`]: fractional-position interpolation with boundary modes

pub mod resample;
pub mod vector;

pub use resample::{interpolate, Boundary, InterpolationQuality};
pub use vector::Blend;
