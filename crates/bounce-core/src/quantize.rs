//! Float to integer sample-code conversion.
//!
//! Both codecs share this rounding rule so that the same normalized value
//! always produces the same integer code regardless of container:
//!
//! ```text
//! q = sign(v) × trunc(|v| × expander + 0.5)
//! ```
//!
//! i.e. round-half-away-from-zero on the magnitude. The result is clamped to
//! `±expander` so that values slightly outside `[-1, 1]` (dither overshoot)
//! never wrap around in the packed representation.

use crate::BitDepth;

/// Quantize a normalized sample to an integer code for `bits`.
///
/// `NaN` maps to 0; infinities saturate at full scale.
///
/// # Example
///
/// ```rust
/// use bounce_core::{BitDepth, quantize};
///
/// assert_eq!(quantize(1.0, BitDepth::Sixteen), 32767);
/// assert_eq!(quantize(-1.0, BitDepth::Eight), -127);
/// assert_eq!(quantize(0.75 / 32767.0, BitDepth::Sixteen), 1);
/// ```
#[inline]
pub fn quantize(value: f32, bits: BitDepth) -> i32 {
    if value.is_nan() {
        return 0;
    }
    let expander = bits.expander();
    let magnitude = (f64::from(value).abs() * f64::from(expander) + 0.5).trunc();
    let magnitude = magnitude.min(f64::from(expander)) as i32;
    if value < 0.0 { -magnitude } else { magnitude }
}

/// Convert an integer code back to a normalized float.
#[inline]
pub fn dequantize(code: i32, bits: BitDepth) -> f32 {
    (f64::from(code) / f64::from(bits.expander())) as f32
}
