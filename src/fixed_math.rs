//! Deterministic fixed-point arithmetic for path costs.
//!
//! Costs are summed step by step and compared for tie-breaking; fixed point keeps
//! those sums exact and identical on every platform, which the byte-exact
//! database export depends on.

use fixed::types::I48F16;

/// Fixed-point number type used for every path cost.
///
/// Uses I48F16 format: 48 bits for the integer part, 16 bits for the fractional part.
/// This provides a range of approximately ±140 trillion with a precision of ~0.000015.
pub type FixedNum = I48F16;
