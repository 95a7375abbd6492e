//! Piecewise-linear lookup tables.
//!
//! [`LookupTable::interpolate`] maps an input (typically vehicle speed) onto
//! an output (typically the maximum curvature change allowed per control
//! cycle) by linear interpolation between ordered control points. Inputs
//! outside the table clamp to the nearest boundary output.
//!
//! # Example
//!
//! ```rust
//! use canguard_hal::lookup::LookupTable;
//!
//! let table = LookupTable::new(&[7.0, 17.0, 27.0], &[0.005, 0.00056, 0.0002]).unwrap();
//! assert_eq!(table.interpolate(0.0), 0.005);
//! assert_eq!(table.interpolate(40.0), 0.0002);
//! assert!((table.interpolate(12.0) - 0.00278).abs() < 1e-9);
//! ```

use canguard_types::SafetyError;

/// An ordered sequence of `(x, y)` control points.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl LookupTable {
    /// Build a table from parallel breakpoint and value slices.
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::InvalidProfile`] when the slices are empty,
    /// differ in length, contain non-finite values, or when `xs` is not
    /// strictly increasing.
    pub fn new(xs: &[f64], ys: &[f64]) -> Result<Self, SafetyError> {
        if xs.is_empty() || xs.len() != ys.len() {
            return Err(SafetyError::InvalidProfile(format!(
                "lookup table needs matching non-empty breakpoints ({} x, {} y)",
                xs.len(),
                ys.len()
            )));
        }
        if xs.iter().chain(ys).any(|v| !v.is_finite()) {
            return Err(SafetyError::InvalidProfile(
                "lookup table contains a non-finite value".to_string(),
            ));
        }
        if xs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SafetyError::InvalidProfile(
                "lookup table breakpoints must be strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
        })
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.xs
    }

    pub fn values(&self) -> &[f64] {
        &self.ys
    }

    /// Linear interpolation at `x`, clamped to the first and last values.
    pub fn interpolate(&self, x: f64) -> f64 {
        interpolate(&self.xs, &self.ys, x)
    }
}

/// Interpolate over parallel, strictly increasing `xs` and matching `ys`.
///
/// Returns `0.0` for empty input and the first value for a NaN input, so a
/// corrupt measurement never produces a NaN limit.
pub fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return 0.0;
    }
    if x.is_nan() || x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }
    for i in 0..n - 1 {
        if x < xs[i + 1] {
            let (x0, y0) = (xs[i], ys[i]);
            let (x1, y1) = (xs[i + 1], ys[i + 1]);
            return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
        }
    }
    ys[n - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_up() -> LookupTable {
        LookupTable::new(&[7.0, 17.0, 27.0], &[0.005, 0.00056, 0.0002]).unwrap()
    }

    #[test]
    fn clamps_below_first_breakpoint() {
        let t = rate_up();
        assert_eq!(t.interpolate(-3.0), 0.005);
        assert_eq!(t.interpolate(7.0), 0.005);
    }

    #[test]
    fn clamps_above_last_breakpoint() {
        let t = rate_up();
        assert_eq!(t.interpolate(27.0), 0.0002);
        assert_eq!(t.interpolate(1e6), 0.0002);
    }

    #[test]
    fn hits_interior_breakpoint_exactly() {
        assert!((rate_up().interpolate(17.0) - 0.00056).abs() < 1e-12);
    }

    #[test]
    fn midpoint_is_linear() {
        let t = LookupTable::new(&[0.0, 10.0], &[0.0, 1.0]).unwrap();
        assert!((t.interpolate(2.5) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn monotonic_table_gives_monotonic_output() {
        let t = LookupTable::new(&[0.0, 5.0, 20.0], &[1.0, 2.0, 4.0]).unwrap();
        let mut prev = f64::NEG_INFINITY;
        for step in 0..300 {
            let y = t.interpolate(step as f64 * 0.1);
            assert!(y >= prev);
            prev = y;
        }
    }

    #[test]
    fn single_point_table_is_constant() {
        let t = LookupTable::new(&[10.0], &[0.3]).unwrap();
        assert_eq!(t.interpolate(0.0), 0.3);
        assert_eq!(t.interpolate(50.0), 0.3);
    }

    #[test]
    fn nan_input_returns_first_value() {
        assert_eq!(rate_up().interpolate(f64::NAN), 0.005);
    }

    #[test]
    fn rejects_unsorted_breakpoints() {
        let result = LookupTable::new(&[7.0, 5.0], &[1.0, 2.0]);
        assert!(matches!(result, Err(SafetyError::InvalidProfile(_))));
    }

    #[test]
    fn rejects_mismatched_lengths() {
        assert!(LookupTable::new(&[1.0, 2.0], &[1.0]).is_err());
        assert!(LookupTable::new(&[], &[]).is_err());
    }
}
