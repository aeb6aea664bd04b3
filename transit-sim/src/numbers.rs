//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Floor a f64 into a `usize`, returning 0 for negative or non-finite values.
#[must_use]
pub fn floor_f64_to_usize(value: f64) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let max = cast::<usize, f64>(usize::MAX).unwrap_or(f64::MAX);
    cast::<f64, usize>(value.min(max).floor()).unwrap_or(0)
}

/// Convert usize to f64 while allowing precision loss in a single location.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

/// Replace NaN and infinities with `fallback`.
#[must_use]
pub const fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

/// Sanitize an elapsed-time input: non-finite or negative values become zero.
#[must_use]
pub const fn sanitize_delta(dt: f64) -> f64 {
    if dt.is_finite() && dt > 0.0 { dt } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_handles_negative_and_non_finite() {
        assert_eq!(floor_f64_to_usize(3.9), 3);
        assert_eq!(floor_f64_to_usize(-2.0), 0);
        assert_eq!(floor_f64_to_usize(f64::NAN), 0);
        assert_eq!(floor_f64_to_usize(f64::INFINITY), 0);
    }

    #[test]
    fn delta_sanitizer_zeroes_bad_input() {
        assert!((sanitize_delta(0.25) - 0.25).abs() < f64::EPSILON);
        assert!(sanitize_delta(-1.0).abs() < f64::EPSILON);
        assert!(sanitize_delta(f64::NAN).abs() < f64::EPSILON);
        assert!((finite_or(f64::NEG_INFINITY, 2.0) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn usize_converts() {
        assert!((usize_to_f64(7) - 7.0).abs() < f64::EPSILON);
    }
}
