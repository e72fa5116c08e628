//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Convert u64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn u64_to_f64(value: u64) -> f64 {
    cast::<u64, f64>(value).unwrap_or(0.0)
}

/// Convert a length to i64, saturating on overflow.
#[must_use]
pub fn len_to_i64(len: usize) -> i64 {
    cast::<usize, i64>(len).unwrap_or(i64::MAX)
}

/// Convert a u64 offset to a usize index, saturating on overflow.
#[must_use]
pub fn u64_to_usize(value: u64) -> usize {
    cast::<u64, usize>(value).unwrap_or(usize::MAX)
}

/// Convert a length to u64, saturating on overflow.
#[must_use]
pub fn usize_to_u64(value: usize) -> u64 {
    cast::<usize, u64>(value).unwrap_or(u64::MAX)
}

/// Ratio of two counts, 0.0 when the denominator is zero.
#[must_use]
pub fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    let num = cast::<usize, f64>(numerator).unwrap_or(0.0);
    let den = cast::<usize, f64>(denominator).unwrap_or(1.0);
    num / den
}

/// Round a weighted score down to an integer count, 0 for non-finite values.
#[must_use]
pub fn floor_f64_to_u64(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    cast::<f64, u64>(value.floor()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_handles_zero_denominator() {
        assert!((ratio(1, 0) - 0.0).abs() < f64::EPSILON);
        assert!((ratio(3, 4) - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn conversions_saturate() {
        assert_eq!(len_to_i64(5), 5);
        assert_eq!(u64_to_usize(7), 7);
        assert_eq!(usize_to_u64(9), 9);
        assert_eq!(floor_f64_to_u64(f64::NAN), 0);
        assert_eq!(floor_f64_to_u64(-3.0), 0);
        assert_eq!(floor_f64_to_u64(2.9), 2);
    }
}
