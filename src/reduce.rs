//! Pixel statistics for the homogeneity filter and normalization
//!
//! All statistics are computed in `f64`, the precision the experiment
//! container stores, so threshold decisions and normalized intensities match
//! the source values exactly.

use ndarray::ArrayView1;

/// Minimum value, `None` for an empty slice or one containing NaN
#[must_use]
pub fn min(values: ArrayView1<'_, f64>) -> Option<f64> {
    extreme(values, f64::min)
}

/// Maximum value, `None` for an empty slice or one containing NaN
#[must_use]
pub fn max(values: ArrayView1<'_, f64>) -> Option<f64> {
    extreme(values, f64::max)
}

/// Population variance (ddof = 0), `None` for an empty slice
#[must_use]
pub fn variance(values: ArrayView1<'_, f64>) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.var(0.0))
    }
}

fn extreme(values: ArrayView1<'_, f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    if values.iter().any(|v| v.is_nan()) {
        return None;
    }
    values.iter().copied().reduce(pick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_empty_slices() {
        let empty = Array1::<f64>::zeros(0);
        assert!(min(empty.view()).is_none());
        assert!(max(empty.view()).is_none());
        assert!(variance(empty.view()).is_none());
    }

    #[test]
    fn test_basic_reductions() {
        let values = array![1.0, 3.0, 2.0, 6.0];
        assert_eq!(min(values.view()), Some(1.0));
        assert_eq!(max(values.view()), Some(6.0));
        // deviations: -2, 0, -1, 3 -> (4 + 0 + 1 + 9) / 4
        assert!((variance(values.view()).unwrap() - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_constant_has_zero_variance() {
        let values = Array1::from_elem(100, 0.4);
        assert!(variance(values.view()).unwrap() < 1e-12);
    }

    #[test]
    fn test_extremes_keep_source_precision() {
        let values = array![0.3, 0.1, 0.7];
        assert_eq!(min(values.view()), Some(0.1));
        assert_eq!(max(values.view()), Some(0.7));
        assert!((max(values.view()).unwrap() - min(values.view()).unwrap() - 0.6).abs() < 1e-15);
    }

    #[test]
    fn test_nan_has_no_extremes() {
        let values = array![0.3, f64::NAN];
        assert!(min(values.view()).is_none());
        assert!(max(values.view()).is_none());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: every value lies between min and max
            #[test]
            fn prop_values_between_extremes(
                values in prop::collection::vec(0.0f64..1.0, 1..256)
            ) {
                let values = Array1::from(values);
                let lo = min(values.view()).unwrap();
                let hi = max(values.view()).unwrap();
                prop_assert!(values.iter().all(|&v| lo <= v && v <= hi));
            }

            /// Property: variance is never negative
            #[test]
            fn prop_variance_non_negative(
                values in prop::collection::vec(-10.0f64..10.0, 1..256)
            ) {
                prop_assert!(variance(Array1::from(values).view()).unwrap() >= 0.0);
            }
        }
    }
}
