//! Per-feature response standardization (z-score)
//!
//! Statistics are computed over the trials of the dataset being built and
//! never shared between datasets.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use tracing::debug;

/// Per-feature statistics used for standardization
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStats {
    /// Mean per feature
    pub mean: Array1<f64>,
    /// Population standard deviation per feature (ddof = 0)
    pub std: Array1<f64>,
}

impl FeatureStats {
    /// Compute mean and population std per column
    #[must_use]
    pub fn compute(responses: ArrayView2<'_, f64>) -> Self {
        let features = responses.ncols();
        let mean = responses
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::from_elem(features, f64::NAN));
        let std = if responses.nrows() == 0 {
            Array1::from_elem(features, f64::NAN)
        } else {
            responses.std_axis(Axis(0), 0.0)
        };
        Self { mean, std }
    }

    /// Number of features whose standard deviation is zero
    #[must_use]
    pub fn constant_features(&self) -> usize {
        self.std.iter().filter(|&&s| s == 0.0).count()
    }
}

/// Standardize each column to zero mean and unit variance.
///
/// `(value - mean) / std` per feature; any non-finite result (zero-variance
/// features, NaN input) is replaced with `0.0`.
#[must_use]
pub fn standardize(responses: ArrayView2<'_, f64>) -> Array2<f64> {
    let stats = FeatureStats::compute(responses);
    debug!(
        trials = responses.nrows(),
        features = responses.ncols(),
        constant_features = stats.constant_features(),
        "Standardizing responses"
    );

    let mut out = responses.to_owned();
    for mut row in out.axis_iter_mut(Axis(0)) {
        for ((v, &m), &s) in row.iter_mut().zip(&stats.mean).zip(&stats.std) {
            let z = (*v - m) / s;
            *v = if z.is_finite() { z } else { 0.0 };
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standardized_columns() {
        let data = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let z = standardize(data.view());
        for col in z.axis_iter(Axis(1)) {
            assert!(col.mean().unwrap().abs() < 1e-12);
            assert!((col.std(0.0) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_zero_variance_feature_is_exactly_zero() {
        let data = array![[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]];
        let z = standardize(data.view());
        assert!(z.column(0).iter().all(|&v| v == 0.0));
        assert_eq!(FeatureStats::compute(data.view()).constant_features(), 1);
    }

    #[test]
    fn test_nan_input_becomes_zero() {
        let data = array![[f64::NAN, 1.0], [1.0, 2.0]];
        let z = standardize(data.view());
        assert!(z.iter().all(|v| v.is_finite()));
        assert!(z.column(0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_population_std() {
        // ddof = 0: std of [0, 2] is 1
        let stats = FeatureStats::compute(array![[0.0], [2.0]].view());
        assert!((stats.std[0] - 1.0).abs() < 1e-12);
        assert!((stats.mean[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input() {
        let data = Array2::<f64>::zeros((0, 3));
        let z = standardize(data.view());
        assert_eq!(z.dim(), (0, 3));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: every non-constant feature ends up with mean 0, std 1
            #[test]
            fn prop_zero_mean_unit_std(
                values in prop::collection::vec(-100.0f64..100.0, 12..120)
            ) {
                let rows = values.len() / 4;
                let data = Array2::from_shape_vec((rows, 4), values[..rows * 4].to_vec()).unwrap();
                let stats = FeatureStats::compute(data.view());
                let z = standardize(data.view());
                for (j, col) in z.axis_iter(Axis(1)).enumerate() {
                    prop_assert!(col.iter().all(|v| v.is_finite()));
                    if stats.std[j] > 1e-9 {
                        prop_assert!(col.mean().unwrap().abs() < 1e-9);
                        prop_assert!((col.std(0.0) - 1.0).abs() < 1e-9);
                    }
                }
            }
        }
    }
}
