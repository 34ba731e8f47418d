//! Prepared datasets: aligned train/test arrays plus descriptive metadata

use crate::mat::{MatArray, MatStruct};
use crate::split::SplitMethod;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resize method recorded in metadata
pub const RESIZE_METHOD: &str = "integer_scaling";

/// What the label column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    /// Session number (single-condition datasets)
    Session,
    /// Condition code (combined dataset)
    Condition,
}

impl LabelKind {
    /// Prefix for per-label metadata field names
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Condition => "condition",
        }
    }
}

/// One side of a split: rows gathered from the processed population
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPart {
    /// Upsampled, normalized stimuli (one 784-long row per trial)
    pub stimuli: Array2<f64>,
    /// Standardized responses
    pub responses: Array2<f64>,
    /// Label per trial
    pub labels: Vec<i64>,
    /// Positions in the filtered population
    pub indices: Vec<usize>,
}

impl SplitPart {
    /// Gather the rows at `indices`
    #[must_use]
    pub fn gather(
        stimuli: ArrayView2<'_, f64>,
        responses: ArrayView2<'_, f64>,
        labels: &[i64],
        indices: &[usize],
    ) -> Self {
        Self {
            stimuli: stimuli.select(Axis(0), indices),
            responses: responses.select(Axis(0), indices),
            labels: indices.iter().map(|&i| labels[i]).collect(),
            indices: indices.to_vec(),
        }
    }

    /// Number of trials
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// True if the part holds no trials
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Labels as an N×1 column
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn label_column(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.labels.len(), 1), |(i, _)| self.labels[i] as f64)
    }
}

/// Count of each value of `universe` in `labels` (zeros included)
#[must_use]
pub fn distribution(labels: &[i64], universe: &[i64]) -> BTreeMap<i64, usize> {
    let mut counts: BTreeMap<i64, usize> = universe.iter().map(|&u| (u, 0)).collect();
    for label in labels {
        *counts.entry(*label).or_insert(0) += 1;
    }
    counts
}

/// MAT field name for one label's count, e.g. `session_21`.
///
/// Negative labels use an `m` prefix (`session_m1`) since `-` is not valid
/// in a MATLAB identifier.
#[must_use]
pub fn label_field(prefix: &str, label: i64) -> String {
    if label < 0 {
        format!("{prefix}_m{}", label.unsigned_abs())
    } else {
        format!("{prefix}_{label}")
    }
}

/// Descriptive summary written alongside each dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Human-readable description
    pub description: String,
    /// Condition code (single-condition datasets)
    pub condition: Option<i64>,
    /// Condition codes included
    pub conditions: Vec<i64>,
    /// Sessions (expected for single conditions, observed for combined)
    pub sessions: Vec<i64>,
    /// Resize method
    pub resize_method: String,
    /// Split method
    pub split_method: SplitMethod,
    /// Label source
    pub label_kind: LabelKind,
    /// Trials matching the condition filter
    pub original_samples: usize,
    /// Trials surviving the homogeneity filter
    pub filtered_samples: usize,
    /// Requested variance threshold
    pub threshold_variance: f64,
    /// Requested range threshold
    pub threshold_range: f64,
    /// Variance threshold actually applied
    pub applied_threshold_variance: f64,
    /// Range threshold actually applied
    pub applied_threshold_range: f64,
    /// True if the relaxed retry was needed
    pub thresholds_relaxed: bool,
    /// Distinct stimulus ids after filtering
    pub unique_stimuli: usize,
    /// Train target after proportional shrinkage
    pub target_train_size: usize,
    /// Test target after proportional shrinkage
    pub target_test_size: usize,
    /// Label count per value in the train set
    pub train_distribution: BTreeMap<i64, usize>,
    /// Label count per value in the test set
    pub test_distribution: BTreeMap<i64, usize>,
}

impl Metadata {
    /// Distinct labels present in the train set
    #[must_use]
    pub fn train_labels(&self) -> Vec<i64> {
        present(&self.train_distribution)
    }

    /// Distinct labels present in the test set
    #[must_use]
    pub fn test_labels(&self) -> Vec<i64> {
        present(&self.test_distribution)
    }

    /// Encode as a MAT struct
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_mat(&self) -> MatStruct {
        let as_row = |values: &[i64]| {
            let widened: Vec<f64> = values.iter().map(|&v| v as f64).collect();
            MatArray::row(&widened)
        };
        let prefix = self.label_kind.prefix();
        let dist_struct = |dist: &BTreeMap<i64, usize>| {
            dist.iter().fold(MatStruct::new(), |s, (label, count)| {
                s.with_field(label_field(prefix, *label), MatArray::scalar(*count as f64))
            })
        };

        let mut s = MatStruct::new().with_field("description", self.description.as_str());
        if let Some(condition) = self.condition {
            s = s.with_field("condition", MatArray::scalar(condition as f64));
        }
        s.with_field("conditions", as_row(&self.conditions))
            .with_field("sessions", as_row(&self.sessions))
            .with_field("resize_method", self.resize_method.as_str())
            .with_field("split_method", self.split_method.as_str())
            .with_field("label_kind", prefix)
            .with_field("original_samples", MatArray::scalar(self.original_samples as f64))
            .with_field("filtered_samples", MatArray::scalar(self.filtered_samples as f64))
            .with_field("threshold_variance", MatArray::scalar(self.threshold_variance))
            .with_field("threshold_range", MatArray::scalar(self.threshold_range))
            .with_field(
                "applied_threshold_variance",
                MatArray::scalar(self.applied_threshold_variance),
            )
            .with_field(
                "applied_threshold_range",
                MatArray::scalar(self.applied_threshold_range),
            )
            .with_field(
                "thresholds_relaxed",
                MatArray::scalar(f64::from(u8::from(self.thresholds_relaxed))),
            )
            .with_field("unique_stimuli", MatArray::scalar(self.unique_stimuli as f64))
            .with_field("target_train_size", MatArray::scalar(self.target_train_size as f64))
            .with_field("target_test_size", MatArray::scalar(self.target_test_size as f64))
            .with_field(format!("train_{prefix}s"), as_row(&self.train_labels()))
            .with_field(format!("test_{prefix}s"), as_row(&self.test_labels()))
            .with_field("train_distribution", dist_struct(&self.train_distribution))
            .with_field("test_distribution", dist_struct(&self.test_distribution))
    }
}

fn present(dist: &BTreeMap<i64, usize>) -> Vec<i64> {
    dist.iter()
        .filter_map(|(&label, &count)| (count > 0).then_some(label))
        .collect()
}

/// A fully prepared dataset ready for serialization
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDataset {
    /// Train side
    pub train: SplitPart,
    /// Test side
    pub test: SplitPart,
    /// Descriptive summary
    pub metadata: Metadata,
}
