//! Trial filtering: condition selection and homogeneous-stimulus removal
//!
//! Both filters are stable: retained trials keep their original file order,
//! so every index reported downstream can be traced back to the container.

use crate::loader::ExperimentData;
use crate::reduce;
use crate::{Error, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Variance/range thresholds for the homogeneity filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomogeneityThresholds {
    /// Minimum intensity variance (exclusive)
    pub variance: f64,
    /// Minimum intensity range, max - min (exclusive)
    pub range: f64,
}

impl HomogeneityThresholds {
    /// Default thresholds
    pub const DEFAULT: Self = Self {
        variance: 0.01,
        range: 0.1,
    };

    /// Relaxed thresholds, used once when nothing passes the defaults
    pub const RELAXED: Self = Self {
        variance: 0.005,
        range: 0.05,
    };

    /// True if an image with these statistics is informative enough to keep
    #[must_use]
    pub fn passes(&self, stats: ImageStats) -> bool {
        stats.variance > self.variance && stats.range > self.range
    }
}

impl Default for HomogeneityThresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Intensity statistics of one stimulus image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStats {
    /// Population variance of the pixel intensities
    pub variance: f64,
    /// max - min of the pixel intensities
    pub range: f64,
}

impl ImageStats {
    /// Compute statistics for one flattened image
    #[must_use]
    pub fn of(pixels: ArrayView1<'_, f64>) -> Self {
        let variance = reduce::variance(pixels).unwrap_or(0.0);
        let range = match (reduce::min(pixels), reduce::max(pixels)) {
            (Some(lo), Some(hi)) => hi - lo,
            _ => 0.0,
        };
        Self { variance, range }
    }
}

/// Result of the homogeneity filter
#[derive(Debug, Clone, PartialEq)]
pub struct HomogeneityOutcome {
    keep: Vec<bool>,
    stats: Vec<ImageStats>,
    applied: HomogeneityThresholds,
    relaxed: bool,
}

impl HomogeneityOutcome {
    /// Keep mask, one entry per input image
    #[must_use]
    pub fn keep_mask(&self) -> &[bool] {
        &self.keep
    }

    /// Positions of the kept images
    #[must_use]
    pub fn kept_indices(&self) -> Vec<usize> {
        self.keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect()
    }

    /// Number of kept images
    #[must_use]
    pub fn kept(&self) -> usize {
        self.keep.iter().filter(|&&k| k).count()
    }

    /// Per-image statistics
    #[must_use]
    pub fn stats(&self) -> &[ImageStats] {
        &self.stats
    }

    /// Thresholds that produced the mask
    #[must_use]
    pub const fn applied(&self) -> HomogeneityThresholds {
        self.applied
    }

    /// True if the relaxed retry was needed
    #[must_use]
    pub const fn relaxed(&self) -> bool {
        self.relaxed
    }
}

/// Filter out homogeneous stimuli.
///
/// Keeps images whose variance exceeds `primary.variance` and whose range
/// exceeds `primary.range`. When no image passes, retries once with
/// `relaxed` and uses that result.
///
/// # Errors
/// Returns [`Error::EmptyDataset`] if the relaxed pass also keeps nothing
pub fn filter_homogeneous(
    pixels: ArrayView2<'_, f64>,
    primary: HomogeneityThresholds,
    relaxed: HomogeneityThresholds,
) -> Result<HomogeneityOutcome> {
    let stats: Vec<ImageStats> = pixels
        .axis_iter(Axis(0))
        .map(ImageStats::of)
        .collect();

    let mut outcome = apply_thresholds(stats, primary, false);
    info!(
        original = outcome.keep.len(),
        kept = outcome.kept(),
        filtered_out = outcome.keep.len() - outcome.kept(),
        "Homogeneity filter"
    );

    if outcome.kept() == 0 {
        warn!(
            variance = relaxed.variance,
            range = relaxed.range,
            "No stimuli passed filtering, lowering thresholds"
        );
        outcome = apply_thresholds(outcome.stats, relaxed, true);
        info!(kept = outcome.kept(), "Homogeneity filter with relaxed thresholds");
        if outcome.kept() == 0 {
            return Err(Error::EmptyDataset(format!(
                "no stimuli passed the homogeneity filter even with relaxed thresholds \
                 (variance > {}, range > {})",
                relaxed.variance, relaxed.range
            )));
        }
    }

    Ok(outcome)
}

fn apply_thresholds(
    stats: Vec<ImageStats>,
    thresholds: HomogeneityThresholds,
    relaxed: bool,
) -> HomogeneityOutcome {
    let keep = stats.iter().map(|&s| thresholds.passes(s)).collect();
    HomogeneityOutcome {
        keep,
        stats,
        applied: thresholds,
        relaxed,
    }
}

/// Trial subset selected from an experiment, in original file order
#[derive(Debug, Clone, PartialEq)]
pub struct TrialSubset {
    source_rows: Vec<usize>,
    sessions: Vec<i64>,
    conditions: Vec<i64>,
    stimulus_ids: Vec<i64>,
    pixels: Array2<f64>,
    responses: Array2<f64>,
}

impl TrialSubset {
    /// Select trials whose condition code is in `codes` (stable)
    #[must_use]
    pub fn select_conditions(experiment: &ExperimentData, codes: &[i64]) -> Self {
        let rows: Vec<usize> = experiment
            .conditions()
            .iter()
            .enumerate()
            .filter_map(|(i, c)| codes.contains(c).then_some(i))
            .collect();

        let subset = Self {
            sessions: rows.iter().map(|&i| experiment.sessions()[i]).collect(),
            conditions: rows.iter().map(|&i| experiment.conditions()[i]).collect(),
            stimulus_ids: rows.iter().map(|&i| experiment.stimulus_ids()[i]).collect(),
            pixels: experiment.pixels().select(Axis(0), &rows),
            responses: experiment.responses().select(Axis(0), &rows),
            source_rows: rows,
        };

        info!(
            conditions = ?codes,
            trials = subset.len(),
            sessions = ?subset.unique_sessions(),
            "Condition filter"
        );
        subset
    }

    /// Keep only the given positions (must be ascending to stay stable)
    #[must_use]
    pub fn retain(&self, positions: &[usize]) -> Self {
        debug!(before = self.len(), after = positions.len(), "Retaining trials");
        Self {
            source_rows: positions.iter().map(|&i| self.source_rows[i]).collect(),
            sessions: positions.iter().map(|&i| self.sessions[i]).collect(),
            conditions: positions.iter().map(|&i| self.conditions[i]).collect(),
            stimulus_ids: positions.iter().map(|&i| self.stimulus_ids[i]).collect(),
            pixels: self.pixels.select(Axis(0), positions),
            responses: self.responses.select(Axis(0), positions),
        }
    }

    /// Number of trials
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no trials were selected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Row of each trial in the source container
    #[must_use]
    pub fn source_rows(&self) -> &[usize] {
        &self.source_rows
    }

    /// Session per trial
    #[must_use]
    pub fn sessions(&self) -> &[i64] {
        &self.sessions
    }

    /// Condition code per trial
    #[must_use]
    pub fn conditions(&self) -> &[i64] {
        &self.conditions
    }

    /// Stimulus id per trial
    #[must_use]
    pub fn stimulus_ids(&self) -> &[i64] {
        &self.stimulus_ids
    }

    /// Source pixels, one flattened 10x10 image per row
    #[must_use]
    pub fn pixels(&self) -> ArrayView2<'_, f64> {
        self.pixels.view()
    }

    /// Responses, one trial per row
    #[must_use]
    pub fn responses(&self) -> ArrayView2<'_, f64> {
        self.responses.view()
    }

    /// Sorted distinct sessions
    #[must_use]
    pub fn unique_sessions(&self) -> Vec<i64> {
        unique_sorted(&self.sessions)
    }

    /// Sorted distinct condition codes
    #[must_use]
    pub fn unique_conditions(&self) -> Vec<i64> {
        unique_sorted(&self.conditions)
    }

    /// Number of distinct stimulus ids
    #[must_use]
    pub fn unique_stimuli(&self) -> usize {
        self.stimulus_ids.iter().collect::<BTreeSet<_>>().len()
    }
}

/// Sorted distinct values
#[must_use]
pub fn unique_sorted(values: &[i64]) -> Vec<i64> {
    values
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_image(value: f64) -> Vec<f64> {
        vec![value; 100]
    }

    /// Two-level image: `fraction` of pixels at `hi`, the rest at `lo`
    fn two_level_image(lo: f64, hi: f64, fraction: f64) -> Vec<f64> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n_hi = (fraction * 100.0).round() as usize;
        (0..100).map(|i| if i < n_hi { hi } else { lo }).collect()
    }

    fn batch(images: &[Vec<f64>]) -> Array2<f64> {
        let flat: Vec<f64> = images.iter().flatten().copied().collect();
        Array2::from_shape_vec((images.len(), 100), flat).unwrap()
    }

    fn experiment(conditions: &[f64]) -> ExperimentData {
        let n = conditions.len();
        #[allow(clippy::cast_precision_loss)]
        let design = Array2::from_shape_fn((n, 3), |(r, c)| match c {
            0 => 20.0 + r as f64,
            1 => 0.0,
            _ => conditions[r],
        });
        #[allow(clippy::cast_precision_loss)]
        let label = Array2::from_shape_fn((n, 101), |(r, c)| if c == 0 { r as f64 } else { 0.5 });
        #[allow(clippy::cast_precision_loss)]
        let data = Array2::from_shape_fn((n, 2), |(r, _)| r as f64);
        ExperimentData::from_tables(&design, &label, &data).unwrap()
    }

    #[test]
    fn test_flat_image_stats_are_zero() {
        let stats = ImageStats::of(ArrayView1::from(&flat_image(0.7)));
        assert!(stats.variance < 1e-12);
        assert!(stats.range.abs() < 1e-12);
        assert!(!HomogeneityThresholds::DEFAULT.passes(stats));
    }

    #[test]
    fn test_two_level_image_passes_defaults() {
        // 50/50 split of 0 and 1: variance 0.25, range 1.0
        let stats = ImageStats::of(ArrayView1::from(&two_level_image(0.0, 1.0, 0.5)));
        assert!((stats.variance - 0.25).abs() < 1e-12);
        assert!((stats.range - 1.0).abs() < 1e-12);
        assert!(HomogeneityThresholds::DEFAULT.passes(stats));
    }

    #[test]
    fn test_stats_use_source_precision() {
        let stats = ImageStats::of(ArrayView1::from(&two_level_image(0.2, 0.3, 0.5)));
        assert_eq!(stats.range.to_bits(), (0.3_f64 - 0.2_f64).to_bits());
        assert!(stats.range < 0.1);
    }

    #[test]
    fn test_filter_excludes_flat_keeps_structured() {
        let pixels = batch(&[
            flat_image(0.0),
            two_level_image(0.0, 1.0, 0.3),
            flat_image(1.0),
        ]);
        let outcome = filter_homogeneous(
            pixels.view(),
            HomogeneityThresholds::DEFAULT,
            HomogeneityThresholds::RELAXED,
        )
        .unwrap();
        assert_eq!(outcome.keep_mask(), &[false, true, false]);
        assert_eq!(outcome.kept_indices(), vec![1]);
        assert!(!outcome.relaxed());
        assert_eq!(outcome.applied(), HomogeneityThresholds::DEFAULT);
    }

    #[test]
    fn test_filter_relaxes_once() {
        // 20% of pixels at 0.2: variance 0.0064, range 0.2
        let pixels = batch(&[two_level_image(0.0, 0.2, 0.2)]);
        let outcome = filter_homogeneous(
            pixels.view(),
            HomogeneityThresholds::DEFAULT,
            HomogeneityThresholds::RELAXED,
        )
        .unwrap();
        assert!(outcome.relaxed());
        assert_eq!(outcome.kept(), 1);
        assert_eq!(outcome.applied(), HomogeneityThresholds::RELAXED);
    }

    #[test]
    fn test_filter_fails_when_relaxed_still_empty() {
        let pixels = batch(&[flat_image(0.3), flat_image(0.9)]);
        let err = filter_homogeneous(
            pixels.view(),
            HomogeneityThresholds::DEFAULT,
            HomogeneityThresholds::RELAXED,
        )
        .unwrap_err();
        assert!(matches!(err, Error::EmptyDataset(_)));
    }

    #[test]
    fn test_select_conditions_is_stable() {
        let exp = experiment(&[2.0, 3.0, 2.0, 5.0, 2.0]);
        let subset = TrialSubset::select_conditions(&exp, &[2]);
        assert_eq!(subset.len(), 3);
        assert_eq!(subset.source_rows(), &[0, 2, 4]);
        assert_eq!(subset.sessions(), &[20, 22, 24]);
        assert!((subset.responses()[[1, 0]] - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_select_condition_set() {
        let exp = experiment(&[2.0, 3.0, 1.0, 5.0, 4.0]);
        let subset = TrialSubset::select_conditions(&exp, &[2, 3, 4, 5]);
        assert_eq!(subset.source_rows(), &[0, 1, 3, 4]);
        assert_eq!(subset.unique_conditions(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_retain_maps_source_rows() {
        let exp = experiment(&[2.0, 3.0, 2.0, 2.0]);
        let subset = TrialSubset::select_conditions(&exp, &[2]).retain(&[0, 2]);
        assert_eq!(subset.source_rows(), &[0, 3]);
        assert_eq!(subset.stimulus_ids(), &[0, 3]);
        assert_eq!(subset.unique_stimuli(), 2);
    }

    #[test]
    fn test_unknown_condition_selects_nothing() {
        let exp = experiment(&[2.0, 3.0]);
        assert!(TrialSubset::select_conditions(&exp, &[9]).is_empty());
    }
}
