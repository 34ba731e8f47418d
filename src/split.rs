//! Train/test partitioning
//!
//! Every split draws from its own `StdRng` seeded per call, so repeated runs
//! are reproducible and runs for different datasets never share state.
//!
//! - [`random_split`]: one permutation of the population; first `train`
//!   positions become train, next `test` become test, the rest is unused.
//! - [`stratified_split`]: per-condition test quotas (balanced test set),
//!   everything else is train, truncated after the fact to the train target.

use crate::filter::unique_sorted;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Requested train/test sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitTargets {
    /// Train set size
    pub train: usize,
    /// Test set size
    pub test: usize,
}

impl SplitTargets {
    /// Create targets
    #[must_use]
    pub const fn new(train: usize, test: usize) -> Self {
        Self { train, test }
    }

    /// Combined size, saturating at `usize::MAX`
    #[must_use]
    pub const fn total(&self) -> usize {
        self.train.saturating_add(self.test)
    }

    /// Shrink both targets proportionally (truncating) when fewer than
    /// `train + test` samples are available; otherwise unchanged.
    #[must_use]
    pub fn fit_to(self, available: usize) -> Self {
        // Widened so `target * available` cannot overflow
        let total = self.train as u128 + self.test as u128;
        if available as u128 >= total {
            return self;
        }
        let shrink =
            |n: usize| usize::try_from(n as u128 * available as u128 / total).unwrap_or(n);
        let scaled = Self {
            train: shrink(self.train),
            test: shrink(self.test),
        };
        warn!(
            available,
            needed = self.total(),
            train = scaled.train,
            test = scaled.test,
            "Adjusting target sizes proportionally"
        );
        scaled
    }
}

impl Default for SplitTargets {
    fn default() -> Self {
        Self::new(150, 18)
    }
}

/// How a split was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    /// Single random permutation
    Random,
    /// Per-condition test quotas
    StratifiedByCondition,
}

impl SplitMethod {
    /// Name recorded in dataset metadata
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::StratifiedByCondition => "stratified_by_condition",
        }
    }
}

/// Train/test positions into the filtered population
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Split {
    /// Train positions
    pub train: Vec<usize>,
    /// Test positions
    pub test: Vec<usize>,
}

impl Split {
    /// True if no position appears in both sets
    #[must_use]
    pub fn is_disjoint(&self) -> bool {
        let train: BTreeSet<_> = self.train.iter().collect();
        self.test.iter().all(|i| !train.contains(i))
    }
}

/// Random split of `0..population`
#[must_use]
pub fn random_split(population: usize, targets: SplitTargets, seed: u64) -> Split {
    let targets = targets.fit_to(population);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..population).collect();
    indices.shuffle(&mut rng);

    let train_end = targets.train.min(population);
    let test_end = (train_end + targets.test).min(population);
    let split = Split {
        train: indices[..train_end].to_vec(),
        test: indices[train_end..test_end].to_vec(),
    };
    info!(
        train = split.train.len(),
        test = split.test.len(),
        unused = population - test_end,
        "Random split"
    );
    split
}

/// Test quota per condition: `test / k` each, plus one for the first
/// `test % k` conditions in ascending order.
#[must_use]
pub fn test_quotas(conditions: &[i64], test_target: usize) -> Vec<(i64, usize)> {
    let unique = unique_sorted(conditions);
    if unique.is_empty() {
        return Vec::new();
    }
    let base = test_target / unique.len();
    let extra = test_target % unique.len();
    unique
        .into_iter()
        .enumerate()
        .map(|(i, c)| (c, base + usize::from(i < extra)))
        .collect()
}

/// Result of a stratified split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StratifiedSplit {
    /// Train/test positions
    pub split: Split,
    /// Test quota per condition, ascending by condition
    pub quotas: Vec<(i64, usize)>,
    /// Targets after proportional shrinkage
    pub targets: SplitTargets,
}

/// Stratified split by condition label.
///
/// Conditions are visited in ascending order; each condition's positions are
/// shuffled and its quota is taken for test, the rest goes to train. If the
/// accumulated train set exceeds the train target it is shuffled and
/// truncated. The test set is never truncated.
#[must_use]
pub fn stratified_split(labels: &[i64], targets: SplitTargets, seed: u64) -> StratifiedSplit {
    let targets = targets.fit_to(labels.len());
    let quotas = test_quotas(labels, targets.test);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut split = Split::default();
    for &(condition, quota) in &quotas {
        let mut positions: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter_map(|(i, &l)| (l == condition).then_some(i))
            .collect();
        positions.shuffle(&mut rng);

        let take = quota.min(positions.len());
        if take < quota {
            warn!(
                condition,
                available = positions.len(),
                quota,
                "Condition has fewer trials than its test quota"
            );
        }
        debug!(condition, total = positions.len(), test = take, "Stratum");
        split.test.extend_from_slice(&positions[..take]);
        split.train.extend_from_slice(&positions[take..]);
    }

    if split.train.len() > targets.train {
        split.train.shuffle(&mut rng);
        split.train.truncate(targets.train);
    }

    info!(
        train = split.train.len(),
        test = split.test.len(),
        conditions = quotas.len(),
        "Stratified split"
    );
    StratifiedSplit {
        split,
        quotas,
        targets,
    }
}
