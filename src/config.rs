//! Preparation configuration
//!
//! Defaults reproduce the fixed experiment layout: input and outputs under
//! `data/`, thresholds 0.01/0.1 (relaxed 0.005/0.05), 150 train and 18 test
//! samples, seed 42.
//!
//! ```rust
//! use stimprep::config::PrepConfig;
//!
//! let config = PrepConfig::builder()
//!     .output_dir("out")
//!     .seed(7)
//!     .build()?;
//! assert_eq!(config.seed, 7);
//! # Ok::<(), stimprep::Error>(())
//! ```

use crate::filter::HomogeneityThresholds;
use crate::mat::WriteOptions;
use crate::split::SplitTargets;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default experiment container
pub const DEFAULT_INPUT: &str =
    "data/de_s1_V1_Ecc1to11_baseByRestPre_smlr_s1071119ROI_resol10_leave0_1x1_preprocessed.mat";
/// Default output directory
pub const DEFAULT_OUTPUT_DIR: &str = "data";
/// Default output file prefix
pub const DEFAULT_PREFIX: &str = "miyawaki";
/// Default top-level struct variable in the container
pub const DEFAULT_VARIABLE: &str = "D";
/// Default split seed
pub const DEFAULT_SEED: u64 = 42;

/// Configuration for one preparation run (all datasets)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepConfig {
    /// Experiment container path
    pub input: PathBuf,
    /// Directory receiving the dataset files
    pub output_dir: PathBuf,
    /// Output file name prefix
    pub prefix: String,
    /// Top-level struct variable holding `design`, `label`, `data`
    pub variable: String,
    /// Homogeneity thresholds
    pub thresholds: HomogeneityThresholds,
    /// Thresholds for the single retry when nothing passes
    pub relaxed_thresholds: HomogeneityThresholds,
    /// Train/test targets
    pub targets: SplitTargets,
    /// Seed for every split (re-applied per dataset)
    pub seed: u64,
    /// zlib-compress output variables
    pub compress: bool,
    /// Where to write the JSON generation report, if anywhere
    pub report_path: Option<PathBuf>,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            prefix: DEFAULT_PREFIX.to_string(),
            variable: DEFAULT_VARIABLE.to_string(),
            thresholds: HomogeneityThresholds::DEFAULT,
            relaxed_thresholds: HomogeneityThresholds::RELAXED,
            targets: SplitTargets::default(),
            seed: DEFAULT_SEED,
            compress: false,
            report_path: Some(Path::new(DEFAULT_OUTPUT_DIR).join("prep_report.json")),
        }
    }
}

impl PrepConfig {
    /// Create a builder starting from the defaults
    #[must_use]
    pub fn builder() -> PrepConfigBuilder {
        PrepConfigBuilder::default()
    }

    /// Check the configuration for values no run could succeed with
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] describing the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.targets.total() == 0 {
            return Err(Error::InvalidInput(
                "train and test targets are both zero".to_string(),
            ));
        }
        for (name, t) in [
            ("thresholds", self.thresholds),
            ("relaxed_thresholds", self.relaxed_thresholds),
        ] {
            if !(t.variance >= 0.0 && t.range >= 0.0) {
                return Err(Error::InvalidInput(format!(
                    "{name} must be non-negative, got variance {} range {}",
                    t.variance, t.range
                )));
            }
        }
        if self.variable.is_empty() {
            return Err(Error::InvalidInput("struct variable name is empty".to_string()));
        }
        Ok(())
    }

    /// MAT encoding options
    #[must_use]
    pub const fn write_options(&self) -> WriteOptions {
        WriteOptions {
            compress: self.compress,
        }
    }

    /// Output path for a file name
    #[must_use]
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }
}

/// Builder for [`PrepConfig`]
#[derive(Debug, Default)]
pub struct PrepConfigBuilder {
    config: PrepConfig,
}

impl PrepConfigBuilder {
    /// Set the experiment container path
    #[must_use]
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.input = path.into();
        self
    }

    /// Set the output directory
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Set the output file prefix
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Set the struct variable name
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>) -> Self {
        self.config.variable = name.into();
        self
    }

    /// Set the homogeneity thresholds
    #[must_use]
    pub fn thresholds(mut self, thresholds: HomogeneityThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    /// Set the relaxed retry thresholds
    #[must_use]
    pub fn relaxed_thresholds(mut self, thresholds: HomogeneityThresholds) -> Self {
        self.config.relaxed_thresholds = thresholds;
        self
    }

    /// Set the train/test targets
    #[must_use]
    pub fn targets(mut self, train: usize, test: usize) -> Self {
        self.config.targets = SplitTargets::new(train, test);
        self
    }

    /// Set the split seed
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Enable or disable zlib compression of output variables
    #[must_use]
    pub fn compress(mut self, compress: bool) -> Self {
        self.config.compress = compress;
        self
    }

    /// Set (or clear) the JSON report path
    #[must_use]
    pub fn report_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.report_path = path;
        self
    }

    /// Validate and build
    ///
    /// # Errors
    /// Returns error if [`PrepConfig::validate`] fails
    pub fn build(self) -> Result<PrepConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
