//! # stimprep: sharp stimulus/response dataset preparation
//!
//! Turns a visual-reconstruction experiment container (stimulus images,
//! response vectors, design table) into train/test datasets, one per
//! stimulus condition plus one combined, written as MAT Level 5 files.
//!
//! ## Pipeline
//!
//! ```text
//! load ─▶ condition filter ─▶ homogeneity filter ─▶ 3x replicate + crop 28x28
//!      ─▶ global-max normalize ─▶ z-score responses ─▶ split ─▶ MAT file
//! ```
//!
//! - Homogeneous (near-flat) stimuli are dropped; if none survive, the
//!   thresholds are relaxed once
//! - Upsampling is exact pixel replication, no interpolation
//! - Single-condition datasets use a seeded random split labelled by session;
//!   the combined dataset uses a per-condition stratified test set
//!
//! ## Example
//!
//! ```rust,no_run
//! use stimprep::{run_all, PrepConfig};
//!
//! let config = PrepConfig::builder().output_dir("out").build()?;
//! let report = run_all(&config);
//! for record in report.failed() {
//!     eprintln!("{}: {:?}", record.name(), record.error());
//! }
//! # Ok::<(), stimprep::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod filter;
pub mod loader;
pub mod mat;
pub mod pipeline;
pub mod reduce;
pub mod report;
pub mod split;
pub mod standardize;
pub mod upsample;

pub use config::PrepConfig;
pub use dataset::{Metadata, PreparedDataset};
pub use error::{Error, Result};
pub use loader::ExperimentData;
pub use pipeline::{prepare_combined_dataset, prepare_condition_dataset, run_all, ConditionSpec};
pub use report::{GenerationRecord, GenerationStatus, PrepReport};
