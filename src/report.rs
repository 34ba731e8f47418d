//! Generation Report - per-dataset outcome tracking
//!
//! Every dataset generation is recorded as a [`GenerationRecord`] that moves
//! from `Pending` to `Running` to `Success` or `Failed`. The
//! [`PrepReport`] collects them so one failed dataset never hides the others.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::Metadata;
use crate::Result;

/// Status of a dataset generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Created but not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Dataset written.
    Success,
    /// Generation failed; no file written.
    Failed,
}

/// Outcome of one dataset generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRecord {
    name: String,
    output: PathBuf,
    status: GenerationStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    error: Option<String>,
    train_samples: Option<usize>,
    test_samples: Option<usize>,
    metadata: Option<Metadata>,
}

impl GenerationRecord {
    /// Create a record in Pending status.
    #[must_use]
    pub fn new(name: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            status: GenerationStatus::Pending,
            started_at: None,
            ended_at: None,
            error: None,
            train_samples: None,
            test_samples: None,
            metadata: None,
        }
    }

    /// Dataset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output file path.
    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> GenerationStatus {
        self.status
    }

    /// Start timestamp, if started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// End timestamp, if finished.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Error message of a failed generation.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Train sample count of a successful generation.
    #[must_use]
    pub const fn train_samples(&self) -> Option<usize> {
        self.train_samples
    }

    /// Test sample count of a successful generation.
    #[must_use]
    pub const fn test_samples(&self) -> Option<usize> {
        self.test_samples
    }

    /// Metadata written with the dataset.
    #[must_use]
    pub const fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Transition to Running and stamp `started_at`.
    pub fn start(&mut self) {
        self.status = GenerationStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark as written.
    pub fn succeed(&mut self, train: usize, test: usize, metadata: Metadata) {
        self.status = GenerationStatus::Success;
        self.ended_at = Some(Utc::now());
        self.train_samples = Some(train);
        self.test_samples = Some(test);
        self.metadata = Some(metadata);
    }

    /// Mark as failed with the error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = GenerationStatus::Failed;
        self.ended_at = Some(Utc::now());
        self.error = Some(error.into());
    }
}

/// All generation outcomes of one run, in execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrepReport {
    records: Vec<GenerationRecord>,
}

impl PrepReport {
    /// Create an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&mut self, record: GenerationRecord) {
        self.records.push(record);
    }

    /// All records.
    #[must_use]
    pub fn records(&self) -> &[GenerationRecord] {
        &self.records
    }

    /// Look up a record by dataset name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&GenerationRecord> {
        self.records.iter().find(|r| r.name() == name)
    }

    /// Records that succeeded.
    pub fn succeeded(&self) -> impl Iterator<Item = &GenerationRecord> {
        self.records
            .iter()
            .filter(|r| r.status() == GenerationStatus::Success)
    }

    /// Records that failed.
    pub fn failed(&self) -> impl Iterator<Item = &GenerationRecord> {
        self.records
            .iter()
            .filter(|r| r.status() == GenerationStatus::Failed)
    }

    /// True if every generation succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Write the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{LabelKind, RESIZE_METHOD};
    use crate::split::SplitMethod;
    use std::collections::BTreeMap;

    fn metadata() -> Metadata {
        Metadata {
            description: "Alphabet letters-2".to_string(),
            condition: Some(5),
            conditions: vec![5],
            sessions: vec![29, 30, 31, 32],
            resize_method: RESIZE_METHOD.to_string(),
            split_method: SplitMethod::Random,
            label_kind: LabelKind::Session,
            original_samples: 10,
            filtered_samples: 8,
            threshold_variance: 0.01,
            threshold_range: 0.1,
            applied_threshold_variance: 0.01,
            applied_threshold_range: 0.1,
            thresholds_relaxed: false,
            unique_stimuli: 8,
            target_train_size: 7,
            target_test_size: 0,
            train_distribution: BTreeMap::new(),
            test_distribution: BTreeMap::new(),
        }
    }

    #[test]
    fn test_record_lifecycle_success() {
        let mut record = GenerationRecord::new("condition5", "data/c5.mat");
        assert_eq!(record.status(), GenerationStatus::Pending);
        record.start();
        assert_eq!(record.status(), GenerationStatus::Running);
        assert!(record.started_at().is_some());
        record.succeed(7, 0, metadata());
        assert_eq!(record.status(), GenerationStatus::Success);
        assert_eq!(record.train_samples(), Some(7));
        assert!(record.ended_at() >= record.started_at());
        assert!(record.error().is_none());
    }

    #[test]
    fn test_record_lifecycle_failure() {
        let mut record = GenerationRecord::new("combined", "data/c.mat");
        record.start();
        record.fail("Missing field: struct field `data`");
        assert_eq!(record.status(), GenerationStatus::Failed);
        assert!(record.error().unwrap().contains("data"));
        assert!(record.metadata().is_none());
    }

    #[test]
    fn test_report_partitions_outcomes() {
        let mut report = PrepReport::new();
        let mut ok = GenerationRecord::new("a", "a.mat");
        ok.succeed(1, 1, metadata());
        let mut bad = GenerationRecord::new("b", "b.mat");
        bad.fail("boom");
        report.push(ok);
        report.push(bad);
        assert_eq!(report.succeeded().count(), 1);
        assert_eq!(report.failed().count(), 1);
        assert!(!report.all_succeeded());
        assert_eq!(report.get("b").unwrap().error(), Some("boom"));
    }

    #[test]
    fn test_report_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut report = PrepReport::new();
        let mut record = GenerationRecord::new("a", "a.mat");
        record.start();
        record.succeed(3, 1, metadata());
        report.push(record);
        report.write_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"status\": \"success\""));
        let back: PrepReport = serde_json::from_str(&text).unwrap();
        assert_eq!(back, report);
    }
}
