//! Dataset generation pipeline
//!
//! One generation runs: condition filter, homogeneity filter, target
//! shrinkage, sharp upsampling with global-max normalization, response
//! standardization, split, metadata. [`run_all`] drives the four
//! single-condition datasets and the combined one, capturing each outcome in
//! a [`PrepReport`] so a failure never stops the remaining generations.

use crate::config::PrepConfig;
use crate::dataset::{distribution, LabelKind, Metadata, PreparedDataset, SplitPart, RESIZE_METHOD};
use crate::export::write_dataset;
use crate::filter::{filter_homogeneous, unique_sorted, HomogeneityOutcome, TrialSubset};
use crate::loader::ExperimentData;
use crate::report::{GenerationRecord, PrepReport};
use crate::split::{random_split, stratified_split, SplitMethod, SplitTargets};
use crate::standardize::{standardize, FeatureStats};
use crate::upsample::{normalize_by_global_max, SharpUpsampler};
use crate::{Error, Result};
use ndarray::Array2;
use std::path::PathBuf;
use tracing::{debug, error, info, info_span, warn};

/// A stimulus condition of the experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionSpec {
    /// Condition code in the design table
    pub code: i64,
    /// Short name used in output file names
    pub name: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Sessions expected to carry this condition
    pub sessions: &'static [i64],
}

/// The four stimulus conditions, ascending by code
pub static CONDITIONS: [ConditionSpec; 4] = [
    ConditionSpec {
        code: 2,
        name: "geometrical",
        description: "Geometrical figures",
        sessions: &[21, 22, 23, 24],
    },
    ConditionSpec {
        code: 3,
        name: "alphabet_1a",
        description: "Alphabet letters-1A",
        sessions: &[25, 26],
    },
    ConditionSpec {
        code: 4,
        name: "alphabet_1b",
        description: "Alphabet letters-1B",
        sessions: &[27, 28],
    },
    ConditionSpec {
        code: 5,
        name: "alphabet_2",
        description: "Alphabet letters-2",
        sessions: &[29, 30, 31, 32],
    },
];

/// Description of the combined dataset
pub const COMBINED_DESCRIPTION: &str =
    "Combined Conditions 2-5: Geometrical figures + Alphabet letters";

/// Name of the combined generation in reports
pub const COMBINED_NAME: &str = "conditions_2to5_combined";

impl ConditionSpec {
    /// Look up a condition by code
    #[must_use]
    pub fn by_code(code: i64) -> Option<&'static Self> {
        CONDITIONS.iter().find(|c| c.code == code)
    }

    /// Generation name, e.g. `condition2_geometrical`
    #[must_use]
    pub fn dataset_name(&self) -> String {
        format!("condition{}_{}", self.code, self.name)
    }

    /// Output file path for this condition
    #[must_use]
    pub fn output_path(&self, config: &PrepConfig) -> PathBuf {
        config.output_path(&format!("{}_{}_sharp.mat", config.prefix, self.dataset_name()))
    }
}

/// Output file path for the combined dataset
#[must_use]
pub fn combined_output_path(config: &PrepConfig) -> PathBuf {
    config.output_path(&format!("{}_{COMBINED_NAME}_sharp.mat", config.prefix))
}

/// Filtered, upsampled and standardized trials ready for splitting
struct Processed {
    trials: TrialSubset,
    outcome: HomogeneityOutcome,
    original_samples: usize,
    stimuli: Array2<f64>,
    responses: Array2<f64>,
}

fn process(selected: TrialSubset, config: &PrepConfig) -> Result<Processed> {
    if selected.is_empty() {
        return Err(Error::EmptyDataset(
            "no trials match the requested conditions".to_string(),
        ));
    }
    info!(
        trials = selected.len(),
        unique_stimuli = selected.unique_stimuli(),
        "Stimulus data"
    );

    let outcome = filter_homogeneous(
        selected.pixels(),
        config.thresholds,
        config.relaxed_thresholds,
    )?;
    let trials = selected.retain(&outcome.kept_indices());

    let mut stimuli = SharpUpsampler::default().apply_batch(trials.pixels())?;
    normalize_by_global_max(&mut stimuli)?;

    let stats = FeatureStats::compute(trials.responses());
    if stats.constant_features() > 0 {
        debug!(
            constant = stats.constant_features(),
            "Zero-variance features standardize to 0"
        );
    }
    let responses = standardize(trials.responses());
    info!(
        samples = trials.len(),
        features = responses.ncols(),
        "Standardized responses"
    );

    Ok(Processed {
        original_samples: selected.len(),
        trials,
        outcome,
        stimuli,
        responses,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_metadata(
    processed: &Processed,
    description: &str,
    condition: Option<i64>,
    sessions: Vec<i64>,
    split_method: SplitMethod,
    label_kind: LabelKind,
    targets: SplitTargets,
    (train, test): (&SplitPart, &SplitPart),
    config: &PrepConfig,
) -> Metadata {
    let universe: Vec<i64> = match label_kind {
        LabelKind::Session => processed.trials.unique_sessions(),
        LabelKind::Condition => processed.trials.unique_conditions(),
    };
    let applied = processed.outcome.applied();
    Metadata {
        description: description.to_string(),
        condition,
        conditions: processed.trials.unique_conditions(),
        sessions,
        resize_method: RESIZE_METHOD.to_string(),
        split_method,
        label_kind,
        original_samples: processed.original_samples,
        filtered_samples: processed.trials.len(),
        threshold_variance: config.thresholds.variance,
        threshold_range: config.thresholds.range,
        applied_threshold_variance: applied.variance,
        applied_threshold_range: applied.range,
        thresholds_relaxed: processed.outcome.relaxed(),
        unique_stimuli: processed.trials.unique_stimuli(),
        target_train_size: targets.train,
        target_test_size: targets.test,
        train_distribution: distribution(&train.labels, &universe),
        test_distribution: distribution(&test.labels, &universe),
    }
}

/// Prepare a single-condition dataset: random split, session labels.
///
/// # Errors
/// Returns [`Error::EmptyDataset`] if no trial carries the condition or no
/// stimulus survives the relaxed homogeneity filter, or a processing error
pub fn prepare_condition_dataset(
    experiment: &ExperimentData,
    condition: &ConditionSpec,
    config: &PrepConfig,
) -> Result<PreparedDataset> {
    let selected = TrialSubset::select_conditions(experiment, &[condition.code]);
    let observed = selected.unique_sessions();
    if observed.iter().any(|s| !condition.sessions.contains(s)) {
        warn!(
            observed = ?observed,
            expected = ?condition.sessions,
            "Observed sessions differ from expected"
        );
    }

    let processed = process(selected, config)?;
    let population = processed.trials.len();
    let targets = config.targets.fit_to(population);
    let split = random_split(population, targets, config.seed);

    let labels = processed.trials.sessions();
    let train = SplitPart::gather(
        processed.stimuli.view(),
        processed.responses.view(),
        labels,
        &split.train,
    );
    let test = SplitPart::gather(
        processed.stimuli.view(),
        processed.responses.view(),
        labels,
        &split.test,
    );

    let metadata = build_metadata(
        &processed,
        condition.description,
        Some(condition.code),
        condition.sessions.to_vec(),
        SplitMethod::Random,
        LabelKind::Session,
        targets,
        (&train, &test),
        config,
    );
    debug!(
        train = ?metadata.train_distribution,
        test = ?metadata.test_distribution,
        "Session distribution"
    );
    Ok(PreparedDataset {
        train,
        test,
        metadata,
    })
}

/// Prepare the combined dataset over `conditions`: stratified split,
/// condition labels.
///
/// # Errors
/// Returns [`Error::EmptyDataset`] if no trial carries any of the conditions
/// or no stimulus survives the relaxed homogeneity filter, or a processing
/// error
pub fn prepare_combined_dataset(
    experiment: &ExperimentData,
    conditions: &[ConditionSpec],
    config: &PrepConfig,
) -> Result<PreparedDataset> {
    let codes: Vec<i64> = conditions.iter().map(|c| c.code).collect();
    let selected = TrialSubset::select_conditions(experiment, &codes);
    let processed = process(selected, config)?;

    let labels = processed.trials.conditions();
    let stratified = stratified_split(labels, config.targets, config.seed);
    for &(condition, quota) in &stratified.quotas {
        debug!(condition, quota, "Test quota");
    }
    let split = &stratified.split;
    let train = SplitPart::gather(
        processed.stimuli.view(),
        processed.responses.view(),
        labels,
        &split.train,
    );
    let test = SplitPart::gather(
        processed.stimuli.view(),
        processed.responses.view(),
        labels,
        &split.test,
    );

    let sessions = unique_sorted(processed.trials.sessions());
    let metadata = build_metadata(
        &processed,
        COMBINED_DESCRIPTION,
        None,
        sessions,
        SplitMethod::StratifiedByCondition,
        LabelKind::Condition,
        stratified.targets,
        (&train, &test),
        config,
    );
    debug!(
        train = ?metadata.train_distribution,
        test = ?metadata.test_distribution,
        "Condition distribution"
    );
    Ok(PreparedDataset {
        train,
        test,
        metadata,
    })
}

fn generate<F>(name: String, output: PathBuf, config: &PrepConfig, prepare: F) -> GenerationRecord
where
    F: FnOnce() -> Result<PreparedDataset>,
{
    let span = info_span!("dataset", name = %name);
    let _guard = span.enter();

    let mut record = GenerationRecord::new(name, output.clone());
    record.start();
    let result = prepare().and_then(|dataset| {
        write_dataset(&dataset, &output, config.write_options())?;
        Ok(dataset)
    });
    match result {
        Ok(dataset) => {
            info!(
                train = dataset.train.len(),
                test = dataset.test.len(),
                "Dataset complete"
            );
            record.succeed(dataset.train.len(), dataset.test.len(), dataset.metadata);
        }
        Err(e) => {
            error!(error = %e, "Dataset generation failed");
            record.fail(e.to_string());
        }
    }
    record
}

/// Generate every single-condition dataset and the combined dataset.
///
/// The experiment is loaded afresh for each generation, so a load failure is
/// recorded per dataset like any other error.
#[must_use]
pub fn run_all(config: &PrepConfig) -> PrepReport {
    let mut report = PrepReport::new();
    let load = || ExperimentData::load(&config.input, &config.variable);

    for condition in &CONDITIONS {
        let record = generate(
            condition.dataset_name(),
            condition.output_path(config),
            config,
            || prepare_condition_dataset(&load()?, condition, config),
        );
        report.push(record);
    }

    let record = generate(
        COMBINED_NAME.to_string(),
        combined_output_path(config),
        config,
        || prepare_combined_dataset(&load()?, &CONDITIONS, config),
    );
    report.push(record);

    info!(
        succeeded = report.succeeded().count(),
        failed = report.failed().count(),
        "All generations finished"
    );
    report
}
