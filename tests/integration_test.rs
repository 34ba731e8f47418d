//! End-to-end generation from a synthetic experiment container
//!
//! Tests the complete pipeline:
//! 1. Write an experiment container (struct `D` with design/label/data)
//! 2. Run all five generations
//! 3. Read the produced MAT files back and check shapes, splits, metadata

use ndarray::Array2;
use std::collections::BTreeSet;
use std::path::Path;
use stimprep::mat::{MatArray, MatFile, MatStruct, MatValue, WriteOptions};
use stimprep::pipeline::{combined_output_path, CONDITIONS};
use stimprep::{run_all, GenerationStatus, PrepConfig};

const FEATURES: usize = 12;

/// Pixel pattern of every stimulus in a block
#[derive(Clone, Copy)]
enum Texture {
    Varied,
    Flat,
    /// Left half `lo`, right half `hi`
    TwoLevel(f64, f64),
}

/// Trials per (condition, sessions) block; sessions cycle within a block
struct Block {
    condition: i64,
    sessions: &'static [i64],
    trials: usize,
    texture: Texture,
}

/// Create an experiment container with textured (or flat) stimuli
#[allow(clippy::cast_precision_loss)]
fn write_experiment(path: &Path, blocks: &[Block]) {
    let rows: usize = blocks.iter().map(|b| b.trials).sum();
    let mut design = Array2::<f64>::zeros((rows, 5));
    let mut label = Array2::<f64>::zeros((rows, 101));
    let mut data = Array2::<f64>::zeros((rows, FEATURES));

    let mut r = 0;
    for block in blocks {
        for i in 0..block.trials {
            design[[r, 0]] = block.sessions[i % block.sessions.len()] as f64;
            design[[r, 1]] = (i / 10) as f64;
            design[[r, 2]] = block.condition as f64;
            label[[r, 0]] = (i % 50) as f64;
            for p in 0..100 {
                label[[r, p + 1]] = match block.texture {
                    Texture::Varied => ((p * 7 + r * 3) % 11) as f64 / 10.0,
                    Texture::Flat => 0.5,
                    Texture::TwoLevel(lo, hi) => {
                        if p % 10 < 5 {
                            lo
                        } else {
                            hi
                        }
                    }
                };
            }
            for f in 0..FEATURES {
                data[[r, f]] = ((r * 31 + f * 17) % 97) as f64 - 40.0;
            }
            r += 1;
        }
    }

    let d = MatStruct::new()
        .with_field("design", MatArray::from_rows(&design))
        .with_field("label", MatArray::from_rows(&label))
        .with_field("data", MatArray::from_rows(&data));
    let mut file = MatFile::new();
    file.insert("D", d);
    file.write(path, WriteOptions { compress: true }).unwrap();
}

fn standard_blocks() -> Vec<Block> {
    vec![
        Block {
            condition: 2,
            sessions: &[21, 22, 23, 24],
            trials: 200,
            texture: Texture::Varied,
        },
        Block {
            condition: 3,
            sessions: &[25, 26],
            trials: 60,
            texture: Texture::Varied,
        },
        Block {
            condition: 4,
            sessions: &[27, 28],
            trials: 60,
            texture: Texture::Varied,
        },
        Block {
            condition: 5,
            sessions: &[29, 30, 31, 32],
            trials: 120,
            texture: Texture::Varied,
        },
    ]
}

fn config_for(dir: &Path) -> PrepConfig {
    PrepConfig::builder()
        .input(dir.join("experiment.mat"))
        .output_dir(dir.join("out"))
        .report_path(Some(dir.join("out").join("prep_report.json")))
        .build()
        .unwrap()
}

fn numeric<'a>(file: &'a MatFile, name: &str) -> &'a MatArray {
    file.get(name)
        .and_then(MatValue::as_numeric)
        .unwrap_or_else(|| panic!("missing numeric variable {name}"))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn indices(file: &MatFile, name: &str) -> BTreeSet<usize> {
    numeric(file, name).data().iter().map(|&v| v as usize).collect()
}

#[test]
fn test_condition2_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_experiment(&dir.path().join("experiment.mat"), &standard_blocks());
    let config = config_for(dir.path());

    let report = run_all(&config);
    assert!(report.all_succeeded(), "{report:?}");

    let file = MatFile::read(CONDITIONS[0].output_path(&config)).unwrap();
    assert_eq!(numeric(&file, "fmriTrn").dims(), &[150, FEATURES]);
    assert_eq!(numeric(&file, "stimTrn").dims(), &[150, 784]);
    assert_eq!(numeric(&file, "fmriTest").dims(), &[18, FEATURES]);
    assert_eq!(numeric(&file, "stimTest").dims(), &[18, 784]);
    assert_eq!(numeric(&file, "labelTrn").dims(), &[150, 1]);

    let train = indices(&file, "train_indices");
    let test = indices(&file, "test_indices");
    assert_eq!(train.len(), 150);
    assert_eq!(test.len(), 18);
    assert!(train.is_disjoint(&test));
    assert!(train.iter().chain(&test).all(|&i| i < 200));

    let stim = numeric(&file, "stimTrn").data();
    assert!(stim.iter().all(|&v| (0.0..=1.0).contains(&v)));

    let labels = numeric(&file, "labelTrn").data();
    assert!(labels.iter().all(|&s| (21.0..=24.0).contains(&s)));

    let meta = file.get("metadata").and_then(MatValue::as_struct).unwrap();
    assert_eq!(
        meta.field("description").and_then(MatValue::as_str),
        Some("Geometrical figures")
    );
    assert_eq!(
        meta.field("resize_method").and_then(MatValue::as_str),
        Some("integer_scaling")
    );
}

#[test]
fn test_stimuli_keep_source_precision() {
    let dir = tempfile::tempdir().unwrap();
    let mut blocks = standard_blocks();
    blocks[0].texture = Texture::TwoLevel(0.3, 1.0);
    write_experiment(&dir.path().join("experiment.mat"), &blocks);
    let config = config_for(dir.path());
    assert!(run_all(&config).all_succeeded());

    let file = MatFile::read(CONDITIONS[0].output_path(&config)).unwrap();
    for name in ["stimTrn", "stimTest"] {
        let stim = numeric(&file, name);
        assert!(stim.data().iter().any(|&v| v.to_bits() == 0.3_f64.to_bits()));
        assert!(stim
            .data()
            .iter()
            .all(|&v| v.to_bits() == 0.3_f64.to_bits() || v.to_bits() == 1.0_f64.to_bits()));
    }
}

#[test]
fn test_small_conditions_shrink_targets() {
    let dir = tempfile::tempdir().unwrap();
    write_experiment(&dir.path().join("experiment.mat"), &standard_blocks());
    let config = config_for(dir.path());
    let report = run_all(&config);

    // 60 of 168 needed: 150*60/168 = 53, 18*60/168 = 6
    let record = report.get("condition3_alphabet_1a").unwrap();
    assert_eq!(record.status(), GenerationStatus::Success);
    assert_eq!(record.train_samples(), Some(53));
    assert_eq!(record.test_samples(), Some(6));
}

#[test]
fn test_combined_stratified_test_set() {
    let dir = tempfile::tempdir().unwrap();
    write_experiment(&dir.path().join("experiment.mat"), &standard_blocks());
    let config = config_for(dir.path());
    run_all(&config);

    let file = MatFile::read(combined_output_path(&config)).unwrap();
    assert_eq!(numeric(&file, "fmriTrn").dims()[0], 150);
    assert_eq!(numeric(&file, "fmriTest").dims()[0], 18);

    let test_labels = numeric(&file, "labelTest").data();
    let count = |c: f64| {
        test_labels
            .iter()
            .filter(|&&l| (l - c).abs() < f64::EPSILON)
            .count()
    };
    // 18 over 4 conditions: 5, 5, 4, 4
    assert_eq!(
        [count(2.0), count(3.0), count(4.0), count(5.0)],
        [5, 5, 4, 4]
    );
    assert!(indices(&file, "train_indices").is_disjoint(&indices(&file, "test_indices")));

    let meta = file.get("metadata").and_then(MatValue::as_struct).unwrap();
    assert_eq!(
        meta.field("split_method").and_then(MatValue::as_str),
        Some("stratified_by_condition")
    );
    let dist = meta
        .field("test_distribution")
        .and_then(MatValue::as_struct)
        .unwrap();
    assert!(dist.field("condition_5").is_some());
}

#[test]
fn test_runs_are_reproducible() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    for dir in [&a, &b] {
        write_experiment(&dir.path().join("experiment.mat"), &standard_blocks());
        assert!(run_all(&config_for(dir.path())).all_succeeded());
    }

    let paths = |dir: &Path| {
        let config = config_for(dir);
        let mut paths: Vec<_> = CONDITIONS.iter().map(|c| c.output_path(&config)).collect();
        paths.push(combined_output_path(&config));
        paths
    };
    for (pa, pb) in paths(a.path()).into_iter().zip(paths(b.path())) {
        assert_eq!(MatFile::read(&pa).unwrap(), MatFile::read(&pb).unwrap());
    }
}

#[test]
fn test_missing_condition_fails_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mut blocks = standard_blocks();
    blocks.pop();
    write_experiment(&dir.path().join("experiment.mat"), &blocks);
    let config = config_for(dir.path());

    let report = run_all(&config);
    assert_eq!(report.records().len(), 5);
    assert_eq!(report.failed().count(), 1);

    let failed = report.get("condition5_alphabet_2").unwrap();
    assert_eq!(failed.status(), GenerationStatus::Failed);
    assert!(failed.error().unwrap().contains("Empty dataset"));
    assert!(!CONDITIONS[3].output_path(&config).exists());
    assert!(combined_output_path(&config).exists());
}

#[test]
fn test_flat_condition_fails_after_relaxation() {
    let dir = tempfile::tempdir().unwrap();
    let mut blocks = standard_blocks();
    blocks[2].texture = Texture::Flat;
    write_experiment(&dir.path().join("experiment.mat"), &blocks);
    let config = config_for(dir.path());

    let report = run_all(&config);
    let failed: Vec<_> = report.failed().map(|r| r.name().to_string()).collect();
    assert_eq!(failed, vec!["condition4_alphabet_1b".to_string()]);

    // Flat trials are dropped from the combined dataset too
    let combined = report.get("conditions_2to5_combined").unwrap();
    let meta = combined.metadata().unwrap();
    assert_eq!(meta.original_samples, 440);
    assert_eq!(meta.filtered_samples, 380);
    assert_eq!(meta.conditions, vec![2, 3, 5]);
}

#[test]
fn test_report_written_as_json() {
    let dir = tempfile::tempdir().unwrap();
    write_experiment(&dir.path().join("experiment.mat"), &standard_blocks());
    let config = config_for(dir.path());
    let report = run_all(&config);
    report.write_json(config.report_path.as_ref().unwrap()).unwrap();

    let text = std::fs::read_to_string(config.report_path.as_ref().unwrap()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    let records = json["records"].as_array().unwrap();
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r["status"] == "success"));
    assert_eq!(records[0]["train_samples"], 150);
}

#[test]
fn test_missing_input_fails_every_generation() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let report = run_all(&config);
    assert_eq!(report.failed().count(), 5);
    assert!(report
        .records()
        .iter()
        .all(|r| r.error().unwrap().contains("IO error")));
}
