//! Experiment container loader
//!
//! The experiment file holds one struct variable (conventionally `D`) with
//! three row-aligned fields:
//!
//! ```text
//! design  [N, >=3]    session, run, condition, ...
//! label   [N, >=101]  stimulus id, 100 pixel intensities (10x10)
//! data    [N, F]      response vector per trial
//! ```
//!
//! Loading validates this schema up front and fails with a descriptive error
//! instead of indexing blindly into whatever the file holds.

use crate::mat::{MatFile, MatStruct, MatValue};
use crate::{Error, Result};
use ndarray::{s, Array2, ArrayView1, ArrayView2};
use std::path::Path;
use tracing::{debug, info};

/// Column of the design table holding the session number
pub const DESIGN_SESSION_COL: usize = 0;
/// Column of the design table holding the condition code
pub const DESIGN_CONDITION_COL: usize = 2;
/// Pixels per source stimulus (10x10)
pub const STIMULUS_PIXELS: usize = 100;

/// Validated trial population read from an experiment container.
///
/// Rows are trials in file order; all accessors index the same rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentData {
    sessions: Vec<i64>,
    conditions: Vec<i64>,
    stimulus_ids: Vec<i64>,
    pixels: Array2<f64>,
    responses: Array2<f64>,
}

impl ExperimentData {
    /// Load and validate an experiment container from disk
    ///
    /// # Errors
    /// Returns error if the file cannot be parsed or the struct variable
    /// does not match the expected schema
    pub fn load<P: AsRef<Path>>(path: P, variable: &str) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading experiment container");
        let file = MatFile::read(path)?;
        Self::from_mat(&file, variable)
    }

    /// Extract and validate the schema from an already-parsed container
    ///
    /// # Errors
    /// Returns error if a field is absent or has an unexpected shape
    pub fn from_mat(file: &MatFile, variable: &str) -> Result<Self> {
        let root = file
            .get(variable)
            .ok_or_else(|| Error::MissingField(format!("top-level variable `{variable}`")))?;
        let record = root.as_struct().ok_or_else(|| Error::ShapeMismatch {
            field: variable.to_string(),
            expected: "struct".to_string(),
            actual: root.kind().to_string(),
        })?;
        if record.is_empty() {
            return Err(Error::EmptyDataset(format!("struct `{variable}` has no elements")));
        }

        let design = numeric_field(record, "design")?;
        let label = numeric_field(record, "label")?;
        let data = numeric_field(record, "data")?;

        Self::from_tables(&design, &label, &data)
    }

    /// Build from row-major design, label and response tables
    ///
    /// # Errors
    /// Returns error if widths are too small, row counts disagree, or
    /// session/condition values are not integers
    pub fn from_tables(
        design: &Array2<f64>,
        label: &Array2<f64>,
        data: &Array2<f64>,
    ) -> Result<Self> {
        require_width("design", design, DESIGN_CONDITION_COL + 1)?;
        require_width("label", label, STIMULUS_PIXELS + 1)?;
        require_width("data", data, 1)?;

        let rows = design.nrows();
        for (name, table) in [("label", label), ("data", data)] {
            if table.nrows() != rows {
                return Err(Error::ShapeMismatch {
                    field: name.to_string(),
                    expected: format!("{rows} rows (as in `design`)"),
                    actual: format!("{} rows", table.nrows()),
                });
            }
        }

        let sessions = integer_column("design", design.column(DESIGN_SESSION_COL))?;
        let conditions = integer_column("design", design.column(DESIGN_CONDITION_COL))?;
        let stimulus_ids = integer_column("label", label.column(0))?;

        let pixels = label.slice(s![.., 1..=STIMULUS_PIXELS]).to_owned();

        debug!(
            trials = rows,
            features = data.ncols(),
            "Experiment schema validated"
        );

        Ok(Self {
            sessions,
            conditions,
            stimulus_ids,
            pixels,
            responses: data.clone(),
        })
    }

    /// Number of trials
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if the container holds no trials
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Session number per trial
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

    /// Source stimulus pixels, one 10x10 image (row-major) per row
    #[must_use]
    pub fn pixels(&self) -> ArrayView2<'_, f64> {
        self.pixels.view()
    }

    /// Response matrix, one trial per row
    #[must_use]
    pub fn responses(&self) -> ArrayView2<'_, f64> {
        self.responses.view()
    }

    /// Response vector width
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.responses.ncols()
    }
}

fn numeric_field(record: &MatStruct, name: &str) -> Result<Array2<f64>> {
    let value = record
        .field(name)
        .ok_or_else(|| Error::MissingField(format!("struct field `{name}`")))?;
    match value {
        MatValue::Numeric(array) => array.to_rows().map_err(|_| Error::ShapeMismatch {
            field: name.to_string(),
            expected: "2-D numeric array".to_string(),
            actual: format!("dims {:?}", array.dims()),
        }),
        other => Err(Error::ShapeMismatch {
            field: name.to_string(),
            expected: "numeric array".to_string(),
            actual: other.kind().to_string(),
        }),
    }
}

fn require_width(name: &str, table: &Array2<f64>, min_cols: usize) -> Result<()> {
    if table.ncols() < min_cols {
        return Err(Error::ShapeMismatch {
            field: name.to_string(),
            expected: format!("at least {min_cols} columns"),
            actual: format!("{} columns", table.ncols()),
        });
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn integer_column(name: &str, column: ArrayView1<'_, f64>) -> Result<Vec<i64>> {
    column
        .iter()
        .map(|&v| {
            if v.is_finite() && v.fract() == 0.0 {
                Ok(v as i64)
            } else {
                Err(Error::ShapeMismatch {
                    field: name.to_string(),
                    expected: "integer codes".to_string(),
                    actual: format!("{v}"),
                })
            }
        })
        .collect()
}
