//! Error types for stimprep
//!
//! Every variant names the field, file or threshold involved so a failed
//! generation says what to fix.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// stimprep error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unsupported MAT container
    #[error("MAT format error: {0}")]
    MatFormat(String),

    /// Expected variable or struct field absent from the container
    #[error("Missing field: {0}\nExpected a struct with fields `design`, `label` and `data`")]
    MissingField(String),

    /// Field present but with the wrong shape, width or element type
    #[error("Shape mismatch in `{field}`: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Field or array name
        field: String,
        /// What the schema requires
        expected: String,
        /// What the container holds
        actual: String,
    },

    /// No trials left to build a dataset from
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    /// Invalid argument or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (generation report)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
