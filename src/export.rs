//! Dataset serialization to MAT files
//!
//! Variables written per dataset:
//!
//! ```text
//! fmriTrn / fmriTest      [N, F]    standardized responses
//! stimTrn / stimTest      [N, 784]  upsampled, normalized stimuli
//! labelTrn / labelTest    [N, 1]    session or condition labels
//! train_indices           [1, N]    int64 positions in the filtered population
//! test_indices            [1, N]
//! metadata                1x1 struct
//! ```

use crate::dataset::PreparedDataset;
use crate::mat::{MatArray, MatFile, WriteOptions};
use crate::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// Build the MAT container for a prepared dataset
#[must_use]
pub fn to_mat_file(dataset: &PreparedDataset) -> MatFile {
    let mut file = MatFile::new();
    file.insert("fmriTrn", MatArray::from_rows(&dataset.train.responses));
    file.insert("stimTrn", MatArray::from_rows(&dataset.train.stimuli));
    file.insert("fmriTest", MatArray::from_rows(&dataset.test.responses));
    file.insert("stimTest", MatArray::from_rows(&dataset.test.stimuli));
    file.insert("labelTrn", MatArray::from_rows(&dataset.train.label_column()));
    file.insert("labelTest", MatArray::from_rows(&dataset.test.label_column()));
    file.insert("train_indices", MatArray::index_row(&dataset.train.indices));
    file.insert("test_indices", MatArray::index_row(&dataset.test.indices));
    file.insert("metadata", dataset.metadata.to_mat());
    file
}

/// Write a prepared dataset.
///
/// The file is encoded in memory, written to a sibling `.tmp` path and then
/// renamed, so a failure never leaves a partial file at `path`.
///
/// # Errors
/// Returns error if encoding fails or the file cannot be written
pub fn write_dataset<P: AsRef<Path>>(
    dataset: &PreparedDataset,
    path: P,
    options: WriteOptions,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let bytes = crate::mat::encode_mat(&to_mat_file(dataset), options)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("not a file path: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, &bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    info!(
        path = %path.display(),
        bytes = bytes.len(),
        train = dataset.train.len(),
        test = dataset.test.len(),
        "Dataset saved"
    );
    Ok(())
}
