//! MAT Level 5 container codec
//!
//! MATLAB's binary `.mat` format (Level 5, the default of `scipy.io.savemat`):
//! a 128-byte text header followed by tagged data elements. Each top-level
//! element is a `miMATRIX` (optionally wrapped in a zlib `miCOMPRESSED`
//! element) holding one named variable.
//!
//! ## Layout
//!
//! ```text
//! [header: 116 text | 8 subsys | u16 version | "IM"/"MI"]
//! [tag: u32 type | u32 nbytes][payload][pad to 8]    (repeated)
//! ```
//!
//! Only the classes needed for stimulus/response datasets are modeled:
//! numeric arrays, character arrays and struct arrays. Numeric values are
//! widened to `f64` in memory and narrowed back to their class on write.
//!
//! MAT arrays are column-major. [`MatArray::from_rows`] and
//! [`MatArray::to_rows`] convert to and from row-major `ndarray` matrices.

mod reader;
mod writer;

pub use reader::parse_mat;
pub use writer::{encode_mat, WriteOptions};

use crate::{Error, Result};
use ndarray::{Array2, ShapeBuilder};
use std::fs;
use std::path::Path;

// Data element types (miXXX)
pub(crate) const MI_INT8: u32 = 1;
pub(crate) const MI_UINT8: u32 = 2;
pub(crate) const MI_INT16: u32 = 3;
pub(crate) const MI_UINT16: u32 = 4;
pub(crate) const MI_INT32: u32 = 5;
pub(crate) const MI_UINT32: u32 = 6;
pub(crate) const MI_SINGLE: u32 = 7;
pub(crate) const MI_DOUBLE: u32 = 9;
pub(crate) const MI_INT64: u32 = 12;
pub(crate) const MI_UINT64: u32 = 13;
pub(crate) const MI_MATRIX: u32 = 14;
pub(crate) const MI_COMPRESSED: u32 = 15;
pub(crate) const MI_UTF8: u32 = 16;
pub(crate) const MI_UTF16: u32 = 17;

// Array classes (mxXXX_CLASS)
pub(crate) const MX_STRUCT: u8 = 2;
pub(crate) const MX_CHAR: u8 = 4;

/// Header text length (before subsystem offset, version and endian marker)
pub(crate) const HEADER_TEXT_LEN: usize = 116;
/// Full header length
pub(crate) const HEADER_LEN: usize = 128;

/// Numeric array class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericClass {
    /// 64-bit float (`mxDOUBLE_CLASS`)
    Double,
    /// 32-bit float (`mxSINGLE_CLASS`)
    Single,
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Signed 16-bit integer
    Int16,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 32-bit integer
    UInt32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 64-bit integer
    UInt64,
}

impl NumericClass {
    /// Map an `mxCLASS` code to a numeric class
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            6 => Some(Self::Double),
            7 => Some(Self::Single),
            8 => Some(Self::Int8),
            9 => Some(Self::UInt8),
            10 => Some(Self::Int16),
            11 => Some(Self::UInt16),
            12 => Some(Self::Int32),
            13 => Some(Self::UInt32),
            14 => Some(Self::Int64),
            15 => Some(Self::UInt64),
            _ => None,
        }
    }

    /// `mxCLASS` code
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Double => 6,
            Self::Single => 7,
            Self::Int8 => 8,
            Self::UInt8 => 9,
            Self::Int16 => 10,
            Self::UInt16 => 11,
            Self::Int32 => 12,
            Self::UInt32 => 13,
            Self::Int64 => 14,
            Self::UInt64 => 15,
        }
    }
}

/// Number of elements described by `dims`
///
/// # Errors
/// Returns [`Error::MatFormat`] if the product overflows `usize`
pub fn element_count(dims: &[usize]) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| Error::MatFormat(format!("dims {dims:?} overflow the element count")))
}

/// Numeric array (column-major, values widened to `f64`)
#[derive(Debug, Clone, PartialEq)]
pub struct MatArray {
    class: NumericClass,
    dims: Vec<usize>,
    data: Vec<f64>,
}

impl MatArray {
    /// Create an array from column-major data
    ///
    /// # Errors
    /// Returns error if the data length does not match the dimensions
    pub fn new(class: NumericClass, dims: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected = element_count(&dims)?;
        if dims.len() < 2 || expected != data.len() {
            return Err(Error::MatFormat(format!(
                "dims {dims:?} do not describe {} elements",
                data.len()
            )));
        }
        Ok(Self { class, dims, data })
    }

    /// 1×1 double scalar
    #[must_use]
    pub fn scalar(value: f64) -> Self {
        Self {
            class: NumericClass::Double,
            dims: vec![1, 1],
            data: vec![value],
        }
    }

    /// 1×N double row vector
    #[must_use]
    pub fn row(values: &[f64]) -> Self {
        Self {
            class: NumericClass::Double,
            dims: vec![1, values.len()],
            data: values.to_vec(),
        }
    }

    /// 1×N int64 row vector of indices
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn index_row(indices: &[usize]) -> Self {
        Self {
            class: NumericClass::Int64,
            dims: vec![1, indices.len()],
            data: indices.iter().map(|&i| i as f64).collect(),
        }
    }

    /// Double array from a row-major matrix
    #[must_use]
    pub fn from_rows(matrix: &Array2<f64>) -> Self {
        let (rows, cols) = matrix.dim();
        // Logical iteration of the transpose yields column-major order
        let data = matrix.t().iter().copied().collect();
        Self {
            class: NumericClass::Double,
            dims: vec![rows, cols],
            data,
        }
    }

    /// Convert a 2-D array to a row-major matrix
    ///
    /// # Errors
    /// Returns error if the array is not two-dimensional
    pub fn to_rows(&self) -> Result<Array2<f64>> {
        if self.dims.len() != 2 {
            return Err(Error::MatFormat(format!(
                "expected a 2-D array, got dims {:?}",
                self.dims
            )));
        }
        let shape = (self.dims[0], self.dims[1]).f();
        let matrix = Array2::from_shape_vec(shape, self.data.clone())
            .map_err(|e| Error::MatFormat(format!("bad array shape: {e}")))?;
        Ok(matrix.as_standard_layout().into_owned())
    }

    /// Element class
    #[must_use]
    pub const fn class(&self) -> NumericClass {
        self.class
    }

    /// Dimensions
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Column-major values
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

/// Struct array; values are stored element-major (`element * nfields + field`)
#[derive(Debug, Clone, PartialEq)]
pub struct MatStruct {
    dims: Vec<usize>,
    field_names: Vec<String>,
    values: Vec<MatValue>,
}

impl MatStruct {
    /// Empty 1×1 struct
    #[must_use]
    pub fn new() -> Self {
        Self {
            dims: vec![1, 1],
            field_names: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build a struct array from its raw parts
    ///
    /// # Errors
    /// Returns error if `values` does not hold one value per element and field
    pub fn from_parts(
        dims: Vec<usize>,
        field_names: Vec<String>,
        values: Vec<MatValue>,
    ) -> Result<Self> {
        let slots = element_count(&dims)?
            .checked_mul(field_names.len())
            .ok_or_else(|| Error::MatFormat(format!("struct {dims:?} has too many field slots")))?;
        if values.len() != slots {
            return Err(Error::MatFormat(format!(
                "struct {dims:?} with {} fields cannot hold {} values",
                field_names.len(),
                values.len()
            )));
        }
        Ok(Self {
            dims,
            field_names,
            values,
        })
    }

    /// Append a field to a 1×1 struct
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<MatValue>) -> Self {
        self.field_names.push(name.into());
        self.values.push(value.into());
        self
    }

    /// Field of the first element
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&MatValue> {
        self.field_at(0, name)
    }

    /// Field of the given element (column-major element order)
    #[must_use]
    pub fn field_at(&self, element: usize, name: &str) -> Option<&MatValue> {
        let position = self.field_names.iter().position(|f| f == name)?;
        self.values.get(element * self.field_names.len() + position)
    }

    /// Field names in declaration order
    #[must_use]
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Struct array dimensions
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of struct elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    /// True if the struct array has no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn values(&self) -> &[MatValue] {
        &self.values
    }
}

impl Default for MatStruct {
    fn default() -> Self {
        Self::new()
    }
}

/// A MAT variable value
#[derive(Debug, Clone, PartialEq)]
pub enum MatValue {
    /// Numeric array
    Numeric(MatArray),
    /// Character array (row string)
    Char(String),
    /// Struct array
    Struct(MatStruct),
    /// Class the codec does not model (cell, object, sparse, ...)
    Unsupported {
        /// `mxCLASS` code
        class: u8,
    },
}

impl MatValue {
    /// Numeric array, if this value is one
    #[must_use]
    pub const fn as_numeric(&self) -> Option<&MatArray> {
        match self {
            Self::Numeric(array) => Some(array),
            _ => None,
        }
    }

    /// Struct array, if this value is one
    #[must_use]
    pub const fn as_struct(&self) -> Option<&MatStruct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// String, if this value is a char array
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Char(s) => Some(s),
            _ => None,
        }
    }

    /// Short kind name for error messages
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Numeric(_) => "numeric array",
            Self::Char(_) => "char array",
            Self::Struct(_) => "struct",
            Self::Unsupported { .. } => "unsupported class",
        }
    }
}

impl From<MatArray> for MatValue {
    fn from(array: MatArray) -> Self {
        Self::Numeric(array)
    }
}

impl From<MatStruct> for MatValue {
    fn from(s: MatStruct) -> Self {
        Self::Struct(s)
    }
}

impl From<&str> for MatValue {
    fn from(s: &str) -> Self {
        Self::Char(s.to_string())
    }
}

impl From<String> for MatValue {
    fn from(s: String) -> Self {
        Self::Char(s)
    }
}

/// In-memory MAT file: named variables in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatFile {
    variables: Vec<(String, MatValue)>,
}

impl MatFile {
    /// Create an empty file
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a MAT file from disk
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a valid Level 5 MAT file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        parse_mat(&bytes)
    }

    /// Serialize and write to disk
    ///
    /// # Errors
    /// Returns error if encoding fails or the file cannot be written
    pub fn write<P: AsRef<Path>>(&self, path: P, options: WriteOptions) -> Result<()> {
        let bytes = encode_mat(self, options)?;
        fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    /// Insert or replace a variable
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<MatValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.variables.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.variables.push((name, value));
        }
    }

    /// Look up a variable by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MatValue> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Variable names in file order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(n, _)| n.as_str())
    }

    /// Number of variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// True if the file holds no variables
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub(crate) fn variables(&self) -> &[(String, MatValue)] {
        &self.variables
    }
}
