//! MAT Level 5 serializer (little-endian)

use super::{
    MatArray, MatFile, MatStruct, MatValue, NumericClass, HEADER_TEXT_LEN, MI_COMPRESSED,
    MI_DOUBLE, MI_INT16, MI_INT32, MI_INT64, MI_INT8, MI_MATRIX, MI_SINGLE, MI_UINT16, MI_UINT32,
    MI_UINT64, MI_UINT8, MX_CHAR, MX_STRUCT,
};
use crate::{Error, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

/// Longest struct field name MATLAB accepts
const MAX_FIELD_NAME_LEN: usize = 63;

/// Encoding options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Wrap each variable in a zlib `miCOMPRESSED` element (MAT v7 style)
    pub compress: bool,
}

/// Encode a MAT file to bytes
///
/// # Errors
/// Returns error if a variable cannot be represented (dimension overflow,
/// over-long struct field names) or compression fails
pub fn encode_mat(file: &MatFile, options: WriteOptions) -> Result<Vec<u8>> {
    let mut out = header();
    for (name, value) in file.variables() {
        let mut element = Vec::new();
        push_element(&mut element, MI_MATRIX, &encode_matrix(name, value)?)?;

        if options.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&element)?;
            let compressed = encoder.finish()?;
            out.extend_from_slice(&MI_COMPRESSED.to_le_bytes());
            out.extend_from_slice(&len_u32(compressed.len())?.to_le_bytes());
            out.extend_from_slice(&compressed);
        } else {
            out.extend_from_slice(&element);
        }
    }
    Ok(out)
}

fn header() -> Vec<u8> {
    let text = format!(
        "MATLAB 5.0 MAT-file, Platform: {}, Created on: {}",
        std::env::consts::OS,
        chrono::Utc::now().format("%a %b %e %H:%M:%S %Y")
    );
    let mut out = text.into_bytes();
    out.resize(HEADER_TEXT_LEN, b' ');
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&0x0100u16.to_le_bytes());
    out.extend_from_slice(b"IM");
    out
}

fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| Error::InvalidInput(format!("element of {len} bytes exceeds MAT limits")))
}

/// Append a tagged element padded to an 8-byte boundary
fn push_element(out: &mut Vec<u8>, data_type: u32, data: &[u8]) -> Result<()> {
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&len_u32(data.len())?.to_le_bytes());
    out.extend_from_slice(data);
    out.resize(out.len() + (8 - data.len() % 8) % 8, 0);
    Ok(())
}

fn encode_matrix(name: &str, value: &MatValue) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    match value {
        MatValue::Numeric(array) => {
            push_preamble(&mut body, array.class().code(), array.dims(), name)?;
            let (data_type, data) = encode_numeric(array);
            push_element(&mut body, data_type, &data)?;
        }
        MatValue::Char(text) => {
            let units: Vec<u16> = text.encode_utf16().collect();
            push_preamble(&mut body, MX_CHAR, &[1, units.len()], name)?;
            let data: Vec<u8> = units.iter().flat_map(|u| u.to_le_bytes()).collect();
            push_element(&mut body, MI_UINT16, &data)?;
        }
        MatValue::Struct(s) => {
            push_preamble(&mut body, MX_STRUCT, s.dims(), name)?;
            encode_struct(&mut body, s)?;
        }
        MatValue::Unsupported { class } => {
            return Err(Error::InvalidInput(format!(
                "cannot encode `{name}`: unsupported class {class}"
            )));
        }
    }
    Ok(body)
}

/// Array flags, dimensions and name sub-elements
fn push_preamble(body: &mut Vec<u8>, class: u8, dims: &[usize], name: &str) -> Result<()> {
    let mut flags = u32::from(class).to_le_bytes().to_vec();
    flags.extend_from_slice(&[0; 4]);
    push_element(body, MI_UINT32, &flags)?;

    let mut dim_bytes = Vec::with_capacity(dims.len() * 4);
    for &d in dims {
        let d = i32::try_from(d)
            .map_err(|_| Error::InvalidInput(format!("dimension {d} exceeds MAT limits")))?;
        dim_bytes.extend_from_slice(&d.to_le_bytes());
    }
    push_element(body, MI_INT32, &dim_bytes)?;
    push_element(body, MI_INT8, name.as_bytes())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn encode_numeric(array: &MatArray) -> (u32, Vec<u8>) {
    let values = array.data();
    match array.class() {
        NumericClass::Double => (
            MI_DOUBLE,
            values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ),
        NumericClass::Single => (
            MI_SINGLE,
            values.iter().flat_map(|&v| (v as f32).to_le_bytes()).collect(),
        ),
        NumericClass::Int8 => (
            MI_INT8,
            values.iter().flat_map(|&v| (v as i8).to_le_bytes()).collect(),
        ),
        NumericClass::UInt8 => (
            MI_UINT8,
            values.iter().flat_map(|&v| (v as u8).to_le_bytes()).collect(),
        ),
        NumericClass::Int16 => (
            MI_INT16,
            values.iter().flat_map(|&v| (v as i16).to_le_bytes()).collect(),
        ),
        NumericClass::UInt16 => (
            MI_UINT16,
            values.iter().flat_map(|&v| (v as u16).to_le_bytes()).collect(),
        ),
        NumericClass::Int32 => (
            MI_INT32,
            values.iter().flat_map(|&v| (v as i32).to_le_bytes()).collect(),
        ),
        NumericClass::UInt32 => (
            MI_UINT32,
            values.iter().flat_map(|&v| (v as u32).to_le_bytes()).collect(),
        ),
        NumericClass::Int64 => (
            MI_INT64,
            values.iter().flat_map(|&v| (v as i64).to_le_bytes()).collect(),
        ),
        NumericClass::UInt64 => (
            MI_UINT64,
            values.iter().flat_map(|&v| (v as u64).to_le_bytes()).collect(),
        ),
    }
}

fn encode_struct(body: &mut Vec<u8>, s: &MatStruct) -> Result<()> {
    let longest = s.field_names().iter().map(String::len).max().unwrap_or(0);
    if longest > MAX_FIELD_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "struct field name longer than {MAX_FIELD_NAME_LEN} bytes"
        )));
    }
    // Slot width includes the NUL terminator, rounded to 8 bytes
    let slot = (longest + 1).div_ceil(8) * 8;
    push_element(body, MI_INT32, &len_u32(slot)?.to_le_bytes())?;

    let mut names = Vec::with_capacity(slot * s.field_names().len());
    for field in s.field_names() {
        let start = names.len();
        names.extend_from_slice(field.as_bytes());
        names.resize(start + slot, 0);
    }
    push_element(body, MI_INT8, &names)?;

    for value in s.values() {
        push_element(body, MI_MATRIX, &encode_matrix("", value)?)?;
    }
    Ok(())
}
