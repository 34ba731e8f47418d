//! MAT Level 5 parser

use super::{
    element_count, MatArray, MatFile, MatStruct, MatValue, NumericClass, HEADER_LEN, MI_COMPRESSED, MI_DOUBLE,
    MI_INT16, MI_INT32, MI_INT64, MI_INT8, MI_MATRIX, MI_SINGLE, MI_UINT16, MI_UINT32, MI_UINT64,
    MI_UINT8, MI_UTF16, MI_UTF8, MX_CHAR, MX_STRUCT,
};
use crate::{Error, Result};
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Byte order declared by the header's endian indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

/// Bounds-checked cursor over a byte slice
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ByteReader<'a> {
    const fn new(buf: &'a [u8], endian: Endian) -> Self {
        Self {
            buf,
            pos: 0,
            endian,
        }
    }

    const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::MatFormat(format!(
                "truncated element: need {n} bytes, {} left",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        let raw = [b[0], b[1], b[2], b[3]];
        Ok(match self.endian {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        })
    }

    /// Read one tagged element, returning its type and payload.
    ///
    /// Handles the small-element format (type and size packed into the
    /// first word, payload in the second) and 8-byte padding. Compressed
    /// elements are not padded.
    fn element(&mut self) -> Result<(u32, &'a [u8])> {
        let first = self.u32()?;
        if first >> 16 != 0 {
            let data_type = first & 0xFFFF;
            let nbytes = (first >> 16) as usize;
            if nbytes > 4 {
                return Err(Error::MatFormat(format!(
                    "small element claims {nbytes} bytes"
                )));
            }
            let word = self.take(4)?;
            return Ok((data_type, &word[..nbytes]));
        }

        let nbytes = self.u32()? as usize;
        let payload = self.take(nbytes)?;
        if first != MI_COMPRESSED {
            let pad = (8 - nbytes % 8) % 8;
            // Trailing element of a buffer may omit its padding
            self.take(pad.min(self.remaining()))?;
        }
        Ok((first, payload))
    }
}

/// Parse a complete MAT Level 5 file
///
/// # Errors
/// Returns error if the header is missing, the endian indicator is unknown,
/// or any element is malformed
pub fn parse_mat(bytes: &[u8]) -> Result<MatFile> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::MatFormat(format!(
            "file is {} bytes, shorter than the {HEADER_LEN}-byte header",
            bytes.len()
        )));
    }
    if bytes.starts_with(b"MATLAB 7.3") {
        return Err(Error::MatFormat(
            "MAT v7.3 (HDF5) files are not supported; re-save with -v7".to_string(),
        ));
    }

    let endian = match &bytes[126..128] {
        b"IM" => Endian::Little,
        b"MI" => Endian::Big,
        other => {
            return Err(Error::MatFormat(format!(
                "unknown endian indicator {other:?}"
            )))
        }
    };

    let mut file = MatFile::new();
    let mut reader = ByteReader::new(&bytes[HEADER_LEN..], endian);
    while reader.remaining() >= 8 {
        let (data_type, payload) = reader.element()?;
        read_variable(&mut file, data_type, payload, endian)?;
    }
    Ok(file)
}

fn read_variable(file: &mut MatFile, data_type: u32, payload: &[u8], endian: Endian) -> Result<()> {
    match data_type {
        MI_MATRIX => {
            let (name, value) = parse_matrix(payload, endian)?;
            file.insert(name, value);
        }
        MI_COMPRESSED => {
            let mut inflated = Vec::new();
            ZlibDecoder::new(payload)
                .read_to_end(&mut inflated)
                .map_err(|e| Error::MatFormat(format!("bad compressed element: {e}")))?;
            let mut inner = ByteReader::new(&inflated, endian);
            let (inner_type, inner_payload) = inner.element()?;
            read_variable(file, inner_type, inner_payload, endian)?;
        }
        // Anything else at top level carries no variable
        _ => {}
    }
    Ok(())
}

/// Parse a `miMATRIX` payload into its name and value
fn parse_matrix(payload: &[u8], endian: Endian) -> Result<(String, MatValue)> {
    // Empty matrices in struct fields are written as zero-length elements
    if payload.is_empty() {
        let empty = MatArray::new(NumericClass::Double, vec![0, 0], Vec::new())?;
        return Ok((String::new(), MatValue::Numeric(empty)));
    }

    let mut r = ByteReader::new(payload, endian);

    let (flags_type, flags) = r.element()?;
    if flags_type != MI_UINT32 || flags.len() < 8 {
        return Err(Error::MatFormat("missing array flags".to_string()));
    }
    let flags_word = decode_u32s(flags, endian)[0];
    let class = (flags_word & 0xFF) as u8;
    let complex = flags_word & 0x0800 != 0;

    let (dims_type, dims_bytes) = r.element()?;
    if dims_type != MI_INT32 {
        return Err(Error::MatFormat("missing dimensions array".to_string()));
    }
    let dims = decode_numeric(MI_INT32, dims_bytes, endian)?
        .into_iter()
        .map(|d| {
            if d < 0.0 {
                Err(Error::MatFormat(format!("negative dimension {d}")))
            } else {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                Ok(d as usize)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let (name_type, name_bytes) = r.element()?;
    if name_type != MI_INT8 && name_type != MI_UINT8 {
        return Err(Error::MatFormat("missing array name".to_string()));
    }
    let name = String::from_utf8_lossy(name_bytes).into_owned();

    let value = if let Some(numeric) = NumericClass::from_code(class) {
        if complex {
            return Err(Error::MatFormat(format!(
                "complex array `{name}` is not supported"
            )));
        }
        let (real_type, real) = r.element()?;
        let data = decode_numeric(real_type, real, endian)?;
        MatValue::Numeric(MatArray::new(numeric, dims, data)?)
    } else if class == MX_CHAR {
        let (char_type, chars) = r.element()?;
        MatValue::Char(decode_chars(char_type, chars, &dims, endian)?)
    } else if class == MX_STRUCT {
        MatValue::Struct(parse_struct(&mut r, dims, endian)?)
    } else {
        MatValue::Unsupported { class }
    };

    Ok((name, value))
}

fn parse_struct(r: &mut ByteReader<'_>, dims: Vec<usize>, endian: Endian) -> Result<MatStruct> {
    let (len_type, len_bytes) = r.element()?;
    if len_type != MI_INT32 || len_bytes.len() < 4 {
        return Err(Error::MatFormat("missing struct field name length".to_string()));
    }
    let name_len = decode_u32s(len_bytes, endian)[0] as usize;
    if name_len == 0 {
        return Err(Error::MatFormat("zero struct field name length".to_string()));
    }

    let (_, names) = r.element()?;
    let field_names: Vec<String> = names
        .chunks(name_len)
        .map(|chunk| {
            let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
            String::from_utf8_lossy(&chunk[..end]).into_owned()
        })
        .collect();

    let slots = element_count(&dims)?
        .checked_mul(field_names.len())
        .ok_or_else(|| Error::MatFormat(format!("struct {dims:?} has too many field slots")))?;
    // Every slot is at least one 8-byte tag
    if slots > r.remaining() / 8 {
        return Err(Error::MatFormat(format!(
            "struct {dims:?} claims {slots} field values, payload holds at most {}",
            r.remaining() / 8
        )));
    }
    let mut values = Vec::with_capacity(slots);
    for _ in 0..slots {
        let (field_type, field_payload) = r.element()?;
        if field_type != MI_MATRIX {
            return Err(Error::MatFormat(format!(
                "struct field element has type {field_type}, expected miMATRIX"
            )));
        }
        let (_, value) = parse_matrix(field_payload, endian)?;
        values.push(value);
    }

    MatStruct::from_parts(dims, field_names, values)
}

fn decode_u32s(bytes: &[u8], endian: Endian) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| {
            let raw = [c[0], c[1], c[2], c[3]];
            match endian {
                Endian::Little => u32::from_le_bytes(raw),
                Endian::Big => u32::from_be_bytes(raw),
            }
        })
        .collect()
}

macro_rules! decode_as {
    ($bytes:expr, $endian:expr, $ty:ty, $n:expr) => {
        $bytes
            .chunks_exact($n)
            .map(|c| {
                let mut raw = [0u8; $n];
                raw.copy_from_slice(c);
                let v = match $endian {
                    Endian::Little => <$ty>::from_le_bytes(raw),
                    Endian::Big => <$ty>::from_be_bytes(raw),
                };
                #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
                let widened = v as f64;
                widened
            })
            .collect::<Vec<f64>>()
    };
}

/// Decode a numeric payload of any storage type to `f64`.
///
/// MATLAB routinely stores double arrays in narrower integer types, so the
/// storage type is independent of the array class.
fn decode_numeric(data_type: u32, bytes: &[u8], endian: Endian) -> Result<Vec<f64>> {
    let values = match data_type {
        #[allow(clippy::cast_possible_wrap)]
        MI_INT8 => bytes.iter().map(|&b| f64::from(b as i8)).collect(),
        MI_UINT8 => bytes.iter().map(|&b| f64::from(b)).collect(),
        MI_INT16 => decode_as!(bytes, endian, i16, 2),
        MI_UINT16 => decode_as!(bytes, endian, u16, 2),
        MI_INT32 => decode_as!(bytes, endian, i32, 4),
        MI_UINT32 => decode_as!(bytes, endian, u32, 4),
        MI_SINGLE => decode_as!(bytes, endian, f32, 4),
        MI_DOUBLE => decode_as!(bytes, endian, f64, 8),
        MI_INT64 => decode_as!(bytes, endian, i64, 8),
        MI_UINT64 => decode_as!(bytes, endian, u64, 8),
        other => {
            return Err(Error::MatFormat(format!(
                "unsupported numeric storage type {other}"
            )))
        }
    };
    Ok(values)
}

fn decode_chars(data_type: u32, bytes: &[u8], dims: &[usize], endian: Endian) -> Result<String> {
    let units: Vec<u16> = match data_type {
        MI_UINT16 | MI_UTF16 => bytes
            .chunks_exact(2)
            .map(|c| match endian {
                Endian::Little => u16::from_le_bytes([c[0], c[1]]),
                Endian::Big => u16::from_be_bytes([c[0], c[1]]),
            })
            .collect(),
        MI_UTF8 | MI_UINT8 | MI_INT8 => {
            return Ok(String::from_utf8_lossy(bytes).into_owned());
        }
        other => {
            return Err(Error::MatFormat(format!(
                "unsupported char storage type {other}"
            )))
        }
    };

    let rows = dims.first().copied().unwrap_or(1);
    if rows <= 1 {
        return Ok(String::from_utf16_lossy(&units));
    }
    // Multi-row char matrix: column-major, one line per row
    let cols = units.len() / rows;
    let lines: Vec<String> = (0..rows)
        .map(|row| {
            let line: Vec<u16> = (0..cols).map(|col| units[col * rows + row]).collect();
            String::from_utf16_lossy(&line)
        })
        .collect();
    Ok(lines.join("\n"))
}
