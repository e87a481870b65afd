// Field encodings used inside an entry.
//
// Untyped fields are opaque bytes with no embedded zero; null is a zero-length field.
// Scalar fields: [len 1..=8][big-endian zigzag value]; null is a zero-length field.
// Float/double fields: fixed 4/8 order-preserving bytes; null is the all-zero sentinel.

use crate::core::{Result, SiError};

const FLOAT_NULL: [u8; 4] = [0; 4];
const DOUBLE_NULL: [u8; 8] = [0; 8];
const CANONICAL_NAN_32: u32 = 0x7FC0_0000;
const CANONICAL_NAN_64: u64 = 0x7FF8_0000_0000_0000;

/// Column type as recorded in the entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Untyped,
    Scalar,
    Float,
    Double,
}

impl FieldKind {
    pub(crate) const fn tag(self) -> u8 {
        match self {
            Self::Untyped => 0b00,
            Self::Scalar => 0b01,
            Self::Float => 0b10,
            Self::Double => 0b11,
        }
    }

    pub(crate) const fn from_tag(tag: u8) -> Self {
        match tag & 0b11 {
            0b00 => Self::Untyped,
            0b01 => Self::Scalar,
            0b10 => Self::Float,
            _ => Self::Double,
        }
    }

    /// Width of the field in bytes when it does not depend on the value
    #[must_use]
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Float => Some(4),
            Self::Double => Some(8),
            Self::Untyped | Self::Scalar => None,
        }
    }
}

pub fn encode_scalar(value: Option<i64>) -> Vec<u8> {
    let Some(value) = value else {
        return Vec::new();
    };
    let zigzag = ((value << 1) ^ (value >> 63)) as u64;
    let significant = (64 - zigzag.leading_zeros() as usize).div_ceil(8).max(1);
    let mut out = Vec::with_capacity(significant + 1);
    out.push(significant as u8);
    out.extend_from_slice(&zigzag.to_be_bytes()[8 - significant..]);
    out
}

pub fn decode_scalar(field: &[u8]) -> Result<Option<i64>> {
    let Some((&len, bytes)) = field.split_first() else {
        return Ok(None);
    };
    let len = usize::from(len);
    if len == 0 || len > 8 || bytes.len() != len {
        return Err(SiError::CorruptEncoding(format!(
            "scalar field of {} bytes declares length {len}",
            field.len()
        )));
    }
    let zigzag = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    Ok(Some(((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64)))
}

pub fn encode_float(value: Option<f32>) -> [u8; 4] {
    let Some(value) = value else {
        return FLOAT_NULL;
    };
    let bits = if value.is_nan() { CANONICAL_NAN_32 } else { value.to_bits() };
    let ordered = if bits & 0x8000_0000 == 0 { bits | 0x8000_0000 } else { !bits };
    ordered.to_be_bytes()
}

pub fn decode_float(field: &[u8]) -> Result<Option<f32>> {
    let bytes: [u8; 4] = field.try_into().map_err(|_| {
        SiError::CorruptEncoding(format!("float field has {} bytes", field.len()))
    })?;
    if bytes == FLOAT_NULL {
        return Ok(None);
    }
    let ordered = u32::from_be_bytes(bytes);
    let bits = if ordered & 0x8000_0000 != 0 { ordered & 0x7FFF_FFFF } else { !ordered };
    Ok(Some(f32::from_bits(bits)))
}

pub fn encode_double(value: Option<f64>) -> [u8; 8] {
    let Some(value) = value else {
        return DOUBLE_NULL;
    };
    let bits = if value.is_nan() { CANONICAL_NAN_64 } else { value.to_bits() };
    let sign = 1u64 << 63;
    let ordered = if bits & sign == 0 { bits | sign } else { !bits };
    ordered.to_be_bytes()
}

pub fn decode_double(field: &[u8]) -> Result<Option<f64>> {
    let bytes: [u8; 8] = field.try_into().map_err(|_| {
        SiError::CorruptEncoding(format!("double field has {} bytes", field.len()))
    })?;
    if bytes == DOUBLE_NULL {
        return Ok(None);
    }
    let sign = 1u64 << 63;
    let ordered = u64::from_be_bytes(bytes);
    let bits = if ordered & sign != 0 { ordered & !sign } else { !ordered };
    Ok(Some(f64::from_bits(bits)))
}

/// Rejects untyped bytes that would be read back as a delimiter.
pub fn check_untyped(field: &[u8]) -> Result<()> {
    match field.iter().position(|&b| b == 0) {
        Some(pos) => Err(SiError::EmbeddedDelimiter(pos)),
        None => Ok(()),
    }
}

/// Finds where the field starting at `start` ends.
///
/// Returns the exclusive end and whether the field is null. The byte after
/// the field must be a delimiter or the end of `data`.
pub(crate) fn field_extent(data: &[u8], start: usize, kind: FieldKind) -> Result<(usize, bool)> {
    if start > data.len() {
        return Err(SiError::CorruptEncoding(format!(
            "field expected at offset {start} past end of entry ({} bytes)",
            data.len()
        )));
    }

    let (end, is_null) = match kind {
        FieldKind::Untyped => {
            let end = data[start..]
                .iter()
                .position(|&b| b == 0)
                .map_or(data.len(), |len| start + len);
            (end, end == start)
        }
        FieldKind::Scalar => match data.get(start) {
            None | Some(0) => (start, true),
            Some(&len) if len <= 8 => (start + 1 + usize::from(len), false),
            Some(&len) => {
                return Err(SiError::CorruptEncoding(format!(
                    "scalar length byte {len} at offset {start}"
                )));
            }
        },
        FieldKind::Float | FieldKind::Double => {
            let width = kind.fixed_width().unwrap_or_default();
            let end = start + width;
            let bytes = data.get(start..end).ok_or_else(|| {
                SiError::CorruptEncoding(format!("truncated {kind:?} field at offset {start}"))
            })?;
            (end, bytes.iter().all(|&b| b == 0))
        }
    };

    if end > data.len() {
        return Err(SiError::CorruptEncoding(format!("truncated {kind:?} field at offset {start}")));
    }
    if end < data.len() && data[end] != 0 {
        return Err(SiError::CorruptEncoding(format!("missing delimiter after field at offset {start}")));
    }
    Ok((end, is_null))
}
