use std::collections::BTreeMap;

use super::bit_index::{BitIndex, HeaderFormat};
use super::field::{self, FieldKind};
use crate::core::Result;

/// Collects column values by position and writes them as one entry:
/// `[header][0x00][field][0x00][field]...`.
#[derive(Debug, Clone, Default)]
pub struct EntryEncoder {
    fields: BTreeMap<usize, (FieldKind, Vec<u8>)>,
}

impl EntryEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scalar(&mut self, position: usize, value: Option<i64>) -> &mut Self {
        self.fields
            .insert(position, (FieldKind::Scalar, field::encode_scalar(value)));
        self
    }

    pub fn set_float(&mut self, position: usize, value: Option<f32>) -> &mut Self {
        self.fields
            .insert(position, (FieldKind::Float, field::encode_float(value).to_vec()));
        self
    }

    pub fn set_double(&mut self, position: usize, value: Option<f64>) -> &mut Self {
        self.fields
            .insert(position, (FieldKind::Double, field::encode_double(value).to_vec()));
        self
    }

    /// Untyped bytes must already be free of zero bytes.
    pub fn set_untyped(&mut self, position: usize, value: Option<&[u8]>) -> Result<&mut Self> {
        let bytes = value.unwrap_or_default();
        field::check_untyped(bytes)?;
        self.fields
            .insert(position, (FieldKind::Untyped, bytes.to_vec()));
        Ok(self)
    }

    pub fn remove(&mut self, position: usize) -> bool {
        self.fields.remove(&position).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn index(&self) -> BitIndex {
        BitIndex::from_fields(self.fields.iter().map(|(pos, (kind, _))| (*pos, *kind)))
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.write(self.index().encode())
    }

    /// Same as [`encode`](Self::encode) with a forced header format.
    #[must_use]
    pub fn encode_with(&self, format: HeaderFormat) -> Vec<u8> {
        self.write(self.index().encode_as(format))
    }

    fn write(&self, header: Vec<u8>) -> Vec<u8> {
        let body: usize = self.fields.values().map(|(_, bytes)| bytes.len() + 1).sum();
        let mut out = header;
        out.reserve(body + 1);
        out.push(0);
        for (i, (_, bytes)) in self.fields.values().enumerate() {
            if i > 0 {
                out.push(0);
            }
            out.extend_from_slice(bytes);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SiError;

    #[test]
    fn test_layout_of_simple_entry() {
        let mut encoder = EntryEncoder::new();
        encoder.set_untyped(0, Some(b"ab")).unwrap();
        encoder.set_untyped(1, Some(b"c")).unwrap();
        let entry = encoder.encode();

        let header_len = entry.iter().position(|&b| b == 0).unwrap();
        assert_eq!(&entry[header_len..], b"\0ab\0c");
    }

    #[test]
    fn test_empty_entry_is_header_and_delimiter() {
        let entry = EntryEncoder::new().encode();
        assert_eq!(entry.last(), Some(&0));
        assert_eq!(entry.iter().filter(|&&b| b == 0).count(), 1);
    }

    #[test]
    fn test_embedded_delimiter_rejected() {
        let mut encoder = EntryEncoder::new();
        let err = encoder.set_untyped(3, Some(b"a\0b")).unwrap_err();
        assert!(matches!(err, SiError::EmbeddedDelimiter(1)));
        assert!(encoder.is_empty());
    }

    #[test]
    fn test_overwrite_and_remove() {
        let mut encoder = EntryEncoder::new();
        encoder.set_scalar(2, Some(5)).set_double(2, Some(1.5));
        assert_eq!(encoder.len(), 1);
        assert!(encoder.remove(2));
        assert!(!encoder.remove(2));
    }
}
