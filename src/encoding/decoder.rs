use std::collections::BTreeMap;

use super::bit_index::BitIndex;
use super::field::{FieldKind, field_extent};
use crate::core::{Result, SiError};

/// Receives the present columns of an entry in ascending position order.
pub trait EntryAccumulator {
    /// `field` is `None` for a null value.
    fn accept(&mut self, position: usize, kind: FieldKind, field: Option<&[u8]>) -> Result<()>;
}

impl EntryAccumulator for BTreeMap<usize, Option<Vec<u8>>> {
    fn accept(&mut self, position: usize, _kind: FieldKind, field: Option<&[u8]>) -> Result<()> {
        self.insert(position, field.map(<[u8]>::to_vec));
        Ok(())
    }
}

/// Forward-only position inside the fields of the currently bound entry.
///
/// Only valid for the entry that was bound when it was created.
#[derive(Debug, Clone, Default)]
pub struct FieldCursor {
    rank: usize,
    offset: usize,
    current: Option<(usize, usize)>,
}

/// Reusable reader over encoded entries.
///
/// Rebinding to an entry whose header is byte-identical to the previous
/// one reuses the parsed index.
#[derive(Debug, Default)]
pub struct EntryDecoder<'a> {
    entry: &'a [u8],
    header: Vec<u8>,
    index: BitIndex,
    data_start: usize,
    index_rebuilds: u64,
}

impl<'a> EntryDecoder<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds to `buffer[offset..offset + length]`.
    ///
    /// On error the decoder keeps its previous binding.
    pub fn bind(&mut self, buffer: &'a [u8], offset: usize, length: usize) -> Result<()> {
        let entry = offset
            .checked_add(length)
            .and_then(|end| buffer.get(offset..end))
            .ok_or_else(|| {
                SiError::CorruptEncoding(format!(
                    "range {offset}+{length} outside buffer of {} bytes",
                    buffer.len()
                ))
            })?;
        let header_len = entry
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| SiError::CorruptEncoding("entry header is not terminated".into()))?;
        let header = &entry[..header_len];

        if self.header.is_empty() || self.header != header {
            self.index = BitIndex::decode(header)?;
            self.header.clear();
            self.header.extend_from_slice(header);
            self.index_rebuilds += 1;
            tracing::trace!("Rebuilt entry index ({} fields)", self.index.len());
        }
        self.entry = entry;
        self.data_start = header_len + 1;
        Ok(())
    }

    /// Number of times a bind had to parse its header.
    #[must_use]
    pub const fn index_rebuilds(&self) -> u64 {
        self.index_rebuilds
    }

    #[must_use]
    pub const fn index(&self) -> &BitIndex {
        &self.index
    }

    fn data(&self) -> &'a [u8] {
        self.entry.get(self.data_start..).unwrap_or_default()
    }

    #[must_use]
    pub fn is_set(&self, position: usize) -> bool {
        self.index.is_set(position)
    }

    #[must_use]
    pub fn kind(&self, position: usize) -> Option<FieldKind> {
        self.index.kind(position)
    }

    /// Absent columns read as null.
    pub fn is_null(&self, position: usize) -> Result<bool> {
        match self.index.rank(position) {
            None => Ok(true),
            Some(rank) => Ok(self.locate(rank)?.2),
        }
    }

    /// Bytes of a present column, including the sentinel of a null float or double.
    pub fn raw_field(&self, position: usize) -> Result<&'a [u8]> {
        let rank = self
            .index
            .rank(position)
            .ok_or(SiError::FieldNotFound(position))?;
        let (start, end, _) = self.locate(rank)?;
        Ok(&self.data()[start..end])
    }

    fn locate(&self, rank: usize) -> Result<(usize, usize, bool)> {
        let data = self.data();
        let fields = self.index.fields();
        let mut start = 0;
        for &(_, kind) in &fields[..rank] {
            let (end, _) = field_extent(data, start, kind)?;
            start = end + 1;
        }
        let (end, is_null) = field_extent(data, start, fields[rank].1)?;
        Ok((start, end, is_null))
    }

    #[must_use]
    pub fn cursor(&self) -> FieldCursor {
        FieldCursor::default()
    }

    /// Moves `cursor` past the field at `position`, skipping any present
    /// fields in between, and reports whether it is null.
    ///
    /// Positions behind the cursor can no longer be reached and are reported
    /// as not found.
    pub fn seek_forward(&self, cursor: &mut FieldCursor, position: usize) -> Result<bool> {
        let rank = self
            .index
            .rank(position)
            .filter(|&rank| rank >= cursor.rank)
            .ok_or(SiError::FieldNotFound(position))?;
        let data = self.data();
        let fields = self.index.fields();

        while cursor.rank < rank {
            let (end, _) = field_extent(data, cursor.offset, fields[cursor.rank].1)?;
            cursor.offset = end + 1;
            cursor.rank += 1;
        }
        let (end, is_null) = field_extent(data, cursor.offset, fields[rank].1)?;
        cursor.current = Some((cursor.offset, end));
        cursor.offset = end + 1;
        cursor.rank += 1;
        Ok(is_null)
    }

    /// Bytes of the field the cursor last moved past.
    #[must_use]
    pub fn cursor_field(&self, cursor: &FieldCursor) -> Option<&'a [u8]> {
        let (start, end) = cursor.current?;
        self.data().get(start..end)
    }

    /// Streams every present column into `acc` in one pass.
    pub fn accumulate<A: EntryAccumulator + ?Sized>(&self, acc: &mut A) -> Result<()> {
        let mut cursor = self.cursor();
        for &(position, kind) in self.index.fields() {
            let is_null = self.seek_forward(&mut cursor, position)?;
            let field = if is_null { None } else { self.cursor_field(&cursor) };
            acc.accept(position, kind, field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::bit_index::HeaderFormat;
    use crate::encoding::encoder::EntryEncoder;
    use crate::encoding::field::{decode_double, decode_scalar};

    fn mixed_entry() -> Vec<u8> {
        let mut encoder = EntryEncoder::new();
        encoder
            .set_scalar(0, Some(256))
            .set_float(1, None)
            .set_double(3, Some(-0.5))
            .set_scalar(4, None);
        encoder.set_untyped(6, Some(b"tail")).unwrap();
        encoder.set_untyped(7, None).unwrap();
        encoder.encode()
    }

    #[test]
    fn test_three_column_row() {
        let mut encoder = EntryEncoder::new();
        encoder.set_scalar(0, Some(42));
        encoder.set_untyped(2, Some(b"ok")).unwrap();
        let entry = encoder.encode();

        let mut decoder = EntryDecoder::new();
        decoder.bind(&entry, 0, entry.len()).unwrap();

        assert!(!decoder.is_set(1));
        assert!(decoder.is_null(1).unwrap());
        assert!(matches!(decoder.raw_field(1), Err(SiError::FieldNotFound(1))));

        assert!(decoder.is_set(0));
        assert_eq!(decode_scalar(decoder.raw_field(0).unwrap()).unwrap(), Some(42));
        assert_eq!(decoder.raw_field(2).unwrap(), b"ok");
    }

    #[test]
    fn test_nulls_by_kind() {
        let entry = mixed_entry();
        let mut decoder = EntryDecoder::new();
        decoder.bind(&entry, 0, entry.len()).unwrap();

        assert!(!decoder.is_null(0).unwrap());
        assert!(decoder.is_null(1).unwrap());
        assert_eq!(decoder.raw_field(1).unwrap(), &[0, 0, 0, 0]);
        assert!(decoder.is_null(2).unwrap());
        assert_eq!(decode_double(decoder.raw_field(3).unwrap()).unwrap(), Some(-0.5));
        assert!(decoder.is_null(4).unwrap());
        assert_eq!(decoder.raw_field(6).unwrap(), b"tail");
        assert!(decoder.is_null(7).unwrap());
        assert!(decoder.raw_field(7).unwrap().is_empty());
    }

    #[test]
    fn test_seek_forward_matches_raw_field() {
        let entry = mixed_entry();
        let mut decoder = EntryDecoder::new();
        decoder.bind(&entry, 0, entry.len()).unwrap();

        let mut cursor = decoder.cursor();
        for &(position, _) in decoder.index().fields() {
            let is_null = decoder.seek_forward(&mut cursor, position).unwrap();
            assert_eq!(is_null, decoder.is_null(position).unwrap());
            assert_eq!(decoder.cursor_field(&cursor).unwrap(), decoder.raw_field(position).unwrap());
        }
    }

    #[test]
    fn test_seek_forward_skips_and_never_goes_back() {
        let entry = mixed_entry();
        let mut decoder = EntryDecoder::new();
        decoder.bind(&entry, 0, entry.len()).unwrap();

        let mut cursor = decoder.cursor();
        assert!(!decoder.seek_forward(&mut cursor, 6).unwrap());
        assert_eq!(decoder.cursor_field(&cursor).unwrap(), b"tail");
        assert!(matches!(
            decoder.seek_forward(&mut cursor, 3),
            Err(SiError::FieldNotFound(3))
        ));
        assert!(matches!(
            decoder.seek_forward(&mut cursor, 5),
            Err(SiError::FieldNotFound(5))
        ));
    }

    #[test]
    fn test_accumulate_collects_present_columns() {
        let entry = mixed_entry();
        let mut decoder = EntryDecoder::new();
        decoder.bind(&entry, 0, entry.len()).unwrap();

        let mut row: BTreeMap<usize, Option<Vec<u8>>> = BTreeMap::new();
        decoder.accumulate(&mut row).unwrap();
        assert_eq!(row.keys().copied().collect::<Vec<_>>(), vec![0, 1, 3, 4, 6, 7]);
        assert_eq!(row[&1], None);
        assert_eq!(row[&6].as_deref(), Some(&b"tail"[..]));
    }

    #[test]
    fn test_rebind_same_header_skips_parsing() {
        let mut first = EntryEncoder::new();
        first.set_scalar(0, Some(1));
        first.set_untyped(1, Some(b"a")).unwrap();
        let mut second = EntryEncoder::new();
        second.set_scalar(0, Some(2));
        second.set_untyped(1, Some(b"bb")).unwrap();
        let mut other = EntryEncoder::new();
        other.set_untyped(5, Some(b"z")).unwrap();

        // both entries back to back in one buffer
        let a = first.encode();
        let b = second.encode();
        let mut buffer = a.clone();
        buffer.extend_from_slice(&b);
        let c = other.encode();

        let mut decoder = EntryDecoder::new();
        decoder.bind(&buffer, 0, a.len()).unwrap();
        assert_eq!(decoder.index_rebuilds(), 1);
        assert_eq!(decoder.raw_field(1).unwrap(), b"a");

        decoder.bind(&buffer, a.len(), b.len()).unwrap();
        assert_eq!(decoder.index_rebuilds(), 1);
        assert_eq!(decoder.raw_field(1).unwrap(), b"bb");

        let mut decoder_c = EntryDecoder::new();
        decoder_c.bind(&buffer, 0, a.len()).unwrap();
        decoder_c.bind(&c, 0, c.len()).unwrap();
        assert_eq!(decoder_c.index_rebuilds(), 2);
        assert!(!decoder_c.is_set(1));
        assert_eq!(decoder_c.raw_field(5).unwrap(), b"z");
    }

    #[test]
    fn test_every_header_format_decodes() {
        let mut encoder = EntryEncoder::new();
        encoder.set_scalar(2, Some(-9)).set_float(3, Some(2.0));
        encoder.set_untyped(11, Some(b"x")).unwrap();

        for format in [HeaderFormat::Sparse, HeaderFormat::Dense, HeaderFormat::Compressed] {
            let entry = encoder.encode_with(format);
            let mut decoder = EntryDecoder::new();
            decoder.bind(&entry, 0, entry.len()).unwrap();
            assert_eq!(decode_scalar(decoder.raw_field(2).unwrap()).unwrap(), Some(-9));
            assert_eq!(decoder.raw_field(11).unwrap(), b"x");
            assert!(!decoder.is_set(10));
        }
    }

    #[test]
    fn test_corrupt_input_rejected() {
        let mut decoder = EntryDecoder::new();
        assert!(matches!(decoder.bind(&[0x40, 0x80, 0x00], 0, 3), Err(SiError::CorruptEncoding(_))));
        assert!(matches!(decoder.bind(&[0x20, 0x81], 0, 2), Err(SiError::CorruptEncoding(_))));
        assert!(matches!(decoder.bind(&[0x20], 0, 4), Err(SiError::CorruptEncoding(_))));

        // header promises a float, data holds two bytes
        let mut encoder = EntryEncoder::new();
        encoder.set_float(0, Some(1.0));
        let mut entry = encoder.encode();
        entry.truncate(entry.len() - 2);
        decoder.bind(&entry, 0, entry.len()).unwrap();
        assert!(matches!(decoder.raw_field(0), Err(SiError::CorruptEncoding(_))));
    }
}
