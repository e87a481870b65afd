// Bit-index header: which column positions are present and of which kind.
//
// Layout: [control byte][payload bytes...], never containing 0x00.
// Control byte: 0x20 sparse, 0xA0 dense, 0xE0 compressed (0x40 without 0x80 is invalid).
// Payload: a bit stream packed 7 bits per byte, high bit of every byte set.
// Trailing zero bits in the last payload byte are padding.

use super::field::FieldKind;
use crate::core::{Result, SiError};

const CONTROL_SPARSE: u8 = 0x20;
const CONTROL_DENSE: u8 = 0xA0;
const CONTROL_COMPRESSED: u8 = 0xE0;
const PAYLOAD_MARK: u8 = 0x80;
const BITS_PER_BYTE: usize = 7;

/// Physical representation of a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    /// Gaps between set positions, each followed by its type bits
    Sparse,
    /// One presence bit per position up to the last set one
    Dense,
    /// Alternating absent/present run lengths
    Compressed,
}

impl HeaderFormat {
    pub fn from_control(control: u8) -> Result<Self> {
        match control & 0xC0 {
            0x00 if control & CONTROL_SPARSE != 0 => Ok(Self::Sparse),
            0x80 => Ok(Self::Dense),
            0xC0 => Ok(Self::Compressed),
            _ => Err(SiError::CorruptEncoding(format!("unknown header control byte {control:#04x}"))),
        }
    }

    const fn control(self) -> u8 {
        match self {
            Self::Sparse => CONTROL_SPARSE,
            Self::Dense => CONTROL_DENSE,
            Self::Compressed => CONTROL_COMPRESSED,
        }
    }
}

#[derive(Default)]
struct BitWriter {
    bits: Vec<bool>,
}

impl BitWriter {
    fn push(&mut self, bit: bool) {
        self.bits.push(bit);
    }

    fn push_kind(&mut self, kind: FieldKind) {
        let tag = kind.tag();
        self.push(tag & 0b10 != 0);
        self.push(tag & 0b01 != 0);
    }

    /// Elias-gamma code of `value` (>= 1)
    fn push_gamma(&mut self, value: u64) {
        let width = 64 - value.leading_zeros() as usize;
        self.bits.extend(std::iter::repeat_n(false, width - 1));
        for shift in (0..width).rev() {
            self.push((value >> shift) & 1 == 1);
        }
    }

    fn finish(self, format: HeaderFormat) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.bits.len().div_ceil(BITS_PER_BYTE));
        out.push(format.control());
        for chunk in self.bits.chunks(BITS_PER_BYTE) {
            let mut byte = PAYLOAD_MARK;
            for (i, bit) in chunk.iter().enumerate() {
                if *bit {
                    byte |= 1 << (BITS_PER_BYTE - 1 - i);
                }
            }
            out.push(byte);
        }
        out
    }
}

struct BitReader<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(payload: &'a [u8]) -> Result<Self> {
        if let Some(byte) = payload.iter().find(|&&b| b & PAYLOAD_MARK == 0) {
            return Err(SiError::CorruptEncoding(format!("header payload byte {byte:#04x} lacks marker bit")));
        }
        Ok(Self { payload, pos: 0 })
    }

    fn read(&mut self) -> Option<bool> {
        let byte = self.payload.get(self.pos / BITS_PER_BYTE)?;
        let bit = (byte >> (BITS_PER_BYTE - 1 - self.pos % BITS_PER_BYTE)) & 1 == 1;
        self.pos += 1;
        Some(bit)
    }

    fn read_required(&mut self) -> Result<bool> {
        self.read()
            .ok_or_else(|| SiError::CorruptEncoding("header ends inside a code".into()))
    }

    fn read_kind(&mut self) -> Result<FieldKind> {
        let high = u8::from(self.read_required()?);
        let low = u8::from(self.read_required()?);
        Ok(FieldKind::from_tag((high << 1) | low))
    }

    /// `None` when the stream ends before a code starts (padding).
    fn read_gamma(&mut self) -> Result<Option<u64>> {
        let mut zeros = 0usize;
        loop {
            match self.read() {
                None => return Ok(None),
                Some(true) => break,
                Some(false) => zeros += 1,
            }
        }
        if zeros > 63 {
            return Err(SiError::CorruptEncoding("gamma code wider than 64 bits".into()));
        }
        let mut value = 1u64;
        for _ in 0..zeros {
            value = (value << 1) | u64::from(self.read_required()?);
        }
        Ok(Some(value))
    }
}

fn advance(position: usize, by: u64) -> Result<usize> {
    usize::try_from(by)
        .ok()
        .and_then(|by| position.checked_add(by))
        .ok_or_else(|| SiError::CorruptEncoding("header position overflow".into()))
}

/// Decoded header: present positions in ascending order with their kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitIndex {
    fields: Vec<(usize, FieldKind)>,
}

impl BitIndex {
    /// Builds an index from `(position, kind)` pairs; a repeated position keeps its last kind.
    pub fn from_fields<I: IntoIterator<Item = (usize, FieldKind)>>(fields: I) -> Self {
        let mut fields: Vec<_> = fields.into_iter().collect();
        fields.reverse();
        fields.sort_by_key(|(pos, _)| *pos);
        fields.dedup_by_key(|(pos, _)| *pos);
        Self { fields }
    }

    #[must_use]
    pub fn fields(&self) -> &[(usize, FieldKind)] {
        &self.fields
    }

    /// Index of `position` among the present fields.
    #[must_use]
    pub fn rank(&self, position: usize) -> Option<usize> {
        self.fields.binary_search_by_key(&position, |(pos, _)| *pos).ok()
    }

    #[must_use]
    pub fn is_set(&self, position: usize) -> bool {
        self.rank(position).is_some()
    }

    #[must_use]
    pub fn kind(&self, position: usize) -> Option<FieldKind> {
        self.rank(position).map(|rank| self.fields[rank].1)
    }

    /// Number of present positions strictly before `position`.
    #[must_use]
    pub fn cardinality(&self, position: usize) -> usize {
        self.fields.partition_point(|(pos, _)| *pos < position)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Smallest of the three encodings; ties go to sparse, then dense.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        [HeaderFormat::Sparse, HeaderFormat::Dense, HeaderFormat::Compressed]
            .into_iter()
            .map(|format| self.encode_as(format))
            .min_by_key(Vec::len)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn encode_as(&self, format: HeaderFormat) -> Vec<u8> {
        let mut writer = BitWriter::default();
        match format {
            HeaderFormat::Sparse => {
                let mut expected = 0usize;
                for &(pos, kind) in &self.fields {
                    writer.push_gamma((pos - expected) as u64 + 1);
                    writer.push_kind(kind);
                    expected = pos + 1;
                }
            }
            HeaderFormat::Dense => {
                let mut next = 0usize;
                for &(pos, kind) in &self.fields {
                    for _ in next..pos {
                        writer.push(false);
                    }
                    writer.push(true);
                    writer.push_kind(kind);
                    next = pos + 1;
                }
            }
            HeaderFormat::Compressed => {
                let mut next = 0usize;
                let mut i = 0;
                while i < self.fields.len() {
                    let start = self.fields[i].0;
                    let mut run = 1;
                    while i + run < self.fields.len() && self.fields[i + run].0 == start + run {
                        run += 1;
                    }
                    writer.push_gamma((start - next) as u64 + 1);
                    writer.push_gamma(run as u64 + 1);
                    for &(_, kind) in &self.fields[i..i + run] {
                        writer.push_kind(kind);
                    }
                    next = start + run;
                    i += run;
                }
            }
        }
        writer.finish(format)
    }

    /// Parses a header (without its trailing delimiter) in any of the three formats.
    pub fn decode(header: &[u8]) -> Result<Self> {
        let (&control, payload) = header
            .split_first()
            .ok_or_else(|| SiError::CorruptEncoding("empty entry header".into()))?;
        let format = HeaderFormat::from_control(control)?;
        let mut reader = BitReader::new(payload)?;
        let mut fields = Vec::new();

        match format {
            HeaderFormat::Sparse => {
                let mut expected = 0usize;
                while let Some(gap) = reader.read_gamma()? {
                    let pos = advance(expected, gap - 1)?;
                    fields.push((pos, reader.read_kind()?));
                    expected = advance(pos, 1)?;
                }
            }
            HeaderFormat::Dense => {
                let mut pos = 0usize;
                while let Some(present) = reader.read() {
                    if present {
                        fields.push((pos, reader.read_kind()?));
                    }
                    pos += 1;
                }
            }
            HeaderFormat::Compressed => {
                let mut pos = 0usize;
                while let Some(absent) = reader.read_gamma()? {
                    pos = advance(pos, absent - 1)?;
                    let Some(present) = reader.read_gamma()? else {
                        break;
                    };
                    for _ in 0..present - 1 {
                        fields.push((pos, reader.read_kind()?));
                        pos = advance(pos, 1)?;
                    }
                }
            }
        }
        Ok(Self { fields })
    }
}
