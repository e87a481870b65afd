// Entry codec - bit-index header plus zero-delimited typed fields

pub mod bit_index;
mod decoder;
mod encoder;
pub mod field;

pub use bit_index::{BitIndex, HeaderFormat};
pub use decoder::{EntryAccumulator, EntryDecoder, FieldCursor};
pub use encoder::EntryEncoder;
pub use field::FieldKind;
