//! Variable-length values: header classification, decompression and
//! reassembly of out-of-line values

pub mod decode;
pub mod pglz;
pub mod toast;

pub use decode::{decode_varlena, ExternalPointer, Varlena, VarlenaError};
pub use pglz::{decompress, DecompressError, DecompressFault};
pub use toast::{ChunkLocation, ChunkRow, ExternalStore, ExternalValueIndex, Resolved};
