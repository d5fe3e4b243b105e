//! Decompressor for the legacy byte-oriented LZ scheme
//!
//! Input is a 4-byte raw-length prefix followed by groups of one control byte
//! and up to eight items. Control bits are consumed LSB first: a clear bit is
//! one literal byte, a set bit a two-byte back-reference tag
//!
//! ```text
//! tag0: oooo llll    offset = (tag0 >> 4) * 256 + tag1
//! tag1: oooo oooo    length = (tag0 & 0x0F) + 3, plus one extra byte when 18
//! ```
//!
//! copying `length` bytes starting `offset` bytes back from the output end.
//! The copy may overlap the bytes it produces.

use thiserror::Error;

/// Size of the raw-length prefix
pub const RAW_LENGTH_PREFIX: usize = 4;

/// Upper bound on the preallocated output size
const MAX_PREALLOC: usize = 1 << 20;

/// Why decompression stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressFault {
    /// Input shorter than the raw-length prefix
    MissingPrefix,
    /// A back-reference tag was cut off by the end of input
    TruncatedTag,
    /// A back-reference points before the start of the output
    InvalidOffset {
        /// Offset requested
        offset: usize,
        /// Output length at that point
        available: usize,
    },
}

/// Decompression stopped before the end of input
///
/// The output produced up to the fault is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decompression stopped after {} bytes: {fault:?}", partial.len())]
pub struct DecompressError {
    /// What went wrong
    pub fault: DecompressFault,
    /// Output produced before the fault
    pub partial: Vec<u8>,
}

/// Raw length announced by the prefix, if present
pub fn raw_length(input: &[u8]) -> Option<usize> {
    let prefix = input.get(..RAW_LENGTH_PREFIX)?;
    Some(u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize)
}

/// Decompress a prefixed stream
///
/// # Errors
///
/// Returns a [`DecompressError`] carrying the partial output when the stream
/// is malformed. Never reads outside `input` or the output buffer.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>, DecompressError> {
    let Some(raw_len) = raw_length(input) else {
        return Err(DecompressError {
            fault: DecompressFault::MissingPrefix,
            partial: Vec::new(),
        });
    };

    let mut out = Vec::with_capacity(raw_len.min(MAX_PREALLOC));
    let fail = |fault: DecompressFault, out: Vec<u8>| -> Result<Vec<u8>, DecompressError> {
        Err(DecompressError { fault, partial: out })
    };
    let mut pos = RAW_LENGTH_PREFIX;

    while pos < input.len() {
        let control = input[pos];
        pos += 1;

        for bit in 0..8 {
            if pos >= input.len() {
                break;
            }
            if control & (1 << bit) == 0 {
                out.push(input[pos]);
                pos += 1;
                continue;
            }

            let (Some(&tag0), Some(&tag1)) = (input.get(pos), input.get(pos + 1)) else {
                return fail(DecompressFault::TruncatedTag, out);
            };
            pos += 2;

            let offset = usize::from(tag0 >> 4) * 256 + usize::from(tag1);
            let mut length = usize::from(tag0 & 0x0F) + 3;
            if length == 18 {
                let Some(&extra) = input.get(pos) else {
                    return fail(DecompressFault::TruncatedTag, out);
                };
                pos += 1;
                length += usize::from(extra);
            }

            if offset == 0 || offset > out.len() {
                let available = out.len();
                return fail(DecompressFault::InvalidOffset { offset, available }, out);
            }

            // Byte by byte: the source window may run into bytes written by
            // this same copy.
            let start = out.len() - offset;
            for i in 0..length {
                let byte = out[start + i];
                out.push(byte);
            }
        }
    }

    Ok(out)
}
