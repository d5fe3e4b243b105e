//! Variable-length value header classification
//!
//! The first byte of a varlena selects its encoding:
//!
//! ```text
//! 0x01          external reference, 16-byte record
//! odd, != 0x01  1-byte header, total length = (b0 >> 1) & 0x7F
//! even          4-byte header, total length = (le_u32 >> 2) & 0x3FFFFFFF,
//!               compressed when b0 & 0x03 == 0x02
//! ```
//!
//! Total lengths include the header itself.

use thiserror::Error;

/// Marker byte of an external reference
pub const EXTERNAL_MARKER: u8 = 0x01;

/// Wire length of an external reference record
pub const EXTERNAL_POINTER_LEN: usize = 16;

/// Size of the 4-byte varlena header
pub const LONG_HEADER_LEN: usize = 4;

/// Reference to a value stored out of line in chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalPointer {
    /// Pointer type tag
    pub tag: u8,
    /// Size of the original value, header included
    pub raw_size: i32,
    /// Bytes stored in the chunk relation
    pub physical_size: i32,
    /// Identifier shared by every chunk of the value
    pub owner_id: u32,
}

impl ExternalPointer {
    /// Whether the reassembled chunks hold compressed data
    pub fn is_compressed(&self) -> bool {
        i64::from(self.physical_size) < i64::from(self.raw_size) - LONG_HEADER_LEN as i64
    }
}

/// A classified variable-length value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Varlena<'a> {
    /// Inline value with a 1-byte header
    Short {
        /// Value bytes
        payload: &'a [u8],
    },
    /// Inline uncompressed value with a 4-byte header
    Long {
        /// Value bytes
        payload: &'a [u8],
    },
    /// Inline compressed value with a 4-byte header
    Compressed {
        /// Raw-length prefix followed by the compressed stream
        payload: &'a [u8],
    },
    /// Out-of-line value
    External(ExternalPointer),
}

impl Varlena<'_> {
    /// Bytes the value occupies in the tuple
    pub fn wire_len(&self) -> usize {
        match self {
            Varlena::Short { payload } => payload.len() + 1,
            Varlena::Long { payload } | Varlena::Compressed { payload } => {
                payload.len() + LONG_HEADER_LEN
            }
            Varlena::External(_) => EXTERNAL_POINTER_LEN,
        }
    }

    /// Whether the first byte carries a 1-byte header (no alignment before it)
    pub fn is_unaligned_header(first: u8) -> bool {
        first & 0x01 == 0x01
    }
}

/// Malformed varlena header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VarlenaError {
    /// No bytes left for the header
    #[error("no bytes left for a varlena header")]
    Empty,
    /// The header declares a length shorter than itself
    #[error("varlena length {declared} is shorter than its {header}-byte header")]
    TooShort {
        /// Declared total length
        declared: usize,
        /// Header size
        header: usize,
    },
    /// The value runs past the end of the tuple
    #[error("varlena of {declared} bytes overruns the {available} bytes left")]
    Overrun {
        /// Declared total length
        declared: usize,
        /// Bytes available
        available: usize,
    },
}

fn le_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Classify the varlena at the start of `bytes` and slice out its payload
///
/// # Errors
///
/// Returns a [`VarlenaError`] when the header is unreadable or the declared
/// length does not fit.
#[allow(clippy::cast_sign_loss)]
pub fn decode_varlena(bytes: &[u8]) -> Result<Varlena<'_>, VarlenaError> {
    let &first = bytes.first().ok_or(VarlenaError::Empty)?;

    if first == EXTERNAL_MARKER {
        if bytes.len() < EXTERNAL_POINTER_LEN {
            return Err(VarlenaError::Overrun {
                declared: EXTERNAL_POINTER_LEN,
                available: bytes.len(),
            });
        }
        return Ok(Varlena::External(ExternalPointer {
            tag: bytes[1],
            raw_size: le_i32(bytes, 4),
            physical_size: le_i32(bytes, 8),
            owner_id: le_i32(bytes, 12) as u32,
        }));
    }

    if first & 0x01 == 0x01 {
        let total = usize::from((first >> 1) & 0x7F);
        let payload = bytes.get(1..total).ok_or(VarlenaError::Overrun {
            declared: total,
            available: bytes.len(),
        })?;
        return Ok(Varlena::Short { payload });
    }

    let Some(header) = bytes.get(..LONG_HEADER_LEN) else {
        return Err(VarlenaError::Overrun {
            declared: LONG_HEADER_LEN,
            available: bytes.len(),
        });
    };
    let word = u32::from_le(bytemuck::pod_read_unaligned::<u32>(header));
    let total = ((word >> 2) & 0x3FFF_FFFF) as usize;
    if total < LONG_HEADER_LEN {
        return Err(VarlenaError::TooShort {
            declared: total,
            header: LONG_HEADER_LEN,
        });
    }
    let payload = bytes
        .get(LONG_HEADER_LEN..total)
        .ok_or(VarlenaError::Overrun {
            declared: total,
            available: bytes.len(),
        })?;

    if first & 0x03 == 0x02 {
        Ok(Varlena::Compressed { payload })
    } else {
        Ok(Varlena::Long { payload })
    }
}
