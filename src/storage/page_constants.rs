//! Page and slot directory constants

/// Default block size in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Smallest block size a relation can be configured with
pub const MIN_BLOCK_SIZE: usize = 1024;

/// Largest block size a relation can be configured with
pub const MAX_BLOCK_SIZE: usize = 32768;

/// Size of one slot directory word
pub const SLOT_WORD_SIZE: usize = 4;

/// Bits of a slot word holding the tuple offset
pub const SLOT_OFFSET_MASK: u32 = 0x7FFF;

/// Shift of the 2-bit status field
pub const SLOT_STATUS_SHIFT: u32 = 15;

/// Mask of the status field after shifting
pub const SLOT_STATUS_MASK: u32 = 0x3;

/// Shift of the tuple length field
pub const SLOT_LENGTH_SHIFT: u32 = 17;

/// Required alignment of the `lower` boundary
pub const LOWER_ALIGNMENT: usize = 4;

/// Block number type
pub type BlockNumber = u32;
