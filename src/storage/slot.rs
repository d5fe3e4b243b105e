//! Slot directory entries

use crate::storage::page_constants::{
    SLOT_LENGTH_SHIFT, SLOT_OFFSET_MASK, SLOT_STATUS_MASK, SLOT_STATUS_SHIFT,
};

/// The 2-bit status of a slot directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotStatus {
    /// Never used or reclaimed
    Unused = 0,
    /// Points at a tuple
    Normal = 1,
    /// Redirects to another slot
    Redirect = 2,
    /// Dead tuple that still has storage
    Dead = 3,
}

impl From<u8> for SlotStatus {
    fn from(value: u8) -> Self {
        match value & 0x3 {
            0 => SlotStatus::Unused,
            1 => SlotStatus::Normal,
            2 => SlotStatus::Redirect,
            _ => SlotStatus::Dead,
        }
    }
}

impl SlotStatus {
    /// Whether the slot references tuple bytes that should be decoded
    ///
    /// Decided by the low status bit alone.
    pub fn is_used(self) -> bool {
        (self as u8) & 1 == 1
    }
}

/// One decoded slot directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleSlot {
    /// 1-based position in the slot directory
    pub index: u16,
    /// Byte offset of the tuple within the page
    pub offset: usize,
    /// Tuple length in bytes
    pub length: usize,
    /// Raw status bits
    pub status: SlotStatus,
}

impl TupleSlot {
    /// Unpack a slot directory word
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_word(index: u16, word: u32) -> Self {
        Self {
            index,
            offset: (word & SLOT_OFFSET_MASK) as usize,
            length: (word >> SLOT_LENGTH_SHIFT) as usize,
            status: SlotStatus::from(((word >> SLOT_STATUS_SHIFT) & SLOT_STATUS_MASK) as u8),
        }
    }

    /// Pack this slot back into a directory word
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_word(&self) -> u32 {
        (self.offset as u32 & SLOT_OFFSET_MASK)
            | (u32::from(self.status as u8) << SLOT_STATUS_SHIFT)
            | ((self.length as u32) << SLOT_LENGTH_SHIFT)
    }

    /// Whether the slot references tuple bytes
    pub fn is_used(&self) -> bool {
        self.status.is_used()
    }
}
