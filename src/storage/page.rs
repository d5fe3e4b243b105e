//! Page scanner: header validation and slot directory enumeration

use crate::format::record::{decode, StructuralMismatch};
use crate::format::revision::RevisionLayouts;
use crate::storage::page_constants::SLOT_WORD_SIZE;
use crate::storage::page_header::{HeaderViolation, PageHeader};
use crate::storage::slot::TupleSlot;
use std::fmt;
use thiserror::Error;

/// Why a whole page was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PageError {
    /// The buffer does not even hold a full header
    #[error("page header: {0}")]
    Structural(StructuralMismatch),
    /// The header fails a sanity check
    #[error("page header invariant violated: {0}")]
    Invariant(HeaderViolation),
    /// The page was allocated but never initialized
    #[error("page is uninitialized")]
    Uninitialized,
}

/// A used slot whose offset falls outside the tuple area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotViolation {
    /// The offending slot
    pub slot: TupleSlot,
    /// Lowest valid offset (`upper`)
    pub upper: usize,
    /// One past the highest valid offset (`special`)
    pub special: usize,
}

impl fmt::Display for SlotViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slot {} offset {} outside tuple area [{}, {})",
            self.slot.index, self.slot.offset, self.upper, self.special
        )
    }
}

/// A validated page and its used slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedPage {
    /// Decoded page header
    pub header: PageHeader,
    /// Used slots within bounds, in directory order
    pub slots: Vec<TupleSlot>,
    /// Used slots rejected by the offset bound check
    pub rejected: Vec<SlotViolation>,
}

impl ScannedPage {
    /// Bytes of one tuple, if the slot's extent fits the buffer
    pub fn tuple_bytes<'a>(buffer: &'a [u8], slot: &TupleSlot) -> Option<&'a [u8]> {
        buffer.get(slot.offset..slot.offset.checked_add(slot.length)?)
    }
}

fn slot_word(buffer: &[u8], at: usize) -> Option<u32> {
    let bytes = buffer.get(at..at + SLOT_WORD_SIZE)?;
    Some(u32::from_le(bytemuck::pod_read_unaligned::<u32>(bytes)))
}

/// Validate one block and enumerate its used tuple slots
///
/// # Errors
///
/// Returns a [`PageError`] when the page has to be skipped as a whole. Slots
/// failing the offset check do not fail the page; they are listed in
/// [`ScannedPage::rejected`].
#[allow(clippy::cast_possible_truncation)]
pub fn scan_page(
    buffer: &[u8],
    layouts: &RevisionLayouts,
    block_size: usize,
) -> Result<ScannedPage, PageError> {
    let record = decode(layouts.page_header, buffer);
    if let Some(mismatch) = record.error() {
        return Err(PageError::Structural(mismatch));
    }

    let header = PageHeader::from_record(&record);
    if header.is_new() {
        return Err(PageError::Uninitialized);
    }
    header
        .validate(layouts, block_size)
        .map_err(PageError::Invariant)?;

    let mut slots = Vec::new();
    let mut rejected = Vec::new();

    for i in 0..header.slot_count() {
        let at = header.header_size + SLOT_WORD_SIZE * i;
        // lower <= upper <= buffer is not guaranteed for a truncated block
        let Some(word) = slot_word(buffer, at) else {
            break;
        };
        let slot = TupleSlot::from_word((i + 1) as u16, word);
        if !slot.is_used() {
            continue;
        }
        if slot.offset < header.upper || slot.offset >= header.special {
            rejected.push(SlotViolation {
                slot,
                upper: header.upper,
                special: header.special,
            });
            continue;
        }
        slots.push(slot);
    }

    Ok(ScannedPage {
        header,
        slots,
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_utils::PageBuilder;
    use crate::format::revision::FormatRevision;
    use crate::storage::slot::SlotStatus;

    #[test]
    fn test_scan_built_page() {
        let layouts = FormatRevision::V80.layouts();
        let page = PageBuilder::new(layouts, 8192)
            .tuple(&[1u8; 40])
            .tuple(&[2u8; 32])
            .build();

        let scanned = scan_page(&page, layouts, 8192).unwrap();
        assert_eq!(scanned.slots.len(), 2);
        assert!(scanned.rejected.is_empty());
        assert_eq!(scanned.slots[0].index, 1);
        assert_eq!(scanned.slots[0].length, 40);
        assert_eq!(
            ScannedPage::tuple_bytes(&page, &scanned.slots[1]),
            Some(&[2u8; 32][..])
        );
    }

    #[test]
    fn test_unused_slots_skipped() {
        let layouts = FormatRevision::V80.layouts();
        let page = PageBuilder::new(layouts, 8192)
            .tuple(&[1u8; 24])
            .slot_with_status(&[3u8; 24], SlotStatus::Redirect)
            .tuple(&[4u8; 24])
            .build();

        let scanned = scan_page(&page, layouts, 8192).unwrap();
        let indexes: Vec<u16> = scanned.slots.iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![1, 3]);
    }

    #[test]
    fn test_slot_outside_tuple_area_rejected() {
        let layouts = FormatRevision::V80.layouts();
        let page = PageBuilder::new(layouts, 8192)
            .tuple(&[1u8; 24])
            .raw_slot(TupleSlot {
                index: 0,
                offset: 30,
                length: 10,
                status: SlotStatus::Normal,
            })
            .build();

        let scanned = scan_page(&page, layouts, 8192).unwrap();
        assert_eq!(scanned.slots.len(), 1);
        assert_eq!(scanned.rejected.len(), 1);
        assert_eq!(scanned.rejected[0].slot.index, 2);
    }

    #[test]
    fn test_uninitialized_page() {
        let layouts = FormatRevision::V80.layouts();
        let page = vec![0u8; 8192];
        assert_eq!(
            scan_page(&page, layouts, 8192),
            Err(PageError::Uninitialized)
        );
    }

    #[test]
    fn test_short_buffer_is_structural() {
        let layouts = FormatRevision::V80.layouts();
        assert!(matches!(
            scan_page(&[0u8; 10], layouts, 8192),
            Err(PageError::Structural(_))
        ));
    }
}
