//! Heap tuple header

use crate::format::record::DecodedRecord;
use crate::format::revision::{NattsEncoding, RevisionLayouts, HEAP_HASNULL, HEAP_NATTS_MASK};

/// Typed view of a decoded tuple header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TupleHeader {
    /// Inserting transaction
    pub xmin: u32,
    /// Deleting transaction, 0 when live
    pub xmax: u32,
    /// Inserting command, when stored separately
    pub cmin: Option<u32>,
    /// Deleting command, when stored separately
    pub cmax: Option<u32>,
    /// Combined command id (8.3 on)
    pub cid: Option<u32>,
    /// Block of the newer tuple version
    pub ctid_block: u32,
    /// Slot of the newer tuple version
    pub ctid_slot: u16,
    /// Number of attributes stored
    pub natts: u16,
    /// Infomask bit field
    pub infomask: u16,
    /// Header length, null bitmap and oid included
    pub size: usize,
    /// Bytes of the fixed portion
    pub fixed_size: usize,
    /// Whether an oid trails the null bitmap
    pub trailing_oid: bool,
    /// Oid stored in the fixed header (6.5)
    pub header_oid: Option<u32>,
}

impl TupleHeader {
    /// Build the typed view from a complete header record
    pub fn from_record(record: &DecodedRecord<'_>, layouts: &RevisionLayouts) -> Self {
        let u32_field = |name: &str| record.u32(name).unwrap_or(0);
        let u16_field = |name: &str| record.u16(name).unwrap_or(0);
        let infomask = u16_field("infomask");

        let natts = match layouts.natts {
            NattsEncoding::Field => u16_field("natts"),
            NattsEncoding::Infomask2 => u16_field("infomask2") & HEAP_NATTS_MASK,
        };

        Self {
            xmin: u32_field("xmin"),
            xmax: u32_field("xmax"),
            cmin: record.u32("cmin"),
            cmax: record.u32("cmax"),
            cid: record.u32("cid"),
            ctid_block: u32::from(u16_field("tid1")) << 16 | u32::from(u16_field("tid2")),
            ctid_slot: u16_field("tid3"),
            natts,
            infomask,
            size: usize::from(u16_field("size")),
            fixed_size: record.consumed(),
            trailing_oid: layouts.has_oid_mask != 0 && infomask & layouts.has_oid_mask != 0,
            header_oid: record.u32("oid"),
        }
    }

    /// Whether a null bitmap follows the fixed header
    pub fn has_nulls(&self) -> bool {
        self.infomask & HEAP_HASNULL != 0
    }

    /// Byte range of the null bitmap within the tuple
    pub fn bitmap_range(&self) -> std::ops::Range<usize> {
        let end = self.size.saturating_sub(if self.trailing_oid { 4 } else { 0 });
        self.fixed_size..end.max(self.fixed_size)
    }

    /// Oid of the tuple, read from the header or the bytes before `size`
    pub fn oid(&self, tuple: &[u8]) -> Option<u32> {
        if self.header_oid.is_some() {
            return self.header_oid;
        }
        if !self.trailing_oid || self.size < self.fixed_size + 4 {
            return None;
        }
        let bytes = tuple.get(self.size - 4..self.size)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
