//! Test utilities for tuplesift
//!
//! Builders here synthesize pages, tuples and variable-length values in the
//! on-disk format of a chosen revision, so decoders can be tested without a
//! real database cluster.

use crate::format::layout::{FieldType, Layout};
use crate::format::revision::{NattsEncoding, RevisionLayouts, HEAP_HASNULL};
use crate::storage::page_constants::SLOT_WORD_SIZE;
use crate::storage::slot::{SlotStatus, TupleSlot};
use std::sync::Once;

static TEST_LOGGER_INIT: Once = Once::new();

/// Initialize logging for tests
pub fn init_test_logging() {
    TEST_LOGGER_INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// Encode `values` into a buffer following `layout`; unnamed fields are zero
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn encode_layout(layout: Layout, values: &[(&str, i64)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(layout.byte_size());
    for f in layout.fields() {
        let value = values
            .iter()
            .rev()
            .find(|(name, _)| *name == f.name)
            .map_or(0, |(_, v)| *v);
        match f.ty {
            FieldType::I8 | FieldType::U8 => out.push(value as u8),
            FieldType::I16 | FieldType::U16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
            FieldType::I32 | FieldType::U32 => out.extend_from_slice(&(value as u32).to_le_bytes()),
            FieldType::Bytes(n) | FieldType::CStr(n) => out.extend(std::iter::repeat(0).take(n)),
        }
    }
    out
}

enum SlotEntry {
    Data(Vec<u8>, SlotStatus),
    Raw(TupleSlot),
}

/// Builds a page image for a revision
pub struct PageBuilder<'a> {
    layouts: &'a RevisionLayouts,
    block_size: usize,
    special_size: usize,
    slots: Vec<SlotEntry>,
    overrides: Vec<(&'static str, i64)>,
}

impl<'a> PageBuilder<'a> {
    /// Start an empty page of `block_size` bytes
    pub fn new(layouts: &'a RevisionLayouts, block_size: usize) -> Self {
        Self {
            layouts,
            block_size,
            special_size: 0,
            slots: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// Add a normal slot holding `bytes`
    #[must_use]
    pub fn tuple(self, bytes: &[u8]) -> Self {
        self.slot_with_status(bytes, SlotStatus::Normal)
    }

    /// Add a slot holding `bytes` with an explicit status
    #[must_use]
    pub fn slot_with_status(mut self, bytes: &[u8], status: SlotStatus) -> Self {
        self.slots.push(SlotEntry::Data(bytes.to_vec(), status));
        self
    }

    /// Add a directory entry verbatim; its index is ignored
    #[must_use]
    pub fn raw_slot(mut self, slot: TupleSlot) -> Self {
        self.slots.push(SlotEntry::Raw(slot));
        self
    }

    /// Reserve a special area at the end of the page
    #[must_use]
    pub fn special_size(mut self, size: usize) -> Self {
        self.special_size = size;
        self
    }

    /// Force a header field to a value after layout
    #[must_use]
    pub fn header_field(mut self, name: &'static str, value: i64) -> Self {
        self.overrides.push((name, value));
        self
    }

    /// Produce the page bytes
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn build(self) -> Vec<u8> {
        let mut page = vec![0u8; self.block_size];
        let header_size = self.layouts.page_header.byte_size();
        let lower = header_size + SLOT_WORD_SIZE * self.slots.len();
        let special = self.block_size - self.special_size;
        let mut upper = special;

        let mut words = Vec::with_capacity(self.slots.len());
        for (i, entry) in self.slots.iter().enumerate() {
            let slot = match entry {
                SlotEntry::Data(bytes, status) => {
                    upper = (upper - bytes.len()) & !7;
                    page[upper..upper + bytes.len()].copy_from_slice(bytes);
                    TupleSlot {
                        index: (i + 1) as u16,
                        offset: upper,
                        length: bytes.len(),
                        status: *status,
                    }
                }
                SlotEntry::Raw(slot) => *slot,
            };
            words.push(slot.to_word());
        }

        let mut values: Vec<(&str, i64)> = vec![
            ("lower", lower as i64),
            ("upper", upper as i64),
            ("special", special as i64),
            (
                "pagesize",
                (self.block_size / self.layouts.page_size_unit) as i64,
            ),
            ("version", 2),
        ];
        values.extend(self.overrides.iter().copied());
        let header = encode_layout(self.layouts.page_header, &values);
        page[..header.len()].copy_from_slice(&header);

        for (i, word) in words.iter().enumerate() {
            let at = header_size + SLOT_WORD_SIZE * i;
            page[at..at + SLOT_WORD_SIZE].copy_from_slice(&word.to_le_bytes());
        }
        page
    }
}

/// Builds raw heap tuple bytes for a revision
pub struct TupleBuilder<'a> {
    layouts: &'a RevisionLayouts,
    fields: Vec<(&'static str, i64)>,
    natts: u16,
    bitmap: Option<Vec<u8>>,
    oid: Option<u32>,
    data: Vec<u8>,
    size_override: Option<u8>,
}

impl<'a> TupleBuilder<'a> {
    /// Start a tuple with `natts` attributes and no nulls
    pub fn new(layouts: &'a RevisionLayouts, natts: u16) -> Self {
        Self {
            layouts,
            fields: Vec::new(),
            natts,
            bitmap: None,
            oid: None,
            data: Vec::new(),
            size_override: None,
        }
    }

    /// Set the inserting transaction id
    #[must_use]
    pub fn xmin(mut self, xmin: u32) -> Self {
        self.fields.push(("xmin", i64::from(xmin)));
        self
    }

    /// Set the deleting transaction id
    #[must_use]
    pub fn xmax(mut self, xmax: u32) -> Self {
        self.fields.push(("xmax", i64::from(xmax)));
        self
    }

    /// Attach a null bitmap (bit set = value present)
    #[must_use]
    pub fn null_bitmap(mut self, bitmap: &[u8]) -> Self {
        self.bitmap = Some(bitmap.to_vec());
        self
    }

    /// Attach an oid
    #[must_use]
    pub fn oid(mut self, oid: u32) -> Self {
        self.oid = Some(oid);
        self
    }

    /// Force the header's declared size
    #[must_use]
    pub fn declared_size(mut self, size: u8) -> Self {
        self.size_override = Some(size);
        self
    }

    /// Append raw column bytes at the current position
    #[must_use]
    pub fn data(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Pad with zeros to `align` (relative to tuple start), then append
    #[must_use]
    pub fn data_aligned(mut self, align: usize, bytes: &[u8]) -> Self {
        let hoff = self.header_size();
        while (hoff + self.data.len()) % align != 0 {
            self.data.push(0);
        }
        self.data.extend_from_slice(bytes);
        self
    }

    fn trailing_oid(&self) -> bool {
        self.oid.is_some() && self.layouts.has_oid_mask != 0
    }

    fn header_size(&self) -> usize {
        let mut size = self.layouts.tuple_header.byte_size();
        if let Some(bitmap) = &self.bitmap {
            size += bitmap.len();
        }
        if self.trailing_oid() {
            size += 4;
        }
        (size + 3) & !3
    }

    /// Produce the tuple bytes
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(self) -> Vec<u8> {
        let hoff = self.header_size();
        let mut infomask = 0u16;
        if self.bitmap.is_some() {
            infomask |= HEAP_HASNULL;
        }
        if self.trailing_oid() {
            infomask |= self.layouts.has_oid_mask;
        }

        let mut values: Vec<(&str, i64)> = vec![
            ("infomask", i64::from(infomask)),
            ("size", i64::from(self.size_override.unwrap_or(hoff as u8))),
        ];
        match self.layouts.natts {
            NattsEncoding::Field => values.push(("natts", i64::from(self.natts))),
            NattsEncoding::Infomask2 => values.push(("infomask2", i64::from(self.natts))),
        }
        if let Some(oid) = self.oid {
            values.push(("oid", i64::from(oid)));
        }
        values.extend(self.fields.iter().copied());

        let mut out = encode_layout(self.layouts.tuple_header, &values);
        if let Some(bitmap) = &self.bitmap {
            out.extend_from_slice(bitmap);
        }
        let oid_at = hoff - 4;
        out.resize(hoff, 0);
        if self.trailing_oid() {
            if let Some(oid) = self.oid {
                out[oid_at..hoff].copy_from_slice(&oid.to_le_bytes());
            }
        }
        out.extend_from_slice(&self.data);
        out
    }
}

/// Inline value with a 1-byte header
///
/// # Panics
///
/// Panics if the payload does not fit a 1-byte header.
#[allow(clippy::cast_possible_truncation)]
pub fn short_varlena(payload: &[u8]) -> Vec<u8> {
    let total = payload.len() + 1;
    assert!(total <= 0x7F, "payload too long for a 1-byte header");
    let mut out = vec![((total as u8) << 1) | 1];
    out.extend_from_slice(payload);
    out
}

/// Inline value with a 4-byte header
#[allow(clippy::cast_possible_truncation)]
pub fn long_varlena(payload: &[u8]) -> Vec<u8> {
    let total = (payload.len() + 4) as u32;
    let mut out = (total << 2).to_le_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

/// Compressed inline value: 4-byte header, raw-length prefix, stream
#[allow(clippy::cast_possible_truncation)]
pub fn compressed_varlena(raw_len: u32, stream: &[u8]) -> Vec<u8> {
    let total = (stream.len() + 8) as u32;
    let mut out = ((total << 2) | 0x02).to_le_bytes().to_vec();
    out.extend_from_slice(&raw_len.to_le_bytes());
    out.extend_from_slice(stream);
    out
}

/// External reference record
pub fn external_pointer(raw_size: i32, physical_size: i32, owner_id: u32) -> Vec<u8> {
    let mut out = vec![0x01, 18, 0, 0];
    out.extend_from_slice(&raw_size.to_le_bytes());
    out.extend_from_slice(&physical_size.to_le_bytes());
    out.extend_from_slice(&owner_id.to_le_bytes());
    out
}

/// Row of a chunk relation: owner id, sequence number, data
pub fn chunk_tuple(layouts: &RevisionLayouts, owner: u32, seq: i32, xmax: u32, data: &[u8]) -> Vec<u8> {
    let mut body = owner.to_le_bytes().to_vec();
    body.extend_from_slice(&seq.to_le_bytes());
    body.extend_from_slice(&long_varlena(data));
    TupleBuilder::new(layouts, 3).xmax(xmax).data(&body).build()
}

/// Attribute catalog row describing one column of relation `relid`
///
/// Catalog columns not named by the arguments are zero, except `attislocal`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn attribute_row(
    layouts: &RevisionLayouts,
    relid: u32,
    name: &str,
    type_id: u32,
    length: i16,
    number: i16,
    align: u8,
) -> Vec<u8> {
    let catalog = layouts.attribute_catalog;
    let mut builder = TupleBuilder::new(layouts, catalog.len() as u16);
    for column in catalog {
        let mut bytes = vec![0u8; column.length.max(0) as usize];
        match column.name {
            "attrelid" => bytes.copy_from_slice(&relid.to_le_bytes()),
            "atttypid" => bytes.copy_from_slice(&type_id.to_le_bytes()),
            "attlen" => bytes.copy_from_slice(&length.to_le_bytes()),
            "attnum" => bytes.copy_from_slice(&number.to_le_bytes()),
            "attalign" => bytes[0] = align,
            "attislocal" => bytes[0] = 1,
            "attname" => {
                let n = name.len().min(bytes.len() - 1);
                bytes[..n].copy_from_slice(&name.as_bytes()[..n]);
            }
            _ => {}
        }
        builder = builder.data_aligned(column.align, &bytes);
    }
    builder.build()
}

/// Compressed stream made of literals only
pub fn literal_stream(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 8 + 1);
    for chunk in bytes.chunks(8) {
        out.push(0);
        out.extend_from_slice(chunk);
    }
    out
}

/// Assert that two byte slices are equal with better error messages
///
/// # Panics
///
/// Panics if the byte slices differ in length or content.
pub fn assert_bytes_equal(actual: &[u8], expected: &[u8], context: &str) {
    assert!(
        actual.len() == expected.len(),
        "{context}: Length mismatch - actual: {}, expected: {}",
        actual.len(),
        expected.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            a == e,
            "{context}: Byte mismatch at index {i}: actual 0x{a:02x}, expected 0x{e:02x}"
        );
    }
}
