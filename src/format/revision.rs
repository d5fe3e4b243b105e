//! Format revisions and the layout registry
//!
//! A [`FormatRevision`] selects one [`RevisionLayouts`] entry describing the
//! page header, heap tuple header, index tuple header and attribute catalog
//! of that on-disk format. Revisions are ordered; a tag between two known
//! revisions resolves to the older one, whose layouts it shares.

use crate::common::{Error, Result};
use crate::format::layout::{field, FieldType, Layout};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered on-disk format revision tag (`65`, `73`, `80`, `83`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct FormatRevision(u16);

impl FormatRevision {
    /// 6.5 format: oid in the fixed tuple header, 8-byte page header
    pub const V65: Self = Self(65);
    /// 7.3 format: optional oid, LSN-bearing page header
    pub const V73: Self = Self(73);
    /// 8.0 format
    pub const V80: Self = Self(80);
    /// 8.3 format: combined command id, natts packed into `infomask2`
    pub const V83: Self = Self(83);

    /// Known revisions, oldest first
    pub const KNOWN: [Self; 4] = [Self::V65, Self::V73, Self::V80, Self::V83];

    /// Create a revision from its numeric tag
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedRevision` for tags older than the oldest
    /// known revision.
    pub fn new(tag: u16) -> Result<Self> {
        if tag < Self::V65.0 {
            return Err(Error::UnsupportedRevision(tag.to_string()));
        }
        Ok(Self(tag))
    }

    /// Parse the contents of a version marker file such as `"8.3\n"`
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedRevision` when the text is not a
    /// `major.minor` or `major` version or is older than 6.5.
    pub fn from_version_file(contents: &str) -> Result<Self> {
        let text = contents.trim();
        let unsupported = || Error::UnsupportedRevision(text.to_string());

        let mut parts = text.split('.');
        let major: u16 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(unsupported)?;
        let minor: u16 = match parts.next() {
            Some(p) => p.parse().map_err(|_| unsupported())?,
            None => 0,
        };

        // Two-part versions from 10 onward have no minor component.
        let tag = if major >= 10 {
            major.saturating_mul(10)
        } else {
            major * 10 + minor.min(9)
        };
        Self::new(tag).map_err(|_| unsupported())
    }

    /// Numeric tag
    pub fn tag(self) -> u16 {
        self.0
    }

    /// Layouts for this revision
    ///
    /// Tags without an exact entry use the newest known revision not above
    /// them.
    pub fn layouts(self) -> &'static RevisionLayouts {
        if self >= Self::V83 {
            &R83
        } else if self >= Self::V80 {
            &R80
        } else if self >= Self::V73 {
            &R73
        } else {
            &R65
        }
    }
}

impl Default for FormatRevision {
    fn default() -> Self {
        Self::V80
    }
}

impl TryFrom<u16> for FormatRevision {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        Self::new(value)
    }
}

impl From<FormatRevision> for u16 {
    fn from(revision: FormatRevision) -> Self {
        revision.0
    }
}

impl fmt::Display for FormatRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One column of the attribute catalog as stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogColumn {
    /// Column name
    pub name: &'static str,
    /// Type id of the column
    pub type_id: u32,
    /// Declared length (`-1` variable)
    pub length: i16,
    /// Alignment in bytes
    pub align: usize,
}

const fn col(name: &'static str, type_id: u32, length: i16, align: usize) -> CatalogColumn {
    CatalogColumn {
        name,
        type_id,
        length,
        align,
    }
}

/// How the natts count is stored in the tuple header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NattsEncoding {
    /// A dedicated `natts` field
    Field,
    /// Low 11 bits of `infomask2`
    Infomask2,
}

/// Everything that varies between format revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionLayouts {
    /// Revision these layouts belong to
    pub revision: FormatRevision,
    /// Page header layout
    pub page_header: Layout,
    /// Heap tuple header layout
    pub tuple_header: Layout,
    /// Index tuple header layout
    pub index_tuple_header: Layout,
    /// Columns of the attribute catalog, in column-number order
    pub attribute_catalog: &'static [CatalogColumn],
    /// Multiplier turning the header's `pagesize` field into bytes
    pub page_size_unit: usize,
    /// Infomask bit flagging a trailing oid in the header, 0 when the oid is
    /// a fixed header field
    pub has_oid_mask: u16,
    /// Where the attribute count lives
    pub natts: NattsEncoding,
}

/// Infomask bit flagging a null bitmap
pub const HEAP_HASNULL: u16 = 0x0001;

/// Mask extracting natts from `infomask2`
pub const HEAP_NATTS_MASK: u16 = 0x07FF;

/// Oid type id
pub const OID_TYPE: u32 = 26;

const INDEX_TUPLE_HEADER: Layout = Layout::new(
    "index tuple header",
    &[
        field("tid1", FieldType::U16),
        field("tid2", FieldType::U16),
        field("tid3", FieldType::U16),
        field("info", FieldType::U16),
    ],
);

const TUPLE_HEADER_73: Layout = Layout::new(
    "tuple header",
    &[
        field("xmin", FieldType::U32),
        field("cmin", FieldType::U32),
        field("xmax", FieldType::U32),
        field("cmax", FieldType::U32),
        field("tid1", FieldType::U16),
        field("tid2", FieldType::U16),
        field("tid3", FieldType::U16),
        field("natts", FieldType::U16),
        field("infomask", FieldType::U16),
        field("size", FieldType::U8),
    ],
);

const ATTRIBUTE_CATALOG_80: &[CatalogColumn] = &[
    col("attrelid", OID_TYPE, 4, 4),
    col("attname", 19, 64, 1),
    col("atttypid", OID_TYPE, 4, 4),
    col("attstattarget", 23, 4, 4),
    col("attlen", 21, 2, 2),
    col("attnum", 21, 2, 2),
    col("attndims", 23, 4, 4),
    col("attcacheoff", 23, 4, 4),
    col("atttypmod", 23, 4, 4),
    col("attbyval", 16, 1, 1),
    col("attstorage", 18, 1, 1),
    col("attalign", 18, 1, 1),
    col("attnotnull", 16, 1, 1),
    col("atthasdef", 16, 1, 1),
    col("attisdropped", 16, 1, 1),
    col("attislocal", 16, 1, 1),
    col("attinhcount", 23, 4, 4),
];

static R65: RevisionLayouts = RevisionLayouts {
    revision: FormatRevision::V65,
    page_header: Layout::new(
        "page header",
        &[
            field("lower", FieldType::U16),
            field("upper", FieldType::U16),
            field("special", FieldType::U16),
            field("pagesize", FieldType::U16),
        ],
    ),
    tuple_header: Layout::new(
        "tuple header",
        &[
            field("oid", FieldType::U32),
            field("cmin", FieldType::U32),
            field("cmax", FieldType::U32),
            field("xmin", FieldType::U32),
            field("xmax", FieldType::U32),
            field("tid1", FieldType::U16),
            field("tid2", FieldType::U16),
            field("tid3", FieldType::U16),
            field("natts", FieldType::U16),
            field("infomask", FieldType::U16),
            field("size", FieldType::U8),
        ],
    ),
    index_tuple_header: INDEX_TUPLE_HEADER,
    attribute_catalog: &[
        col("attrelid", OID_TYPE, 4, 4),
        col("attname", 19, 32, 4),
        col("atttypid", OID_TYPE, 4, 4),
        col("attdisbursion", 700, 4, 4),
        col("attlen", 21, 2, 2),
        col("attnum", 21, 2, 2),
        col("attnelems", 23, 4, 4),
        col("attcacheoff", 23, 4, 4),
        col("atttypmod", 23, 4, 4),
        col("attbyval", 16, 1, 1),
        col("attisset", 16, 1, 1),
        col("attalign", 18, 1, 1),
        col("attnotnull", 16, 1, 1),
        col("atthasdef", 16, 1, 1),
    ],
    page_size_unit: 1,
    has_oid_mask: 0,
    natts: NattsEncoding::Field,
};

static R73: RevisionLayouts = RevisionLayouts {
    revision: FormatRevision::V73,
    page_header: Layout::new(
        "page header",
        &[
            field("lsn_hi", FieldType::U32),
            field("lsn_lo", FieldType::U32),
            field("sui", FieldType::U32),
            field("lower", FieldType::U16),
            field("upper", FieldType::U16),
            field("special", FieldType::U16),
            field("version", FieldType::U8),
            field("pagesize", FieldType::U8),
        ],
    ),
    tuple_header: TUPLE_HEADER_73,
    index_tuple_header: INDEX_TUPLE_HEADER,
    attribute_catalog: &[
        col("attrelid", OID_TYPE, 4, 4),
        col("attname", 19, 64, 1),
        col("atttypid", OID_TYPE, 4, 4),
        col("attstattarget", 23, 4, 4),
        col("attlen", 21, 2, 2),
        col("attnum", 21, 2, 2),
        col("attndims", 23, 4, 4),
        col("attcacheoff", 23, 4, 4),
        col("atttypmod", 23, 4, 4),
        col("attbyval", 16, 1, 1),
        col("attstorage", 18, 1, 1),
        col("attisset", 16, 1, 1),
        col("attalign", 18, 1, 1),
        col("attnotnull", 16, 1, 1),
        col("atthasdef", 16, 1, 1),
        col("attisdropped", 16, 1, 1),
        col("attislocal", 16, 1, 1),
        col("attinhcount", 23, 4, 4),
    ],
    page_size_unit: 256,
    has_oid_mask: 0x0010,
    natts: NattsEncoding::Field,
};

static R80: RevisionLayouts = RevisionLayouts {
    revision: FormatRevision::V80,
    page_header: Layout::new(
        "page header",
        &[
            field("lsn_hi", FieldType::U32),
            field("lsn_lo", FieldType::U32),
            field("tli", FieldType::U32),
            field("lower", FieldType::U16),
            field("upper", FieldType::U16),
            field("special", FieldType::U16),
            field("version", FieldType::U8),
            field("pagesize", FieldType::U8),
        ],
    ),
    tuple_header: TUPLE_HEADER_73,
    index_tuple_header: INDEX_TUPLE_HEADER,
    attribute_catalog: ATTRIBUTE_CATALOG_80,
    page_size_unit: 256,
    has_oid_mask: 0x0010,
    natts: NattsEncoding::Field,
};

static R83: RevisionLayouts = RevisionLayouts {
    revision: FormatRevision::V83,
    page_header: Layout::new(
        "page header",
        &[
            field("lsn_hi", FieldType::U32),
            field("lsn_lo", FieldType::U32),
            field("tli", FieldType::U16),
            field("flags", FieldType::U16),
            field("lower", FieldType::U16),
            field("upper", FieldType::U16),
            field("special", FieldType::U16),
            field("version", FieldType::U8),
            field("pagesize", FieldType::U8),
            field("prune_xid", FieldType::U32),
        ],
    ),
    tuple_header: Layout::new(
        "tuple header",
        &[
            field("xmin", FieldType::U32),
            field("xmax", FieldType::U32),
            field("cid", FieldType::U32),
            field("tid1", FieldType::U16),
            field("tid2", FieldType::U16),
            field("tid3", FieldType::U16),
            field("infomask2", FieldType::U16),
            field("infomask", FieldType::U16),
            field("size", FieldType::U8),
        ],
    ),
    index_tuple_header: INDEX_TUPLE_HEADER,
    attribute_catalog: ATTRIBUTE_CATALOG_80,
    page_size_unit: 256,
    has_oid_mask: 0x0008,
    natts: NattsEncoding::Infomask2,
};
