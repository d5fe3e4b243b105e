//! Typed view of a decoded page header
//!
//! Field sets differ per revision; the boundaries and the page size tag are
//! present in all of them, the log markers only from 7.3 on.

use crate::format::record::DecodedRecord;
use crate::format::revision::RevisionLayouts;
use crate::storage::page_constants::LOWER_ALIGNMENT;
use std::fmt;

/// Page header fields shared by every revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageHeader {
    /// Start of free space (end of the slot directory)
    pub lower: usize,
    /// End of free space (start of tuple data)
    pub upper: usize,
    /// Start of the special area
    pub special: usize,
    /// Raw page size tag
    pub pagesize: usize,
    /// Page layout version, when the revision stores one
    pub version: Option<u8>,
    /// Log sequence number, when the revision stores one
    pub lsn: Option<u64>,
    /// Oldest prunable xid, when the revision stores one
    pub prune_xid: Option<u32>,
    /// Bytes occupied by the header itself
    pub header_size: usize,
}

/// A failed page header sanity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderViolation {
    /// `lower` is not a multiple of four
    MisalignedLower(usize),
    /// `lower` lies beyond `upper`
    LowerAboveUpper {
        /// Start of free space
        lower: usize,
        /// End of free space
        upper: usize,
    },
    /// `lower` ends inside the header
    LowerInsideHeader {
        /// Start of free space
        lower: usize,
        /// Header size
        header_size: usize,
    },
    /// The page size tag disagrees with the configured block size
    PageSizeMismatch {
        /// Size the header claims, in bytes
        claimed: usize,
        /// Configured block size
        expected: usize,
    },
}

impl fmt::Display for HeaderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderViolation::MisalignedLower(lower) => {
                write!(f, "lower {lower} is not a multiple of {LOWER_ALIGNMENT}")
            }
            HeaderViolation::LowerAboveUpper { lower, upper } => {
                write!(f, "lower {lower} exceeds upper {upper}")
            }
            HeaderViolation::LowerInsideHeader { lower, header_size } => {
                write!(f, "lower {lower} lies inside the {header_size}-byte header")
            }
            HeaderViolation::PageSizeMismatch { claimed, expected } => {
                write!(f, "page size {claimed} does not match block size {expected}")
            }
        }
    }
}

impl PageHeader {
    /// Build the typed view from a decoded header record
    ///
    /// Missing fields read as zero; callers check the record's structural
    /// error first.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_record(record: &DecodedRecord<'_>) -> Self {
        let field = |name: &str| record.u16(name).map_or(0, usize::from);
        let has = |name: &str| record.layout().has_field(name);

        let lsn = (has("lsn_hi") && has("lsn_lo")).then(|| {
            u64::from(record.u32("lsn_hi").unwrap_or(0)) << 32
                | u64::from(record.u32("lsn_lo").unwrap_or(0))
        });

        Self {
            lower: field("lower"),
            upper: field("upper"),
            special: field("special"),
            pagesize: field("pagesize"),
            version: record.int("version").map(|v| v as u8),
            lsn,
            prune_xid: record.u32("prune_xid"),
            header_size: record.consumed(),
        }
    }

    /// True for a page that was allocated but never initialized
    pub fn is_new(&self) -> bool {
        self.lower == 0 && self.upper == 0
    }

    /// Page size in bytes implied by the header
    pub fn page_size(&self, layouts: &RevisionLayouts) -> usize {
        self.pagesize * layouts.page_size_unit
    }

    /// Check the header against the page invariants
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(
        &self,
        layouts: &RevisionLayouts,
        block_size: usize,
    ) -> Result<(), HeaderViolation> {
        if self.lower % LOWER_ALIGNMENT != 0 {
            return Err(HeaderViolation::MisalignedLower(self.lower));
        }
        if self.lower > self.upper {
            return Err(HeaderViolation::LowerAboveUpper {
                lower: self.lower,
                upper: self.upper,
            });
        }
        let claimed = self.page_size(layouts);
        if claimed != block_size {
            return Err(HeaderViolation::PageSizeMismatch {
                claimed,
                expected: block_size,
            });
        }
        if self.lower < self.header_size {
            return Err(HeaderViolation::LowerInsideHeader {
                lower: self.lower,
                header_size: self.header_size,
            });
        }
        Ok(())
    }

    /// Number of slot directory entries
    pub fn slot_count(&self) -> usize {
        self.lower.saturating_sub(self.header_size) / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::record::decode;
    use crate::format::revision::FormatRevision;

    fn header_bytes(lower: u16, upper: u16, special: u16, pagesize: u8) -> Vec<u8> {
        let mut buf = vec![0u8; 20];
        buf[0..4].copy_from_slice(&1u32.to_le_bytes());
        buf[4..8].copy_from_slice(&0x10u32.to_le_bytes());
        buf[12..14].copy_from_slice(&lower.to_le_bytes());
        buf[14..16].copy_from_slice(&upper.to_le_bytes());
        buf[16..18].copy_from_slice(&special.to_le_bytes());
        buf[18] = 2;
        buf[19] = pagesize;
        buf
    }

    #[test]
    fn test_from_record() {
        let layouts = FormatRevision::V80.layouts();
        let buf = header_bytes(28, 8000, 8192, 32);
        let header = PageHeader::from_record(&decode(layouts.page_header, &buf));

        assert_eq!(header.lower, 28);
        assert_eq!(header.upper, 8000);
        assert_eq!(header.special, 8192);
        assert_eq!(header.version, Some(2));
        assert_eq!(header.lsn, Some((1u64 << 32) | 0x10));
        assert_eq!(header.header_size, 20);
        assert_eq!(header.slot_count(), 2);
        assert_eq!(header.page_size(layouts), 8192);
        assert!(header.validate(layouts, 8192).is_ok());
    }

    #[test]
    fn test_invariants() {
        let layouts = FormatRevision::V80.layouts();
        let check = |lower, upper, pagesize| {
            let buf = header_bytes(lower, upper, 8192, pagesize);
            PageHeader::from_record(&decode(layouts.page_header, &buf)).validate(layouts, 8192)
        };

        assert_eq!(check(26, 8000, 32), Err(HeaderViolation::MisalignedLower(26)));
        assert!(matches!(
            check(8004, 8000, 32),
            Err(HeaderViolation::LowerAboveUpper { .. })
        ));
        assert!(matches!(
            check(28, 8000, 16),
            Err(HeaderViolation::PageSizeMismatch {
                claimed: 4096,
                expected: 8192
            })
        ));
        assert!(matches!(
            check(16, 8000, 32),
            Err(HeaderViolation::LowerInsideHeader { .. })
        ));
    }

    #[test]
    fn test_legacy_page_size_in_bytes() {
        let layouts = FormatRevision::V65.layouts();
        let mut buf = vec![0u8; 8];
        buf[0..2].copy_from_slice(&16u16.to_le_bytes());
        buf[2..4].copy_from_slice(&8000u16.to_le_bytes());
        buf[4..6].copy_from_slice(&8192u16.to_le_bytes());
        buf[6..8].copy_from_slice(&8192u16.to_le_bytes());

        let header = PageHeader::from_record(&decode(layouts.page_header, &buf));
        assert_eq!(header.lsn, None);
        assert_eq!(header.version, None);
        assert_eq!(header.slot_count(), 2);
        assert!(header.validate(layouts, 8192).is_ok());
    }
}
