//! tuplesift - forensic decoder for raw relational storage files
//!
//! tuplesift reads relation files straight off disk and rebuilds logical rows
//! from the physical page and tuple layout, without a running database:
//! - Version-dispatched layouts for the 6.5, 7.3, 8.0 and 8.3 formats
//! - Page scanning with header and slot validation
//! - Tuple decoding with null bitmaps, alignment and variable-length values
//! - Decompression and reassembly of out-of-line values
//! - Every inconsistency reported with its location instead of aborting

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

// Core modules
pub mod catalog;
pub mod common;
pub mod config;
pub mod diagnostics;
pub mod format;
pub mod session;
pub mod storage;
pub mod tuple;
pub mod varlena;

// Re-exports for convenience
pub use common::{Error, Result};
pub use config::DecoderConfig;
pub use diagnostics::{Diagnostic, DiagnosticContext, DiagnosticKind, Scope};
pub use format::FormatRevision;
pub use session::{DecodedRow, DecodingSession, RelationDescriptor, RelationScan};
pub use tuple::{ColumnDef, ColumnSchema, TypeRegistry, Value, ValueRenderer};

/// Version information
pub const VERSION_MAJOR: u32 = 0;
/// Version information
pub const VERSION_MINOR: u32 = 1;
/// Version information
pub const VERSION_PATCH: u32 = 0;
/// Version string
pub const VERSION: &str = "0.1.0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
        assert_eq!(VERSION_MAJOR, 0);
        assert_eq!(VERSION_MINOR, 1);
        assert_eq!(VERSION_PATCH, 0);
    }
}
