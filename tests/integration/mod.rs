//! Integration test framework for tuplesift
//!
//! Provides an on-disk environment for relation files plus fixture builders
//! for a small `orders` relation and its chunk relation.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tuplesift::common::test_utils::{
    chunk_tuple, init_test_logging, long_varlena, short_varlena, PageBuilder, TupleBuilder,
};
use tuplesift::common::{Error, Result};
use tuplesift::format::RevisionLayouts;
use tuplesift::storage::DirectoryProvider;
use tuplesift::{ColumnDef, DecoderConfig, DecodingSession, FormatRevision};

/// File node of the orders relation
pub const ORDERS_NODE: u32 = 16_400;
/// File node of the orders chunk relation
pub const ORDERS_TOAST_NODE: u32 = 16_403;

/// Integration test environment
pub struct TestEnvironment {
    /// Temporary directory holding relation files
    pub temp_dir: TempDir,
    /// Block size used for every relation
    pub block_size: usize,
}

impl TestEnvironment {
    /// Create a new test environment
    pub fn new() -> Result<Self> {
        init_test_logging();
        Ok(Self {
            temp_dir: TempDir::new()?,
            block_size: 8192,
        })
    }

    /// Get the temp directory path
    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a relation file made of `pages` under its file node
    pub fn write_relation(&self, file_node: u32, pages: &[Vec<u8>]) -> Result<PathBuf> {
        let path = self.temp_dir.path().join(file_node.to_string());
        std::fs::write(&path, pages.concat())
            .map_err(|e| Error::io(format!("Failed to write relation {file_node}: {e}")))?;
        Ok(path)
    }

    /// Append raw bytes to a relation file
    pub fn append_bytes(&self, file_node: u32, bytes: &[u8]) -> Result<()> {
        use std::io::Write;
        let path = self.temp_dir.path().join(file_node.to_string());
        let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
        file.write_all(bytes)?;
        Ok(())
    }

    /// Provider reading from the environment directory
    pub fn provider(&self) -> DirectoryProvider {
        DirectoryProvider::new(self.temp_dir.path())
    }

    /// Session for a revision
    pub fn session(&self, revision: FormatRevision) -> Result<DecodingSession> {
        DecodingSession::new(DecoderConfig {
            block_size: self.block_size,
            ..DecoderConfig::for_revision(revision)
        })
    }
}

/// Helper for testing error conditions
pub struct ErrorTester;

impl ErrorTester {
    /// Test that a function returns a specific error type
    pub fn assert_error_type<T: std::fmt::Debug, F>(func: F, expected_predicate: fn(&Error) -> bool)
    where
        F: FnOnce() -> Result<T>,
    {
        let result = func();
        assert!(result.is_err(), "Expected error, got success");

        let error = result.unwrap_err();
        assert!(
            expected_predicate(&error),
            "Error type mismatch. Got: {:?}",
            error
        );
    }

    /// Test that a function returns a schema gap error
    pub fn assert_schema_gap<T: std::fmt::Debug, F>(func: F)
    where
        F: FnOnce() -> Result<T>,
    {
        Self::assert_error_type(func, Error::is_schema_gap);
    }

    /// Test that a function returns an unavailable relation error
    pub fn assert_unavailable<T: std::fmt::Debug, F>(func: F)
    where
        F: FnOnce() -> Result<T>,
    {
        Self::assert_error_type(func, |e| matches!(e, Error::RelationUnavailable { .. }));
    }
}

/// Columns of the orders relation
pub fn orders_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new(1, "id", 23, 4, 4),
        ColumnDef::new(2, "customer", 25, -1, 4),
        ColumnDef::new(3, "note", 25, -1, 4),
    ]
}

/// One orders tuple; `note` is an already encoded varlena
pub fn order_tuple(layouts: &RevisionLayouts, id: i32, customer: &str, note: &[u8]) -> Vec<u8> {
    // the customer has a 1-byte header, so the note follows unpadded
    TupleBuilder::new(layouts, 3)
        .xmin(1000 + id.unsigned_abs())
        .data_aligned(4, &id.to_le_bytes())
        .data(&short_varlena(customer.as_bytes()))
        .data(note)
        .build()
}

/// Order tuple with a null note
pub fn order_tuple_without_note(layouts: &RevisionLayouts, id: i32, customer: &str) -> Vec<u8> {
    TupleBuilder::new(layouts, 3)
        .null_bitmap(&[0b011])
        .data_aligned(4, &id.to_le_bytes())
        .data(&short_varlena(customer.as_bytes()))
        .build()
}

/// Page of a chunk relation holding `value` split into `chunk` byte chunks
pub fn chunk_page(layouts: &RevisionLayouts, block_size: usize, owner: u32, value: &[u8], chunk: usize) -> Vec<u8> {
    let mut builder = PageBuilder::new(layouts, block_size);
    for (seq, part) in value.chunks(chunk).enumerate() {
        let seq = i32::try_from(seq).unwrap_or(i32::MAX);
        builder = builder.tuple(&chunk_tuple(layouts, owner, seq, 0, part));
    }
    builder.build()
}

/// Encoded inline note with a 4-byte header
pub fn long_note(text: &str) -> Vec<u8> {
    long_varlena(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_creation() {
        let env = TestEnvironment::new().expect("Should create test environment");
        assert!(env.temp_path().exists());
        assert!(env.temp_path().is_dir());
    }

    #[test]
    fn test_write_relation() {
        let env = TestEnvironment::new().expect("Should create test environment");
        let path = env
            .write_relation(1, &[vec![0u8; 16], vec![1u8; 16]])
            .expect("Should write relation");
        assert_eq!(std::fs::metadata(path).map(|m| m.len()).ok(), Some(32));
    }

    #[test]
    fn test_error_tester() {
        ErrorTester::assert_schema_gap(|| -> Result<()> { Err(Error::schema_gap("t", 2, 3)) });
        ErrorTester::assert_unavailable(|| -> Result<()> {
            Err(Error::relation_unavailable(7, "gone"))
        });
    }
}
