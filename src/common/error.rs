//! Error handling for tuplesift
//!
//! [`Error`] covers the failures that end the scan of a whole relation (or the
//! whole session during setup). Per-page, per-tuple and per-value failures have
//! their own error types next to the code that raises them and are reported as
//! diagnostics rather than propagated.

use thiserror::Error;

/// Common result type for tuplesift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tuplesift operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(String),
    /// A relation's column schema is missing a column number
    #[error("schema gap in relation '{relation}': column {missing} of {columns} is missing")]
    SchemaGap {
        /// Relation whose schema is incomplete
        relation: String,
        /// First missing column number
        missing: u16,
        /// Highest column number present
        columns: u16,
    },
    /// A column schema is malformed in a way other than a gap
    #[error("invalid schema for relation '{relation}': {reason}")]
    InvalidSchema {
        /// Relation whose schema is malformed
        relation: String,
        /// What is wrong with it
        reason: String,
    },
    /// The format revision tag is not supported
    #[error("unsupported format revision: {0}")]
    UnsupportedRevision(String),
    /// A relation's byte stream could not be opened
    #[error("relation {file_node} is unavailable: {reason}")]
    RelationUnavailable {
        /// File node of the relation
        file_node: u32,
        /// Why it could not be opened
        reason: String,
    },
    /// Decoder configuration is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create an I/O error
    pub fn io<S: Into<String>>(msg: S) -> Self {
        Error::Io(msg.into())
    }

    /// Create a schema gap error
    pub fn schema_gap<S: Into<String>>(relation: S, missing: u16, columns: u16) -> Self {
        Error::SchemaGap {
            relation: relation.into(),
            missing,
            columns,
        }
    }

    /// Create an invalid schema error
    pub fn invalid_schema<S: Into<String>, R: Into<String>>(relation: S, reason: R) -> Self {
        Error::InvalidSchema {
            relation: relation.into(),
            reason: reason.into(),
        }
    }

    /// Create an unavailable relation error
    pub fn relation_unavailable<S: Into<String>>(file_node: u32, reason: S) -> Self {
        Error::RelationUnavailable {
            file_node,
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Check if this is an I/O error
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Check if this is a schema gap error
    pub fn is_schema_gap(&self) -> bool {
        matches!(self, Error::SchemaGap { .. })
    }

    /// Check if this error ends the scan of a single relation only
    ///
    /// Everything except setup errors (revision, configuration) leaves the
    /// rest of a multi-relation run intact.
    pub fn is_fatal_for_relation(&self) -> bool {
        match self {
            Error::Io(_)
            | Error::SchemaGap { .. }
            | Error::InvalidSchema { .. }
            | Error::RelationUnavailable { .. } => true,
            Error::UnsupportedRevision(_) | Error::InvalidConfig(_) => false,
        }
    }
}
