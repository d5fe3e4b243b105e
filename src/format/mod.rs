//! On-disk record layouts and the generic structure decoder

pub mod layout;
pub mod record;
pub mod revision;

pub use layout::{Field, FieldType, Layout};
pub use record::{decode, DecodedRecord, FieldValue, StructuralMismatch};
pub use revision::{FormatRevision, RevisionLayouts};
