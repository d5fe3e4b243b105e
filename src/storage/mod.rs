//! Storage layer: relation files, pages and slot directories

pub mod page;
pub mod page_constants;
pub mod page_header;
pub mod relation;
pub mod slot;

pub use page::{scan_page, PageError, ScannedPage, SlotViolation};
pub use page_header::PageHeader;
pub use relation::{DirectoryProvider, MemoryProvider, Relation, RelationProvider};
pub use slot::{SlotStatus, TupleSlot};
