//! Reassembly of out-of-line values from a chunk relation
//!
//! A chunk relation stores each large value as rows `(chunk_id, chunk_seq,
//! chunk_data)`. The index built here maps an owner id to the page and slot
//! of every chunk, keeping only the newest generation of each owner: a row
//! with a strictly greater `xmax` discards what was collected so far, a row
//! with a smaller one is ignored.
//!
//! Chunk tuples are decoded in raw mode with external resolution disabled,
//! so resolving a value never recurses more than one level.

use crate::config::expand_placeholder;
use crate::diagnostics::{DiagnosticContext, DiagnosticKind, Scope};
use crate::format::revision::RevisionLayouts;
use crate::storage::page::{scan_page, PageError, ScannedPage};
use crate::storage::page_constants::BlockNumber;
use crate::storage::relation::Relation;
use crate::tuple::decoder::{decode_tuple, DecodeContext, DecodedTuple};
use crate::tuple::schema::{ColumnDef, ColumnSchema};
use crate::tuple::value::Value;
use crate::varlena::decode::ExternalPointer;
use crate::varlena::pglz;
use crate::{sift_debug, sift_trace};
use std::collections::{BTreeMap, HashMap};

/// Where one chunk lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLocation {
    /// Block number
    pub page: BlockNumber,
    /// 1-based slot index within the block
    pub slot: u16,
}

/// One row of a chunk relation, as needed for indexing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRow {
    /// Owner id shared by all chunks of a value
    pub owner: u32,
    /// Position of the chunk within the value
    pub seq: i32,
    /// Deleting transaction of the chunk row
    pub xmax: u32,
    /// Location of the row
    pub location: ChunkLocation,
}

#[derive(Debug, Clone, Default)]
struct OwnerChunks {
    max_xmax: u32,
    chunks: BTreeMap<i32, ChunkLocation>,
}

/// Owner id to chunk locations, newest generation only
#[derive(Debug, Clone, Default)]
pub struct ExternalValueIndex {
    owners: HashMap<u32, OwnerChunks>,
}

impl ExternalValueIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold chunk rows into an index
    pub fn build<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = ChunkRow>,
    {
        let mut index = Self::new();
        for row in rows {
            index.insert(row);
        }
        index
    }

    /// Index every chunk row of `relation`
    ///
    /// Pages and tuples that cannot be decoded are reported and left out.
    pub fn scan(
        relation: &Relation,
        layouts: &RevisionLayouts,
        diag: &mut DiagnosticContext,
    ) -> Self {
        let schema = chunk_schema();
        let ctx = DecodeContext::raw();
        let mut index = Self::new();

        for (block, bytes) in relation.blocks() {
            diag.push(Scope::Page, block);
            let page = match scan_page(bytes, layouts, relation.block_size()) {
                Ok(page) => Some(page),
                Err(PageError::Uninitialized) => None,
                Err(e) => {
                    diag.report(DiagnosticKind::InvariantViolation, e.to_string());
                    None
                }
            };
            for slot in page.iter().flat_map(|p| p.slots.iter()) {
                let Some(tuple_bytes) = ScannedPage::tuple_bytes(bytes, slot) else {
                    continue;
                };
                diag.push(Scope::Tuple, slot.index);
                match decode_tuple(tuple_bytes, layouts, &schema, &ctx, diag) {
                    Ok(tuple) => match chunk_key(&tuple) {
                        Some((owner, seq)) => index.insert(ChunkRow {
                            owner,
                            seq,
                            xmax: tuple.header.xmax,
                            location: ChunkLocation {
                                page: block,
                                slot: slot.index,
                            },
                        }),
                        None => diag.report(
                            DiagnosticKind::StructuralMismatch,
                            "chunk row without owner id or sequence number",
                        ),
                    },
                    Err(e) => diag.report(e.kind(), e.to_string()),
                }
                diag.pop();
            }
            diag.pop();
        }

        sift_debug!(
            "indexed {} external values in relation {}",
            index.len(),
            relation.file_node()
        );
        index
    }

    /// Add one chunk row, applying generation supersession
    pub fn insert(&mut self, row: ChunkRow) {
        let entry = self.owners.entry(row.owner).or_insert_with(|| OwnerChunks {
            max_xmax: row.xmax,
            chunks: BTreeMap::new(),
        });
        if row.xmax > entry.max_xmax {
            entry.max_xmax = row.xmax;
            entry.chunks.clear();
        } else if row.xmax < entry.max_xmax {
            return;
        }
        entry.chunks.insert(row.seq, row.location);
    }

    /// Chunk locations of an owner, in sequence order
    pub fn locations(&self, owner: u32) -> Option<Vec<(i32, ChunkLocation)>> {
        self.owners
            .get(&owner)
            .map(|o| o.chunks.iter().map(|(seq, loc)| (*seq, *loc)).collect())
    }

    /// Whether an owner is indexed
    pub fn contains(&self, owner: u32) -> bool {
        self.owners.contains_key(&owner)
    }

    /// Number of indexed owners
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// True when nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Column schema shared by every chunk relation
pub fn chunk_schema() -> ColumnSchema {
    ColumnSchema::from_columns(vec![
        ColumnDef::new(1, "chunk_id", 26, 4, 4),
        ColumnDef::new(2, "chunk_seq", 23, 4, 4),
        ColumnDef::new(3, "chunk_data", 17, -1, 4),
    ])
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn chunk_key(tuple: &DecodedTuple) -> Option<(u32, i32)> {
    let owner = tuple.get("chunk_id")?.as_int()?;
    let seq = tuple.get("chunk_seq")?.as_int()?;
    Some((owner as u32, seq as i32))
}

/// Outcome of resolving an external value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Reassembled (and decompressed) value bytes
    Value(Vec<u8>),
    /// The value could not be found
    Placeholder(String),
}

/// An open chunk relation together with its index
///
/// The relation stays open for the lifetime of the store.
#[derive(Debug)]
pub struct ExternalStore {
    relation: Relation,
    index: ExternalValueIndex,
    schema: ColumnSchema,
    layouts: &'static RevisionLayouts,
    placeholder: String,
}

impl ExternalStore {
    /// Store over an already indexed chunk relation
    pub fn new<S: Into<String>>(
        relation: Relation,
        index: ExternalValueIndex,
        layouts: &'static RevisionLayouts,
        placeholder: S,
    ) -> Self {
        Self {
            relation,
            index,
            schema: chunk_schema(),
            layouts,
            placeholder: placeholder.into(),
        }
    }

    /// Index a chunk relation and keep it open
    pub fn open<S: Into<String>>(
        relation: Relation,
        layouts: &'static RevisionLayouts,
        placeholder: S,
        diag: &mut DiagnosticContext,
    ) -> Self {
        diag.push(Scope::Table, format!("chunks {}", relation.file_node()));
        let index = ExternalValueIndex::scan(&relation, layouts, diag);
        diag.pop();
        Self::new(relation, index, layouts, placeholder)
    }

    /// The owner index
    pub fn index(&self) -> &ExternalValueIndex {
        &self.index
    }

    /// Reassemble the value an external pointer refers to
    ///
    /// Never fails: a missing owner yields [`Resolved::Placeholder`] and
    /// exactly one `UnknownType` diagnostic; unreadable chunks are reported
    /// and skipped.
    pub fn resolve(&self, pointer: &ExternalPointer, diag: &mut DiagnosticContext) -> Resolved {
        let owner = pointer.owner_id;
        let Some(chunks) = self.index.locations(owner) else {
            diag.report(
                DiagnosticKind::UnknownType,
                format!("no chunks indexed for external value {owner}"),
            );
            return Resolved::Placeholder(expand_placeholder(&self.placeholder, owner));
        };

        diag.push(Scope::Table, format!("chunks {}", self.relation.file_node()));
        let mut data = Vec::new();
        for (expected, (seq, location)) in chunks.iter().enumerate() {
            if usize::try_from(*seq).ok() != Some(expected) {
                diag.report(
                    DiagnosticKind::InvariantViolation,
                    format!("value {owner} has chunk {seq} where {expected} was expected"),
                );
            }
            if let Some(bytes) = self.read_chunk(*location, diag) {
                data.extend_from_slice(&bytes);
            }
        }

        #[allow(clippy::cast_sign_loss)]
        let stored = pointer.physical_size.max(0) as usize;
        if data.len() != stored {
            diag.report(
                DiagnosticKind::StructuralMismatch,
                format!(
                    "value {owner} reassembled to {} bytes, {stored} expected",
                    data.len()
                ),
            );
        }

        if pointer.is_compressed() {
            data = match pglz::decompress(&data) {
                Ok(out) => out,
                Err(e) => {
                    diag.report(DiagnosticKind::BoundsViolation, e.to_string());
                    e.partial
                }
            };
        }
        diag.pop();

        sift_trace!("resolved external value {owner}: {} bytes", data.len());
        Resolved::Value(data)
    }

    fn read_chunk(&self, location: ChunkLocation, diag: &mut DiagnosticContext) -> Option<Vec<u8>> {
        diag.push(Scope::Page, location.page);
        let chunk = self.read_chunk_in_page(location, diag);
        diag.pop();
        chunk
    }

    fn read_chunk_in_page(
        &self,
        location: ChunkLocation,
        diag: &mut DiagnosticContext,
    ) -> Option<Vec<u8>> {
        let Some(bytes) = self.relation.block(location.page) else {
            diag.report(DiagnosticKind::BoundsViolation, "chunk page is past the end of the relation");
            return None;
        };
        let page = match scan_page(bytes, self.layouts, self.relation.block_size()) {
            Ok(page) => page,
            Err(e) => {
                diag.report(DiagnosticKind::InvariantViolation, e.to_string());
                return None;
            }
        };
        let Some(tuple_bytes) = page
            .slots
            .iter()
            .find(|s| s.index == location.slot)
            .and_then(|slot| ScannedPage::tuple_bytes(bytes, slot))
        else {
            diag.report(
                DiagnosticKind::BoundsViolation,
                format!("chunk slot {} is no longer readable", location.slot),
            );
            return None;
        };

        diag.push(Scope::Tuple, location.slot);
        let decoded = decode_tuple(tuple_bytes, self.layouts, &self.schema, &DecodeContext::raw(), diag);
        let chunk = match decoded {
            Ok(tuple) => match tuple.get("chunk_data") {
                Some(Value::Bytes(data)) => Some(data.clone()),
                _ => {
                    diag.report(DiagnosticKind::StructuralMismatch, "chunk row has no data");
                    None
                }
            },
            Err(e) => {
                diag.report(e.kind(), e.to_string());
                None
            }
        };
        diag.pop();
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_utils::{chunk_tuple, PageBuilder};
    use crate::format::revision::FormatRevision;
    use crate::storage::page_constants::DEFAULT_BLOCK_SIZE;
    use pretty_assertions::assert_eq;

    fn loc(page: u32, slot: u16) -> ChunkLocation {
        ChunkLocation { page, slot }
    }

    fn row(owner: u32, seq: i32, xmax: u32, location: ChunkLocation) -> ChunkRow {
        ChunkRow {
            owner,
            seq,
            xmax,
            location,
        }
    }

    fn pointer(raw_size: i32, physical_size: i32, owner_id: u32) -> ExternalPointer {
        ExternalPointer {
            tag: 18,
            raw_size,
            physical_size,
            owner_id,
        }
    }

    fn store(pages: Vec<Vec<u8>>) -> (ExternalStore, DiagnosticContext) {
        let layouts = FormatRevision::V80.layouts();
        let relation = Relation::from_bytes(900, pages.concat(), DEFAULT_BLOCK_SIZE).unwrap();
        let mut diag = DiagnosticContext::default();
        let store = ExternalStore::open(relation, layouts, "<gone {id}>", &mut diag);
        (store, diag)
    }

    #[test]
    fn test_index_supersession() {
        let index = ExternalValueIndex::build(vec![
            row(1, 0, 0, loc(0, 1)),
            row(1, 1, 0, loc(0, 2)),
            row(1, 0, 5, loc(3, 1)),
            row(1, 1, 3, loc(0, 2)),
            row(1, 1, 5, loc(3, 2)),
            row(2, 0, 0, loc(1, 1)),
        ]);

        assert_eq!(index.len(), 2);
        assert_eq!(
            index.locations(1),
            Some(vec![(0, loc(3, 1)), (1, loc(3, 2))])
        );
        assert_eq!(index.locations(2), Some(vec![(0, loc(1, 1))]));
        assert!(index.locations(3).is_none());
    }

    #[test]
    fn test_resolve_in_sequence_order() {
        let layouts = FormatRevision::V80.layouts();
        let page = PageBuilder::new(layouts, DEFAULT_BLOCK_SIZE)
            .tuple(&chunk_tuple(layouts, 7, 1, 0, b"world"))
            .tuple(&chunk_tuple(layouts, 7, 0, 0, b"hello "))
            .build();
        let (store, mut diag) = store(vec![page]);
        assert!(diag.diagnostics().is_empty());
        assert!(store.index().contains(7));

        let resolved = store.resolve(&pointer(15, 11, 7), &mut diag);
        assert_eq!(resolved, Resolved::Value(b"hello world".to_vec()));
        assert!(diag.diagnostics().is_empty());
        assert_eq!(diag.depth(), 0);
    }

    #[test]
    fn test_resolve_across_pages() {
        let layouts = FormatRevision::V80.layouts();
        let first = PageBuilder::new(layouts, DEFAULT_BLOCK_SIZE)
            .tuple(&chunk_tuple(layouts, 3, 0, 0, b"abc"))
            .build();
        let second = PageBuilder::new(layouts, DEFAULT_BLOCK_SIZE)
            .tuple(&chunk_tuple(layouts, 3, 1, 0, b"def"))
            .build();
        let (store, mut diag) = store(vec![first, second]);

        assert_eq!(
            store.index().locations(3),
            Some(vec![(0, loc(0, 1)), (1, loc(1, 1))])
        );
        assert_eq!(
            store.resolve(&pointer(10, 6, 3), &mut diag),
            Resolved::Value(b"abcdef".to_vec())
        );
    }

    #[test]
    fn test_resolve_compressed_value() {
        let layouts = FormatRevision::V80.layouts();
        // raw length 20, literal 'A' then a back-reference of 19
        let mut stored = 20u32.to_le_bytes().to_vec();
        stored.extend_from_slice(&[0b10, b'A', 0x0F, 0x01, 1]);
        let page = PageBuilder::new(layouts, DEFAULT_BLOCK_SIZE)
            .tuple(&chunk_tuple(layouts, 11, 0, 0, &stored))
            .build();
        let (store, mut diag) = store(vec![page]);

        let resolved = store.resolve(&pointer(24, 9, 11), &mut diag);
        assert_eq!(resolved, Resolved::Value(vec![b'A'; 20]));
        assert!(diag.diagnostics().is_empty());
    }

    #[test]
    fn test_missing_owner_yields_placeholder() {
        let layouts = FormatRevision::V80.layouts();
        let page = PageBuilder::new(layouts, DEFAULT_BLOCK_SIZE)
            .tuple(&chunk_tuple(layouts, 1, 0, 0, b"x"))
            .build();
        let (store, mut diag) = store(vec![page]);

        let resolved = store.resolve(&pointer(100, 96, 42), &mut diag);
        assert_eq!(resolved, Resolved::Placeholder("<gone 42>".to_string()));
        assert_eq!(diag.diagnostics().len(), 1);
        assert_eq!(diag.count(DiagnosticKind::UnknownType), 1);
    }

    #[test]
    fn test_newer_generation_wins_on_page() {
        let layouts = FormatRevision::V80.layouts();
        let page = PageBuilder::new(layouts, DEFAULT_BLOCK_SIZE)
            .tuple(&chunk_tuple(layouts, 5, 0, 0, b"old"))
            .tuple(&chunk_tuple(layouts, 5, 0, 9, b"new"))
            .build();
        let (store, mut diag) = store(vec![page]);

        assert_eq!(
            store.resolve(&pointer(7, 3, 5), &mut diag),
            Resolved::Value(b"new".to_vec())
        );
    }

    #[test]
    fn test_short_reassembly_is_reported() {
        let layouts = FormatRevision::V80.layouts();
        let page = PageBuilder::new(layouts, DEFAULT_BLOCK_SIZE)
            .tuple(&chunk_tuple(layouts, 4, 0, 0, b"ab"))
            .tuple(&chunk_tuple(layouts, 4, 2, 0, b"ef"))
            .build();
        let (store, mut diag) = store(vec![page]);

        let resolved = store.resolve(&pointer(10, 6, 4), &mut diag);
        assert_eq!(resolved, Resolved::Value(b"abef".to_vec()));
        assert_eq!(diag.count(DiagnosticKind::InvariantViolation), 1);
        assert_eq!(diag.count(DiagnosticKind::StructuralMismatch), 1);
    }
}
