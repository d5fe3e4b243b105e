//! Relation byte streams: a relation file split into fixed-size blocks

use crate::common::{Error, Result};
use crate::storage::page_constants::BlockNumber;
use memmap2::{Mmap, MmapOptions};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

enum Backing {
    Mapped(Mmap),
    Memory(Vec<u8>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped(map) => &map[..],
            Backing::Memory(bytes) => &bytes[..],
        }
    }
}

/// An open relation: one file part read as a sequence of blocks
///
/// The mapping (or buffer) is released when the relation is dropped.
pub struct Relation {
    file_node: u32,
    backing: Backing,
    block_size: usize,
}

impl std::fmt::Debug for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation")
            .field("file_node", &self.file_node)
            .field("len", &self.len())
            .field("block_size", &self.block_size)
            .finish()
    }
}

fn check_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 {
        return Err(Error::invalid_config("block size must be non-zero"));
    }
    Ok(())
}

impl Relation {
    /// Memory-map a relation file
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for a zero block size, and
    /// `Error::RelationUnavailable` if the file cannot be opened or mapped.
    pub fn open<P: AsRef<Path>>(file_node: u32, path: P, block_size: usize) -> Result<Self> {
        check_block_size(block_size)?;
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::relation_unavailable(file_node, format!("{}: {e}", path.display())))?;
        let len = file.metadata()?.len();

        let backing = if len == 0 {
            Backing::Memory(Vec::new())
        } else {
            // SAFETY: the map is read-only and the decoder never assumes the
            // contents stay valid; a concurrently truncated file surfaces as
            // short or garbage blocks, which the scanner already tolerates.
            let map = unsafe { MmapOptions::new().map(&file) }
                .map_err(|e| Error::relation_unavailable(file_node, e.to_string()))?;
            Backing::Mapped(map)
        };

        Ok(Self {
            file_node,
            backing,
            block_size,
        })
    }

    /// Wrap an in-memory relation image
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for a zero block size.
    pub fn from_bytes(file_node: u32, bytes: Vec<u8>, block_size: usize) -> Result<Self> {
        check_block_size(block_size)?;
        Ok(Self {
            file_node,
            backing: Backing::Memory(bytes),
            block_size,
        })
    }

    /// File node this relation was opened for
    pub fn file_node(&self) -> u32 {
        self.file_node
    }

    /// Size of one block
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Length of the relation in bytes
    pub fn len(&self) -> usize {
        self.backing.bytes().len()
    }

    /// True for an empty relation file
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of complete blocks
    pub fn block_count(&self) -> usize {
        self.len() / self.block_size
    }

    /// Bytes after the last complete block, if the file is truncated
    pub fn trailing_bytes(&self) -> usize {
        self.len() % self.block_size
    }

    /// One block, if it lies entirely within the file
    pub fn block(&self, block: BlockNumber) -> Option<&[u8]> {
        let start = (block as usize).checked_mul(self.block_size)?;
        self.backing
            .bytes()
            .get(start..start.checked_add(self.block_size)?)
    }

    /// Iterate over all complete blocks with their numbers
    #[allow(clippy::cast_possible_truncation)]
    pub fn blocks(&self) -> impl Iterator<Item = (BlockNumber, &[u8])> {
        self.backing
            .bytes()
            .chunks_exact(self.block_size)
            .enumerate()
            .map(|(i, b)| (i as BlockNumber, b))
    }
}

/// Source of relation byte streams, keyed by file node
pub trait RelationProvider {
    /// Open the relation stored under `file_node`
    ///
    /// # Errors
    ///
    /// Returns `Error::RelationUnavailable` when the relation cannot be read.
    fn open(&self, file_node: u32, block_size: usize) -> Result<Relation>;
}

/// Relations stored as files named by their file node in one directory
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    dir: PathBuf,
}

impl DirectoryProvider {
    /// Provider reading from `dir`
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file for a file node
    pub fn path_for(&self, file_node: u32) -> PathBuf {
        self.dir.join(file_node.to_string())
    }
}

impl RelationProvider for DirectoryProvider {
    fn open(&self, file_node: u32, block_size: usize) -> Result<Relation> {
        Relation::open(file_node, self.path_for(file_node), block_size)
    }
}

/// In-memory relation images, for tests and carved-out data
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    relations: HashMap<u32, Vec<u8>>,
}

impl MemoryProvider {
    /// Empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the image of a relation
    pub fn insert(&mut self, file_node: u32, bytes: Vec<u8>) {
        self.relations.insert(file_node, bytes);
    }

    /// Builder-style registration
    #[must_use]
    pub fn with(mut self, file_node: u32, bytes: Vec<u8>) -> Self {
        self.insert(file_node, bytes);
        self
    }
}

impl RelationProvider for MemoryProvider {
    fn open(&self, file_node: u32, block_size: usize) -> Result<Relation> {
        self.relations
            .get(&file_node)
            .ok_or_else(|| Error::relation_unavailable(file_node, "not registered"))
            .and_then(|bytes| Relation::from_bytes(file_node, bytes.clone(), block_size))
    }
}
