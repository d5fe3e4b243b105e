//! Decoding session: relation scans driven page by page
//!
//! A [`DecodingSession`] owns every piece of state a scan needs: the
//! configuration and its revision layouts, the type and renderer registries,
//! the per-relation schema cache and the diagnostic context. Relations are
//! opened through a [`RelationProvider`] for the duration of one scan.

use crate::common::logging::Timer;
use crate::common::{Error, Result};
use crate::config::DecoderConfig;
use crate::diagnostics::{Diagnostic, DiagnosticContext, DiagnosticKind, Scope};
use crate::format::revision::RevisionLayouts;
use crate::storage::page::{scan_page, PageError, ScannedPage};
use crate::storage::page_constants::BlockNumber;
use crate::storage::relation::{Relation, RelationProvider};
use crate::tuple::decoder::{decode_tuple, DecodeContext, DecodedTuple};
use crate::tuple::schema::{ColumnDef, ColumnSchema, TypeRegistry};
use crate::tuple::value::{RendererRegistry, Value};
use crate::varlena::toast::ExternalStore;
use crate::{sift_debug, sift_error, sift_info, sift_warn};
use serde::Serialize;
use std::collections::HashMap;

/// What to scan: a relation, its storage and its columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    /// Relation name, used for diagnostics and the schema cache
    pub name: String,
    /// File node of the relation's storage
    pub file_node: u32,
    /// Column definitions; empty to use a schema registered earlier
    pub columns: Vec<ColumnDef>,
    /// File node of the chunk relation holding out-of-line values
    pub toast_file_node: Option<u32>,
}

impl RelationDescriptor {
    /// Descriptor without a chunk relation
    pub fn new<S: Into<String>>(name: S, file_node: u32, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            file_node,
            columns,
            toast_file_node: None,
        }
    }

    /// Attach a chunk relation
    #[must_use]
    pub fn with_toast(mut self, file_node: u32) -> Self {
        self.toast_file_node = Some(file_node);
        self
    }
}

/// One decoded row with its physical location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedRow {
    /// Block number
    pub page: BlockNumber,
    /// 1-based slot index
    pub tuple: u16,
    /// Oid, when the tuple carries one
    pub oid: Option<u32>,
    /// Inserting transaction
    pub xmin: u32,
    /// Deleting transaction
    pub xmax: u32,
    /// Column name and value pairs in column order; empty for failed tuples
    pub columns: Vec<(String, Value)>,
    /// False for failed or truncated tuples
    pub complete: bool,
}

impl DecodedRow {
    fn from_tuple(page: BlockNumber, tuple: u16, decoded: DecodedTuple) -> Self {
        Self {
            page,
            tuple,
            oid: decoded.oid,
            xmin: decoded.header.xmin,
            xmax: decoded.header.xmax,
            columns: decoded.values,
            complete: decoded.complete,
        }
    }

    fn failed(page: BlockNumber, tuple: u16) -> Self {
        Self {
            page,
            tuple,
            oid: None,
            xmin: 0,
            xmax: 0,
            columns: Vec::new(),
            complete: false,
        }
    }

    /// Value of a column by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Outcome of one relation in [`DecodingSession::scan_all`]
#[derive(Debug, Clone, PartialEq)]
pub struct RelationScan {
    /// Relation name
    pub relation: String,
    /// Decoded rows; empty when the scan failed
    pub rows: Vec<DecodedRow>,
    /// Error that ended the scan, if any
    pub error: Option<Error>,
}

/// All state of one decoding run
#[derive(Debug)]
pub struct DecodingSession {
    config: DecoderConfig,
    layouts: &'static RevisionLayouts,
    types: TypeRegistry,
    renderers: RendererRegistry,
    schemas: HashMap<String, ColumnSchema>,
    diag: DiagnosticContext,
}

impl DecodingSession {
    /// Session with the built-in type and renderer registries
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` when `config` does not validate.
    pub fn new(config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        let layouts = config.revision.layouts();
        let diag = DiagnosticContext::new(config.context_separator.clone(), config.collect_diagnostics);
        sift_info!(
            "decoding session for revision {} ({}-byte blocks)",
            config.revision,
            config.block_size
        );
        Ok(Self {
            config,
            layouts,
            types: TypeRegistry::builtin(),
            renderers: RendererRegistry::builtin(),
            schemas: HashMap::new(),
            diag,
        })
    }

    /// Replace the type registry
    #[must_use]
    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    /// Replace the renderer registry
    #[must_use]
    pub fn with_renderers(mut self, renderers: RendererRegistry) -> Self {
        self.renderers = renderers;
        self
    }

    /// Session configuration
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Layouts of the session's revision
    pub fn layouts(&self) -> &'static RevisionLayouts {
        self.layouts
    }

    /// Type registry, for adding types found in a catalog
    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    /// Renderer registry, for adding renderers
    pub fn renderers_mut(&mut self) -> &mut RendererRegistry {
        &mut self.renderers
    }

    /// Build and cache the schema of a relation
    ///
    /// # Errors
    ///
    /// Returns `Error::SchemaGap` or `Error::InvalidSchema` when the column
    /// definitions do not form a valid schema.
    pub fn register_schema<I>(&mut self, relation: &str, defs: I) -> Result<&ColumnSchema>
    where
        I: IntoIterator<Item = ColumnDef>,
    {
        let schema = ColumnSchema::build(relation, defs)?;
        let cached = self.schemas.entry(relation.to_string()).or_default();
        *cached = schema;
        Ok(cached)
    }

    /// Cached schema of a relation
    pub fn schema(&self, relation: &str) -> Option<&ColumnSchema> {
        self.schemas.get(relation)
    }

    /// Diagnostics collected so far
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diag.diagnostics()
    }

    /// Drain the collected diagnostics
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diag.take()
    }

    /// Decode every tuple of one relation
    ///
    /// Problems within a page or tuple are reported as diagnostics and the
    /// scan goes on; a tuple that cannot be decoded at all is recorded as an
    /// empty, incomplete row.
    ///
    /// # Errors
    ///
    /// Returns an error, after reporting it, when the relation has no usable
    /// schema or its storage cannot be opened. No rows are produced then.
    pub fn scan_relation(
        &mut self,
        relation: &RelationDescriptor,
        provider: &dyn RelationProvider,
    ) -> Result<Vec<DecodedRow>> {
        let timer = Timer::start(format!("scan of {}", relation.name));
        let depth = self.diag.depth();
        self.diag.push(Scope::Table, &relation.name);

        let result = self.scan_table(relation, provider);

        self.diag.unwind_to(depth);
        let elapsed = timer.stop();
        match &result {
            Ok(rows) => sift_info!(
                "{}: {} rows in {:?}",
                relation.name,
                rows.len(),
                elapsed
            ),
            Err(e) => sift_error!("{}: scan abandoned: {e}", relation.name),
        }
        result
    }

    /// Scan several relations; a failed relation yields no rows and does not
    /// stop the others
    pub fn scan_all(
        &mut self,
        relations: &[RelationDescriptor],
        provider: &dyn RelationProvider,
    ) -> Vec<RelationScan> {
        relations
            .iter()
            .map(|relation| match self.scan_relation(relation, provider) {
                Ok(rows) => RelationScan {
                    relation: relation.name.clone(),
                    rows,
                    error: None,
                },
                Err(error) => RelationScan {
                    relation: relation.name.clone(),
                    rows: Vec::new(),
                    error: Some(error),
                },
            })
            .collect()
    }

    fn resolve_schema(&mut self, relation: &RelationDescriptor) -> Result<ColumnSchema> {
        if relation.columns.is_empty() {
            return self.schemas.get(&relation.name).cloned().ok_or_else(|| {
                Error::invalid_schema(&relation.name, "no column definitions")
            });
        }
        self.register_schema(&relation.name, relation.columns.iter().cloned())
            .cloned()
    }

    fn open_chunks(
        &mut self,
        relation: &RelationDescriptor,
        provider: &dyn RelationProvider,
    ) -> Option<ExternalStore> {
        let file_node = relation.toast_file_node?;
        match provider.open(file_node, self.config.block_size) {
            Ok(chunks) => Some(ExternalStore::open(
                chunks,
                self.layouts,
                self.config.missing_external_placeholder.clone(),
                &mut self.diag,
            )),
            Err(e) => {
                sift_warn!(
                    "{}: chunk relation unavailable, external values will be placeholders: {e}",
                    relation.name
                );
                None
            }
        }
    }

    fn scan_table(
        &mut self,
        relation: &RelationDescriptor,
        provider: &dyn RelationProvider,
    ) -> Result<Vec<DecodedRow>> {
        let schema = match self.resolve_schema(relation) {
            Ok(schema) => schema,
            Err(e) => {
                let kind = if e.is_schema_gap() {
                    DiagnosticKind::SchemaGap
                } else {
                    DiagnosticKind::InvariantViolation
                };
                self.diag.report(kind, e.to_string());
                return Err(e);
            }
        };

        let storage = provider.open(relation.file_node, self.config.block_size)?;
        let store = self.open_chunks(relation, provider);
        sift_debug!(
            "{}: {} blocks, {} columns",
            relation.name,
            storage.block_count(),
            schema.len()
        );

        let ctx = DecodeContext::typed(&self.types, &self.renderers)
            .with_external(store.as_ref())
            .with_placeholder(&self.config.missing_external_placeholder);

        let mut rows = Vec::new();
        for (block, bytes) in storage.blocks() {
            self.diag.push(Scope::Page, block);
            scan_block(
                block,
                bytes,
                self.layouts,
                storage.block_size(),
                &schema,
                &ctx,
                &mut self.diag,
                &mut rows,
            );
            self.diag.pop();
        }
        report_partial_block(&storage, &mut self.diag);

        Ok(rows)
    }
}

#[allow(clippy::too_many_arguments)]
fn scan_block(
    block: BlockNumber,
    bytes: &[u8],
    layouts: &RevisionLayouts,
    block_size: usize,
    schema: &ColumnSchema,
    ctx: &DecodeContext<'_>,
    diag: &mut DiagnosticContext,
    rows: &mut Vec<DecodedRow>,
) {
    let page = match scan_page(bytes, layouts, block_size) {
        Ok(page) => page,
        Err(PageError::Uninitialized) => {
            sift_debug!("{}: skipping uninitialized page", diag.location());
            return;
        }
        Err(e @ PageError::Structural(_)) => {
            diag.report(DiagnosticKind::StructuralMismatch, e.to_string());
            return;
        }
        Err(e @ PageError::Invariant(_)) => {
            diag.report(DiagnosticKind::InvariantViolation, e.to_string());
            return;
        }
    };

    for violation in &page.rejected {
        diag.report(DiagnosticKind::InvariantViolation, violation.to_string());
    }

    for slot in &page.slots {
        diag.push(Scope::Tuple, slot.index);
        let Some(tuple_bytes) = ScannedPage::tuple_bytes(bytes, slot) else {
            diag.report(
                DiagnosticKind::BoundsViolation,
                format!(
                    "slot {} extends past the end of the page ({} + {})",
                    slot.index, slot.offset, slot.length
                ),
            );
            diag.pop();
            continue;
        };

        match decode_tuple(tuple_bytes, layouts, schema, ctx, diag) {
            Ok(tuple) => rows.push(DecodedRow::from_tuple(block, slot.index, tuple)),
            Err(e) => {
                diag.truncate_to(Scope::Tuple);
                diag.report(DiagnosticKind::DecodeException, e.to_string());
                rows.push(DecodedRow::failed(block, slot.index));
            }
        }
        diag.pop();
    }
}

fn report_partial_block(storage: &Relation, diag: &mut DiagnosticContext) {
    let trailing = storage.trailing_bytes();
    if trailing > 0 {
        diag.report(
            DiagnosticKind::StructuralMismatch,
            format!("relation ends with a partial block of {trailing} bytes"),
        );
    }
}
