//! Tuple decoder
//!
//! Applies a [`ColumnSchema`] to the bytes of one heap tuple: header, null
//! bitmap, then each column in order with its alignment. Problems confined to
//! one column are reported through the [`DiagnosticContext`] and decoding
//! continues; problems with the tuple as a whole are returned as a
//! [`DecodeError`] for the page loop to handle.

use crate::config::{expand_placeholder, DEFAULT_MISSING_PLACEHOLDER};
use crate::diagnostics::{DiagnosticContext, DiagnosticKind, Scope};
use crate::format::record::{decode, StructuralMismatch};
use crate::format::revision::RevisionLayouts;
use crate::tuple::header::TupleHeader;
use crate::tuple::schema::{ColumnDef, ColumnSchema, TypeRegistry};
use crate::tuple::value::{FixedDefault, RendererRegistry, Value, ValueRenderer, VarlenaDefault};
use crate::varlena::decode::{decode_varlena, Varlena};
use crate::varlena::pglz;
use crate::varlena::toast::{ExternalStore, Resolved};
use std::borrow::Cow;
use thiserror::Error;

/// Slack allowed between the final cursor and the tuple end
const TRAILING_SLACK: usize = 4;

/// How column bytes become values
#[derive(Debug, Clone, Copy)]
pub enum RenderMode<'a> {
    /// Look up renderers by type name
    Typed {
        /// Type id to name mapping
        types: &'a TypeRegistry,
        /// Type name to renderer mapping
        renderers: &'a RendererRegistry,
    },
    /// Bypass renderers: fixed columns use the default rule, variable-length
    /// columns yield their payload bytes
    Raw,
}

/// Everything the decoder needs besides the tuple and its schema
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    /// Renderer selection
    pub mode: RenderMode<'a>,
    /// Chunk store for external values; `None` disables resolution
    pub external: Option<&'a ExternalStore>,
    /// Text recorded for unresolvable external values, `{id}` substituted
    pub placeholder: &'a str,
}

impl<'a> DecodeContext<'a> {
    /// Typed decoding without external resolution
    pub fn typed(types: &'a TypeRegistry, renderers: &'a RendererRegistry) -> Self {
        Self {
            mode: RenderMode::Typed { types, renderers },
            external: None,
            placeholder: DEFAULT_MISSING_PLACEHOLDER,
        }
    }

    /// Raw decoding without external resolution, as used for chunk relations
    pub fn raw() -> Self {
        Self {
            mode: RenderMode::Raw,
            external: None,
            placeholder: DEFAULT_MISSING_PLACEHOLDER,
        }
    }

    /// Resolve external values through `store`
    #[must_use]
    pub fn with_external(mut self, store: Option<&'a ExternalStore>) -> Self {
        self.external = store;
        self
    }

    /// Use a different placeholder pattern
    #[must_use]
    pub fn with_placeholder(mut self, pattern: &'a str) -> Self {
        self.placeholder = pattern;
        self
    }
}

/// Failure that prevents decoding any column of a tuple
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The tuple is shorter than its fixed header
    #[error("tuple header: {0}")]
    Structural(StructuralMismatch),
    /// The header's declared size ends inside its fixed portion
    #[error("header size {size} is smaller than the {fixed}-byte fixed header")]
    HeaderUnderrun {
        /// Declared header size
        size: usize,
        /// Bytes of the fixed portion
        fixed: usize,
    },
    /// The header's declared size runs past the tuple
    #[error("header size {size} exceeds tuple length {len}")]
    HeaderOverrun {
        /// Declared header size
        size: usize,
        /// Tuple length
        len: usize,
    },
    /// The tuple stores more attributes than the schema knows
    #[error("tuple has {natts} attributes but the schema has {columns} columns")]
    SchemaMismatch {
        /// Attributes stored in the tuple
        natts: usize,
        /// Columns in the schema
        columns: usize,
    },
}

impl DecodeError {
    /// Diagnostic category of the failure
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            DecodeError::Structural(_)
            | DecodeError::HeaderUnderrun { .. }
            | DecodeError::SchemaMismatch { .. } => {
                DiagnosticKind::StructuralMismatch
            }
            DecodeError::HeaderOverrun { .. } => DiagnosticKind::BoundsViolation,
        }
    }
}

/// One decoded tuple
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTuple {
    /// Decoded header
    pub header: TupleHeader,
    /// Oid, when the tuple carries one
    pub oid: Option<u32>,
    /// Column name and value for every schema column, in order
    pub values: Vec<(String, Value)>,
    /// False when a bounds violation cut the column loop short
    pub complete: bool,
}

impl DecodedTuple {
    /// Value of a column by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

struct NullBitmap<'a>(Option<&'a [u8]>);

impl NullBitmap<'_> {
    /// Whether the 0-based column has a stored value
    fn is_present(&self, column: usize) -> bool {
        match self.0 {
            Some(bits) => bits
                .get(column / 8)
                .map_or(true, |byte| byte & (1 << (column % 8)) != 0),
            None => true,
        }
    }
}

fn align_up(cursor: usize, align: usize) -> usize {
    (cursor + align - 1) & !(align - 1)
}

/// Decode one tuple against `schema`
///
/// # Errors
///
/// Returns a [`DecodeError`] when the header is unreadable, declares a size
/// outside `[fixed header, tuple length]`, or declares more attributes than
/// the schema has. Column-level
/// problems are reported to `diag` instead, and the affected columns come
/// back as [`Value::Null`] with `complete` cleared.
pub fn decode_tuple(
    bytes: &[u8],
    layouts: &RevisionLayouts,
    schema: &ColumnSchema,
    ctx: &DecodeContext<'_>,
    diag: &mut DiagnosticContext,
) -> Result<DecodedTuple, DecodeError> {
    let record = decode(layouts.tuple_header, bytes);
    if let Some(mismatch) = record.error() {
        return Err(DecodeError::Structural(mismatch));
    }
    let header = TupleHeader::from_record(&record, layouts);

    if header.size < header.fixed_size {
        return Err(DecodeError::HeaderUnderrun {
            size: header.size,
            fixed: header.fixed_size,
        });
    }
    if header.size > bytes.len() {
        return Err(DecodeError::HeaderOverrun {
            size: header.size,
            len: bytes.len(),
        });
    }
    let natts = usize::from(header.natts);
    if natts > schema.len() {
        return Err(DecodeError::SchemaMismatch {
            natts,
            columns: schema.len(),
        });
    }

    let bitmap = NullBitmap(header.has_nulls().then(|| {
        bytes.get(header.bitmap_range()).unwrap_or_default()
    }));

    let mut values = Vec::with_capacity(schema.len());
    let mut cursor = header.size;
    let mut complete = true;
    let mut after_short = false;

    for (i, column) in schema.columns().iter().enumerate().take(natts) {
        if !bitmap.is_present(i) {
            values.push((column.name.clone(), Value::Null));
            continue;
        }

        diag.push(Scope::Column, &column.name);
        let decoded = decode_column(bytes, cursor, after_short, column, ctx, diag);
        diag.pop();

        match decoded {
            Some(column_value) => {
                values.push((column.name.clone(), column_value.value));
                cursor = column_value.end;
                after_short = column_value.short_header;
            }
            None => {
                complete = false;
                break;
            }
        }
    }

    if complete {
        let len = bytes.len();
        if cursor > len || cursor + TRAILING_SLACK < len {
            diag.report(
                DiagnosticKind::StructuralMismatch,
                format!("columns end at byte {cursor} of a {len}-byte tuple"),
            );
        }
    }

    // Columns not stored in this tuple, or cut off by a bounds violation
    for column in &schema.columns()[values.len()..] {
        values.push((column.name.clone(), Value::Null));
    }

    Ok(DecodedTuple {
        oid: header.oid(bytes),
        header,
        values,
        complete,
    })
}

/// Cursor position after alignment for `column`
///
/// Nothing is padded after a 1-byte-header varlena. A varlena column whose
/// first byte has its low bit set is not padded either.
fn cursor_after(bytes: &[u8], cursor: usize, after_short: bool, column: &ColumnDef) -> usize {
    if after_short {
        return cursor;
    }
    match bytes.get(cursor) {
        Some(&b) if column.is_varlena() && Varlena::is_unaligned_header(b) => cursor,
        _ => align_up(cursor, column.align),
    }
}

/// A decoded column and where the next one may start
struct ColumnValue {
    value: Value,
    end: usize,
    /// Stored with a 1-byte varlena header
    short_header: bool,
}

impl ColumnValue {
    fn new(value: Value, end: usize) -> Self {
        Self {
            value,
            end,
            short_header: false,
        }
    }
}

/// Decode one present column
///
/// `None` aborts the remaining columns.
fn decode_column(
    bytes: &[u8],
    cursor: usize,
    after_short: bool,
    column: &ColumnDef,
    ctx: &DecodeContext<'_>,
    diag: &mut DiagnosticContext,
) -> Option<ColumnValue> {
    let start = cursor_after(bytes, cursor, after_short, column);
    if start >= bytes.len() {
        diag.report(
            DiagnosticKind::BoundsViolation,
            format!("column starts at byte {start} past the {}-byte tuple", bytes.len()),
        );
        return None;
    }
    let rest = &bytes[start..];
    let renderer = renderer_for(column, ctx, diag);

    if column.length > 0 {
        #[allow(clippy::cast_sign_loss)]
        let width = column.length as usize;
        let Some(field) = rest.get(..width) else {
            diag.report(
                DiagnosticKind::BoundsViolation,
                format!(
                    "{width}-byte column at byte {start} overruns the {}-byte tuple",
                    bytes.len()
                ),
            );
            return None;
        };
        let value = renderer.map_or_else(|| FixedDefault.render(field), |r| r.render(field));
        return Some(ColumnValue::new(value, start + width));
    }

    if column.is_cstring() {
        let (text, wire_len) = match rest.iter().position(|&b| b == 0) {
            Some(end) => (&rest[..end], end + 1),
            None => {
                diag.report(
                    DiagnosticKind::BoundsViolation,
                    "string column is not NUL-terminated",
                );
                (rest, rest.len())
            }
        };
        let value = match renderer {
            Some(r) => r.render(text),
            None => Value::Text(String::from_utf8_lossy(text).into_owned()),
        };
        return Some(ColumnValue::new(value, start + wire_len));
    }

    let varlena = match decode_varlena(rest) {
        Ok(v) => v,
        Err(e) => {
            diag.report(DiagnosticKind::BoundsViolation, format!("at byte {start}: {e}"));
            return None;
        }
    };
    let end = start + varlena.wire_len();
    let short_header = matches!(varlena, Varlena::Short { .. });

    let payload: Cow<'_, [u8]> = match varlena {
        Varlena::Short { payload } | Varlena::Long { payload } => Cow::Borrowed(payload),
        Varlena::Compressed { payload } => match pglz::decompress(payload) {
            Ok(out) => Cow::Owned(out),
            Err(e) => {
                diag.report(DiagnosticKind::BoundsViolation, e.to_string());
                Cow::Owned(e.partial)
            }
        },
        Varlena::External(pointer) => {
            let resolved = match ctx.external {
                Some(store) => store.resolve(&pointer, diag),
                None => {
                    diag.report(
                        DiagnosticKind::UnknownType,
                        format!("external value {} cannot be resolved here", pointer.owner_id),
                    );
                    Resolved::Placeholder(expand_placeholder(ctx.placeholder, pointer.owner_id))
                }
            };
            match resolved {
                Resolved::Value(out) => Cow::Owned(out),
                Resolved::Placeholder(text) => {
                    return Some(ColumnValue::new(Value::Text(text), end))
                }
            }
        }
    };

    let value = match (ctx.mode, renderer) {
        (RenderMode::Typed { .. }, Some(r)) => r.render(&payload),
        (RenderMode::Typed { .. }, None) => VarlenaDefault.render(&payload),
        (RenderMode::Raw, _) => Value::Bytes(payload.into_owned()),
    };
    Some(ColumnValue {
        value,
        end,
        short_header,
    })
}

/// Renderer for a column in typed mode
///
/// Type ids without a registry entry or without a renderer are reported and
/// left to the default interpretation.
fn renderer_for<'a>(
    column: &ColumnDef,
    ctx: &DecodeContext<'a>,
    diag: &mut DiagnosticContext,
) -> Option<&'a dyn ValueRenderer> {
    let RenderMode::Typed { types, renderers } = ctx.mode else {
        return None;
    };
    let Some(name) = types.name(column.type_id) else {
        diag.report(
            DiagnosticKind::UnknownType,
            format!("type id {} is not registered", column.type_id),
        );
        return None;
    };
    let renderer = renderers.get(name);
    if renderer.is_none() {
        diag.report(
            DiagnosticKind::UnknownType,
            format!("no renderer for type {name} (id {})", column.type_id),
        );
    }
    renderer
}
