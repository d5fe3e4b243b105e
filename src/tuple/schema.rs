//! Column schemas and the type registry

use crate::common::{Error, Result};
use std::collections::HashMap;

/// One column definition as folded from the attribute catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// 1-based column number
    pub number: i16,
    /// Column name
    pub name: String,
    /// Type id
    pub type_id: u32,
    /// Declared length: positive fixed width, `-1` varlena, `-2` C string
    pub length: i16,
    /// Alignment in bytes
    pub align: usize,
}

impl ColumnDef {
    /// Convenience constructor
    pub fn new<S: Into<String>>(number: i16, name: S, type_id: u32, length: i16, align: usize) -> Self {
        Self {
            number,
            name: name.into(),
            type_id,
            length,
            align,
        }
    }

    /// True for variable-length columns
    pub fn is_varlena(&self) -> bool {
        self.length == -1
    }

    /// True for NUL-terminated columns
    pub fn is_cstring(&self) -> bool {
        self.length == -2
    }
}

/// Ordered, gap-free column list of one relation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnSchema {
    columns: Vec<ColumnDef>,
}

impl ColumnSchema {
    /// Build a schema from unordered column definitions
    ///
    /// System columns (number below 1) are dropped. The remaining numbers must
    /// form the sequence `1..=N` exactly.
    ///
    /// # Errors
    ///
    /// Returns `Error::SchemaGap` for the first missing number and
    /// `Error::InvalidSchema` for duplicated numbers, unsupported lengths or
    /// unsupported alignment.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn build<I>(relation: &str, defs: I) -> Result<Self>
    where
        I: IntoIterator<Item = ColumnDef>,
    {
        let mut columns: Vec<ColumnDef> = defs.into_iter().filter(|c| c.number >= 1).collect();
        columns.sort_by_key(|c| c.number);

        for pair in columns.windows(2) {
            if pair[0].number == pair[1].number {
                return Err(Error::invalid_schema(
                    relation,
                    format!("column {} defined twice", pair[0].number),
                ));
            }
        }
        for (i, column) in columns.iter().enumerate() {
            let expected = (i + 1) as i16;
            if column.number != expected {
                let highest = columns.last().map_or(0, |c| c.number as u16);
                return Err(Error::schema_gap(relation, expected as u16, highest));
            }
            if column.length == 0 || column.length < -2 {
                return Err(Error::invalid_schema(
                    relation,
                    format!("column {} has length {}", column.number, column.length),
                ));
            }
            if !matches!(column.align, 1 | 2 | 4 | 8) {
                return Err(Error::invalid_schema(
                    relation,
                    format!("column {} has alignment {}", column.number, column.align),
                ));
            }
        }

        Ok(Self { columns })
    }

    /// Schema from columns already numbered `1..=N` in order
    ///
    /// Used for the fixed catalog layouts, which need no validation.
    pub fn from_columns(columns: Vec<ColumnDef>) -> Self {
        debug_assert!(columns
            .iter()
            .enumerate()
            .all(|(i, c)| usize::try_from(c.number).ok() == Some(i + 1)));
        Self { columns }
    }

    /// Columns in number order
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Column by 1-based number
    pub fn column(&self, number: usize) -> Option<&ColumnDef> {
        number.checked_sub(1).and_then(|i| self.columns.get(i))
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the schema has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column by name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Type id to type name mapping
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeRegistry {
    names: HashMap<u32, String>,
}

/// Stable ids of the built-in scalar types
pub const BUILTIN_TYPES: &[(u32, &str)] = &[
    (16, "bool"),
    (17, "bytea"),
    (18, "char"),
    (19, "name"),
    (20, "int8"),
    (21, "int2"),
    (23, "int4"),
    (24, "regproc"),
    (25, "text"),
    (26, "oid"),
    (27, "tid"),
    (28, "xid"),
    (29, "cid"),
    (700, "float4"),
    (701, "float8"),
    (1042, "bpchar"),
    (1043, "varchar"),
    (2275, "cstring"),
];

impl TypeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with [`BUILTIN_TYPES`]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (id, name) in BUILTIN_TYPES {
            registry.insert(*id, *name);
        }
        registry
    }

    /// Register or replace a type name
    pub fn insert<S: Into<String>>(&mut self, type_id: u32, name: S) {
        self.names.insert(type_id, name.into());
    }

    /// Name of a type id
    pub fn name(&self, type_id: u32) -> Option<&str> {
        self.names.get(&type_id).map(String::as_str)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when no type is registered
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
