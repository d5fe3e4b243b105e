//! Column schemas from the attribute catalog
//!
//! The attribute catalog is itself a heap relation. Its own layout is known
//! per revision ([`attribute_schema`]); the rows it yields are folded into
//! the column definitions of user relations ([`fold_attribute_rows`]).

use crate::common::{Error, Result};
use crate::config::DecoderConfig;
use crate::format::revision::FormatRevision;
use crate::session::DecodedRow;
use crate::sift_warn;
use crate::tuple::schema::{ColumnDef, ColumnSchema, TypeRegistry};
use crate::tuple::value::Value;

/// Schema of the attribute catalog for a revision
pub fn attribute_schema(revision: FormatRevision) -> ColumnSchema {
    let columns = revision
        .layouts()
        .attribute_catalog
        .iter()
        .zip(1i16..)
        .map(|(c, number)| ColumnDef::new(number, c.name, c.type_id, c.length, c.align))
        .collect();
    ColumnSchema::from_columns(columns)
}

/// Alignment in bytes for a catalog alignment code
///
/// # Errors
///
/// Returns `Error::InvalidConfig` for codes other than `c`, `s`, `i`, `d`.
pub fn alignment_for(code: char, config: &DecoderConfig) -> Result<usize> {
    match code {
        'c' => Ok(1),
        's' => Ok(2),
        'i' => Ok(4),
        'd' => Ok(config.double_align),
        other => Err(Error::invalid_config(format!(
            "unknown alignment code {other:?}"
        ))),
    }
}

fn int_field(row: &DecodedRow, name: &str) -> Option<i64> {
    row.get(name).and_then(Value::as_int)
}

fn char_field(row: &DecodedRow, name: &str) -> Option<char> {
    match row.get(name)? {
        Value::Text(s) => s.chars().next(),
        Value::Int(v) => u8::try_from(*v).ok().map(char::from),
        _ => None,
    }
}

fn text_field(row: &DecodedRow, name: &str) -> Option<String> {
    match row.get(name)? {
        Value::Text(s) => Some(s.clone()),
        Value::Bytes(b) => {
            let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
            Some(String::from_utf8_lossy(&b[..end]).into_owned())
        }
        _ => None,
    }
}

/// Extract the column definitions of relation `relid` from attribute rows
///
/// Rows of other relations are ignored. Rows that cannot be read are logged
/// and skipped, so a damaged catalog surfaces as a schema gap once the result
/// is built into a [`ColumnSchema`].
///
/// # Errors
///
/// Returns `Error::InvalidSchema` when a row of `relid` carries an unknown
/// alignment code.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn fold_attribute_rows(
    rows: &[DecodedRow],
    relid: u32,
    config: &DecoderConfig,
) -> Result<Vec<ColumnDef>> {
    let mut defs = Vec::new();
    for row in rows {
        if int_field(row, "attrelid").map(|v| v as u32) != Some(relid) {
            continue;
        }
        let fields = (
            int_field(row, "attnum"),
            text_field(row, "attname"),
            int_field(row, "atttypid"),
            int_field(row, "attlen"),
            char_field(row, "attalign"),
        );
        let (Some(number), Some(name), Some(type_id), Some(length), Some(align)) = fields else {
            sift_warn!(
                "attribute row at page {} tuple {} of relation {relid} is unreadable",
                row.page,
                row.tuple
            );
            continue;
        };
        let align = alignment_for(align, config)
            .map_err(|e| Error::invalid_schema(relid.to_string(), e.to_string()))?;
        defs.push(ColumnDef::new(
            number as i16,
            name,
            type_id as u32,
            length as i16,
            align,
        ));
    }
    Ok(defs)
}

/// Register the type names found in type catalog rows
///
/// Each row contributes its oid and `typname`; rows lacking either are
/// skipped. Returns the number of types registered.
pub fn fold_type_rows(rows: &[DecodedRow], registry: &mut TypeRegistry) -> usize {
    let mut added = 0;
    for row in rows {
        if let (Some(oid), Some(name)) = (row.oid, text_field(row, "typname")) {
            registry.insert(oid, name);
            added += 1;
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_utils::{attribute_row, PageBuilder};
    use crate::session::{DecodingSession, RelationDescriptor};
    use crate::storage::relation::MemoryProvider;
    use pretty_assertions::assert_eq;

    fn row(columns: Vec<(&str, Value)>) -> DecodedRow {
        DecodedRow {
            page: 0,
            tuple: 1,
            oid: None,
            xmin: 0,
            xmax: 0,
            columns: columns
                .into_iter()
                .map(|(n, v)| (n.to_string(), v))
                .collect(),
            complete: true,
        }
    }

    fn attr(relid: i64, num: i64, name: &str, align: &str) -> DecodedRow {
        row(vec![
            ("attrelid", Value::Int(relid)),
            ("attname", Value::Text(name.to_string())),
            ("atttypid", Value::Int(23)),
            ("attlen", Value::Int(4)),
            ("attnum", Value::Int(num)),
            ("attalign", Value::Text(align.to_string())),
        ])
    }

    #[test]
    fn test_attribute_schema_per_revision() {
        let r80 = attribute_schema(FormatRevision::V80);
        assert_eq!(r80.column(1).map(|c| c.name.as_str()), Some("attrelid"));
        assert_eq!(r80.column(2).map(|c| c.length), Some(64));
        assert!(r80.position("attisset").is_none());

        let r73 = attribute_schema(FormatRevision::V73);
        assert!(r73.position("attisset").is_some());

        let r65 = attribute_schema(FormatRevision::V65);
        assert_eq!(r65.column(2).map(|c| c.length), Some(32));
    }

    #[test]
    fn test_fold_filters_relation_and_maps_alignment() {
        let config = DecoderConfig {
            double_align: 8,
            ..DecoderConfig::default()
        };
        let rows = vec![
            attr(100, 1, "id", "i"),
            attr(200, 1, "other", "i"),
            attr(100, 2, "price", "d"),
            attr(100, -2, "oid", "i"),
            attr(100, 3, "flag", "c"),
        ];

        let defs = fold_attribute_rows(&rows, 100, &config).unwrap();
        let summary: Vec<(i16, &str, usize)> = defs
            .iter()
            .map(|d| (d.number, d.name.as_str(), d.align))
            .collect();
        assert_eq!(
            summary,
            vec![(1, "id", 4), (2, "price", 8), (-2, "oid", 4), (3, "flag", 1)]
        );
        assert_eq!(ColumnSchema::build("t", defs).unwrap().len(), 3);
    }

    #[test]
    fn test_fold_rejects_unknown_alignment() {
        let rows = vec![attr(1, 1, "x", "q")];
        let err = fold_attribute_rows(&rows, 1, &DecoderConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema { .. }));
    }

    #[test]
    fn test_fold_skips_unreadable_rows() {
        let mut broken = attr(1, 2, "y", "i");
        broken.columns.retain(|(n, _)| n != "atttypid");
        let rows = vec![attr(1, 1, "x", "i"), broken, attr(1, 3, "z", "i")];

        let defs = fold_attribute_rows(&rows, 1, &DecoderConfig::default()).unwrap();
        assert_eq!(defs.len(), 2);
        assert!(ColumnSchema::build("t", defs).unwrap_err().is_schema_gap());
    }

    #[test]
    fn test_fold_type_rows() {
        let mut typ = row(vec![("typname", Value::Text("money".to_string()))]);
        typ.oid = Some(790);
        let nameless = row(vec![]);

        let mut registry = TypeRegistry::new();
        assert_eq!(fold_type_rows(&[typ, nameless], &mut registry), 1);
        assert_eq!(registry.name(790), Some("money"));
    }

    #[test]
    fn test_catalog_scan_round_trip() {
        let revision = FormatRevision::V80;
        let layouts = revision.layouts();
        let page = PageBuilder::new(layouts, 8192)
            .tuple(&attribute_row(layouts, 16_400, "id", 23, 4, 1, b'i'))
            .tuple(&attribute_row(layouts, 16_400, "name", 25, -1, 2, b'i'))
            .tuple(&attribute_row(layouts, 16_500, "x", 23, 4, 1, b'i'))
            .build();
        let provider = MemoryProvider::new().with(1249, page);

        let mut session = DecodingSession::new(DecoderConfig::for_revision(revision)).unwrap();
        let catalog = RelationDescriptor::new(
            "pg_attribute",
            1249,
            attribute_schema(revision).columns().to_vec(),
        );
        let rows = session.scan_relation(&catalog, &provider).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(session.diagnostics().is_empty());

        let defs = fold_attribute_rows(&rows, 16_400, session.config()).unwrap();
        assert_eq!(
            defs,
            vec![
                ColumnDef::new(1, "id", 23, 4, 4),
                ColumnDef::new(2, "name", 25, -1, 4),
            ]
        );
    }
}
