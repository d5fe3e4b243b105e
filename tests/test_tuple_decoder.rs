//! Tests for tuple decoding against column schemas

use pretty_assertions::assert_eq;
use tuplesift::common::test_utils::{
    compressed_varlena, literal_stream, long_varlena, short_varlena, TupleBuilder,
};
use tuplesift::diagnostics::DiagnosticContext;
use tuplesift::format::FormatRevision;
use tuplesift::tuple::{decode_tuple, DecodeContext, RendererRegistry};
use tuplesift::{ColumnDef, ColumnSchema, DiagnosticKind, Scope, TypeRegistry, Value};

fn schema(defs: Vec<ColumnDef>) -> ColumnSchema {
    ColumnSchema::build("t", defs).expect("valid schema")
}

fn int4(number: i16, name: &str) -> ColumnDef {
    ColumnDef::new(number, name, 23, 4, 4)
}

fn text(number: i16, name: &str) -> ColumnDef {
    ColumnDef::new(number, name, 25, -1, 4)
}

#[test]
fn test_mixed_fixed_width_columns() {
    let layouts = FormatRevision::V80.layouts();
    let schema = schema(vec![
        ColumnDef::new(1, "flag", 16, 1, 1),
        ColumnDef::new(2, "small", 21, 2, 2),
        int4(3, "count"),
        ColumnDef::new(4, "ratio", 701, 8, 4),
        ColumnDef::new(5, "kind", 18, 1, 1),
        ColumnDef::new(6, "label", 19, 64, 1),
    ]);
    let mut label = b"relname".to_vec();
    label.resize(64, 0);
    let bytes = TupleBuilder::new(layouts, 6)
        .data(&[1])
        .data_aligned(2, &(-7i16).to_le_bytes())
        .data_aligned(4, &123_456i32.to_le_bytes())
        .data_aligned(4, &2.5f64.to_le_bytes())
        .data(b"x")
        .data(&label)
        .build();

    let types = TypeRegistry::builtin();
    let renderers = RendererRegistry::builtin();
    let mut diag = DiagnosticContext::default();
    let tuple = decode_tuple(
        &bytes,
        layouts,
        &schema,
        &DecodeContext::typed(&types, &renderers),
        &mut diag,
    )
    .unwrap();

    assert_eq!(
        tuple.values,
        vec![
            ("flag".to_string(), Value::Bool(true)),
            ("small".to_string(), Value::Int(-7)),
            ("count".to_string(), Value::Int(123_456)),
            ("ratio".to_string(), Value::Float(2.5)),
            ("kind".to_string(), Value::Text("x".to_string())),
            ("label".to_string(), Value::Text("relname".to_string())),
        ]
    );
    assert!(tuple.complete);
    assert!(diag.diagnostics().is_empty());
}

#[test]
fn test_oid_placement_by_revision() {
    let schema = schema(vec![int4(1, "n")]);
    let types = TypeRegistry::builtin();
    let renderers = RendererRegistry::builtin();
    let ctx = DecodeContext::typed(&types, &renderers);

    for revision in [FormatRevision::V65, FormatRevision::V73, FormatRevision::V83] {
        let layouts = revision.layouts();
        let bytes = TupleBuilder::new(layouts, 1)
            .oid(555)
            .data_aligned(4, &9i32.to_le_bytes())
            .build();

        let mut diag = DiagnosticContext::default();
        let tuple = decode_tuple(&bytes, layouts, &schema, &ctx, &mut diag).unwrap();
        assert_eq!(tuple.oid, Some(555), "revision {revision}");
        assert_eq!(tuple.get("n"), Some(&Value::Int(9)), "revision {revision}");
        assert!(diag.diagnostics().is_empty(), "revision {revision}");
    }
}

#[test]
fn test_short_tuple_pads_with_nulls() {
    let layouts = FormatRevision::V80.layouts();
    let schema = schema(vec![int4(1, "a"), int4(2, "b"), text(3, "c")]);
    let bytes = TupleBuilder::new(layouts, 1).data(&1i32.to_le_bytes()).build();

    let types = TypeRegistry::builtin();
    let renderers = RendererRegistry::builtin();
    let mut diag = DiagnosticContext::default();
    let tuple = decode_tuple(
        &bytes,
        layouts,
        &schema,
        &DecodeContext::typed(&types, &renderers),
        &mut diag,
    )
    .unwrap();

    let values: Vec<&Value> = tuple.values.iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![&Value::Int(1), &Value::Null, &Value::Null]);
    assert!(tuple.complete);
}

#[test]
fn test_defaults_without_renderers() {
    let layouts = FormatRevision::V80.layouts();
    let schema = schema(vec![int4(1, "n"), text(2, "s")]);
    let bytes = TupleBuilder::new(layouts, 2)
        .data(&5i32.to_le_bytes())
        .data(&short_varlena(b"hi"))
        .build();

    let types = TypeRegistry::builtin();
    let renderers = RendererRegistry::new();
    let mut diag = DiagnosticContext::default();
    let tuple = decode_tuple(
        &bytes,
        layouts,
        &schema,
        &DecodeContext::typed(&types, &renderers),
        &mut diag,
    )
    .unwrap();

    assert_eq!(tuple.get("n"), Some(&Value::Int(5)));
    assert_eq!(tuple.get("s"), Some(&Value::Bytes(b"hi".to_vec())));
    let locations: Vec<&str> = diag
        .diagnostics()
        .iter()
        .map(|d| d.location.as_str())
        .collect();
    assert_eq!(locations, vec!["column n", "column s"]);
    assert_eq!(diag.count(DiagnosticKind::UnknownType), 2);
}

#[test]
fn test_unregistered_types_are_reported_per_column() {
    let layouts = FormatRevision::V80.layouts();
    let schema = schema(vec![int4(1, "a"), int4(2, "b")]);
    let bytes = TupleBuilder::new(layouts, 2)
        .data(&[3i32.to_le_bytes(), 4i32.to_le_bytes()].concat())
        .build();

    let types = TypeRegistry::new();
    let renderers = RendererRegistry::builtin();
    let mut diag = DiagnosticContext::default();
    diag.push(Scope::Table, "t");
    let tuple = decode_tuple(
        &bytes,
        layouts,
        &schema,
        &DecodeContext::typed(&types, &renderers),
        &mut diag,
    )
    .unwrap();

    assert_eq!(tuple.get("b"), Some(&Value::Int(4)));
    let locations: Vec<&str> = diag
        .diagnostics()
        .iter()
        .map(|d| d.location.as_str())
        .collect();
    assert_eq!(locations, vec!["table t : column a", "table t : column b"]);
    assert_eq!(diag.count(DiagnosticKind::UnknownType), 2);
    assert_eq!(diag.depth(), 1);
}

#[test]
fn test_raw_mode_keeps_varlena_bytes() {
    let layouts = FormatRevision::V80.layouts();
    let schema = schema(vec![int4(1, "id"), ColumnDef::new(2, "data", 17, -1, 4)]);
    let bytes = TupleBuilder::new(layouts, 2)
        .data(&7i32.to_le_bytes())
        .data(&long_varlena(b"payload"))
        .build();

    let mut diag = DiagnosticContext::default();
    let tuple = decode_tuple(&bytes, layouts, &schema, &DecodeContext::raw(), &mut diag).unwrap();

    assert_eq!(tuple.get("id"), Some(&Value::Int(7)));
    assert_eq!(tuple.get("data"), Some(&Value::Bytes(b"payload".to_vec())));
}

#[test]
fn test_compressed_inline_value() {
    let layouts = FormatRevision::V80.layouts();
    let schema = schema(vec![text(1, "body")]);
    let bytes = TupleBuilder::new(layouts, 1)
        .data(&compressed_varlena(5, &literal_stream(b"hello")))
        .build();

    let types = TypeRegistry::builtin();
    let renderers = RendererRegistry::builtin();
    let mut diag = DiagnosticContext::default();
    let tuple = decode_tuple(
        &bytes,
        layouts,
        &schema,
        &DecodeContext::typed(&types, &renderers),
        &mut diag,
    )
    .unwrap();

    assert_eq!(tuple.get("body"), Some(&Value::Text("hello".to_string())));
    assert!(diag.diagnostics().is_empty());
}

#[test]
fn test_corrupt_compressed_value_is_reported() {
    let layouts = FormatRevision::V80.layouts();
    let schema = schema(vec![text(1, "body"), int4(2, "n")]);
    // Back-reference before any output
    let bytes = TupleBuilder::new(layouts, 2)
        .data(&compressed_varlena(10, &[0b1, 0x00, 0x05]))
        .data_aligned(4, &8i32.to_le_bytes())
        .build();

    let types = TypeRegistry::builtin();
    let renderers = RendererRegistry::builtin();
    let mut diag = DiagnosticContext::default();
    let tuple = decode_tuple(
        &bytes,
        layouts,
        &schema,
        &DecodeContext::typed(&types, &renderers),
        &mut diag,
    )
    .unwrap();

    assert_eq!(tuple.get("body"), Some(&Value::Text(String::new())));
    assert_eq!(tuple.get("n"), Some(&Value::Int(8)));
    assert!(tuple.complete);
    assert_eq!(diag.count(DiagnosticKind::BoundsViolation), 1);
}

#[test]
fn test_varlena_overrun_aborts_remaining_columns() {
    let layouts = FormatRevision::V80.layouts();
    let schema = schema(vec![int4(1, "a"), text(2, "b"), int4(3, "c")]);
    let mut overrun = (1000u32 << 2).to_le_bytes().to_vec();
    overrun.extend_from_slice(&[0u8; 6]);
    let bytes = TupleBuilder::new(layouts, 3)
        .data(&1i32.to_le_bytes())
        .data(&overrun)
        .build();

    let types = TypeRegistry::builtin();
    let renderers = RendererRegistry::builtin();
    let mut diag = DiagnosticContext::default();
    let tuple = decode_tuple(
        &bytes,
        layouts,
        &schema,
        &DecodeContext::typed(&types, &renderers),
        &mut diag,
    )
    .unwrap();

    assert_eq!(tuple.get("a"), Some(&Value::Int(1)));
    assert_eq!(tuple.get("b"), Some(&Value::Null));
    assert_eq!(tuple.get("c"), Some(&Value::Null));
    assert!(!tuple.complete);
    assert_eq!(diag.count(DiagnosticKind::BoundsViolation), 1);
}
