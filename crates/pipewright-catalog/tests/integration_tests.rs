//! Integration tests for schema providers and the built-in stage library
//!
//! ```bash
//! cargo test -p pipewright-catalog --test integration_tests
//! ```

use pipewright_catalog::{
    builtin, ColumnPath, DescriptorProvider, InMemoryCatalog, InputInfo, LookupError, OutputContext, SchemaProvider,
    StageDescriptor,
};
use pipewright_core::{LogicalType, StageKind, TableIdentifier, TypeFamily};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

const CATALOG: &str = r#"{
    "name": "warehouse",
    "tables": [
        {
            "schema": "crm",
            "table": "contacts",
            "columns": [
                { "name": "id", "logical_type": { "type": "int" }, "nullable": "no" },
                { "name": "email", "logical_type": { "type": "string" } },
                { "name": "born", "logical_type": { "type": "date" } }
            ]
        },
        {
            "schema": "crm",
            "table": "visits",
            "columns": [{ "name": "contact_id", "logical_type": { "type": "int" } }]
        }
    ]
}"#;

// =============================================================================
// Schema Provider Tests
// =============================================================================

#[test]
fn test_json_catalog_resolves_columns() {
    let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
    assert_eq!(catalog.name(), "warehouse");
    assert_eq!(catalog.table_count(), 2);

    let resolved = catalog
        .resolve_column(&ColumnPath::parse("crm.contacts.born").unwrap())
        .unwrap();
    assert_eq!(resolved.table, TableIdentifier::new("crm", "contacts"));
    assert_eq!(resolved.column.logical_type, LogicalType::Date);
    assert_eq!(resolved.column.logical_type.family(), TypeFamily::Date);
    assert_eq!(resolved.path(), "crm.contacts.born");
}

#[test]
fn test_resolved_metadata_is_shared() {
    let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
    let path = ColumnPath::parse("crm.contacts.email").unwrap();

    let first = catalog.resolve_column(&path).unwrap();
    let second = catalog.resolve_column(&path).unwrap();
    assert!(Arc::ptr_eq(&first.column, &second.column));
}

#[test]
fn test_list_columns_keeps_table_order() {
    let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
    let columns = catalog.list_columns(&TableIdentifier::new("crm", "contacts")).unwrap();

    let names: Vec<&str> = columns.iter().map(|c| c.column.name.as_str()).collect();
    assert_eq!(names, vec!["id", "email", "born"]);
}

#[test]
fn test_lookup_errors() {
    let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();

    let unqualified = catalog.resolve_column(&ColumnPath::parse("email").unwrap());
    assert!(matches!(unqualified, Err(LookupError::Unqualified(_))));

    let missing_table = catalog.resolve_column(&ColumnPath::parse("crm.leads.email").unwrap());
    assert!(matches!(missing_table, Err(LookupError::TableNotFound(t)) if t == "crm.leads"));

    let missing_column = catalog.resolve_column(&ColumnPath::parse("crm.visits.email").unwrap());
    assert!(matches!(missing_column, Err(LookupError::ColumnNotFound(c)) if c == "crm.visits.email"));

    assert!(matches!(ColumnPath::parse("a.b"), Err(LookupError::InvalidPath(_))));
}

// =============================================================================
// Built-in Stage Tests
// =============================================================================

#[test]
fn test_registry_groups_by_kind() {
    let registry = builtin::registry();
    assert_eq!(registry.len(), 9);

    let filters: Vec<String> = registry
        .descriptors_of(StageKind::Filter)
        .iter()
        .map(|d| d.name().to_string())
        .collect();
    assert_eq!(filters, vec!["Equals", "Null check", "Number range"]);
    assert_eq!(registry.descriptors_of(StageKind::Analyzer).len(), 2);
}

#[test]
fn test_filters_produce_no_columns() {
    let range = builtin::number_range();
    let ctx = OutputContext::new().with_inputs("column", vec![InputInfo::new("age", TypeFamily::Number)]);

    assert!(range.output_columns(&ctx).is_empty());
    assert_eq!(range.outcomes(), &["VALID".to_string(), "INVALID".to_string()]);
}

#[test]
fn test_tokenizer_columns_follow_token_count() {
    let tokenizer = builtin::tokenizer();
    let ctx = OutputContext::new()
        .with_inputs("column", vec![InputInfo::new("email", TypeFamily::String)])
        .with_property("number of tokens", json!(2));

    let names: Vec<String> = tokenizer.output_columns(&ctx).into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["email (token 1)", "email (token 2)"]);
    assert!(tokenizer.slot("number of tokens").is_some_and(|s| s.affects_output));
}

#[test]
fn test_splitter_streams_pass_inputs_through() {
    let splitter = builtin::conditional_splitter();
    let ctx = OutputContext::new().with_inputs(
        "columns",
        vec![
            InputInfo::new("email", TypeFamily::String),
            InputInfo::new("born", TypeFamily::Date),
        ],
    );

    assert!(splitter.output_columns(&ctx).is_empty());
    let matches = splitter.stream_columns("matches", &ctx);
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[1].family, TypeFamily::Date);
    assert!(splitter.stream_columns("missing", &ctx).is_empty());
}
