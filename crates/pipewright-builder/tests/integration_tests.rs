//! End-to-end tests for pipeline graph construction
//!
//! These tests drive the graph through its public API only, the way an
//! editor front end would: add sources and stages, bind columns, observe
//! the change notifications and compile the result into a job.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p pipewright-builder --test integration_tests
//! ```

use pipewright_builder::{EventLog, PipelineGraph};
use pipewright_builder::listener::ComponentListener;
use pipewright_catalog::{builtin, InMemoryCatalog};
use pipewright_core::{
    BuilderConfig, BuilderError, ComponentId, ConfigError, DiagnosticCode, ListenerError, LogicalType, Outcome,
    Requirement, StageKind, Table, TableColumn, TableIdentifier, TypeFamily,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// =============================================================================
// Helper Functions
// =============================================================================

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new().with_table(
        Table::new(TableIdentifier::new("crm", "contacts"))
            .with_column(TableColumn::new("id", LogicalType::Int))
            .with_column(TableColumn::new("email", LogicalType::String))
            .with_column(TableColumn::new("phone", LogicalType::String))
            .with_column(TableColumn::new("age", LogicalType::Int)),
    )
}

fn graph() -> PipelineGraph {
    PipelineGraph::new(Arc::new(catalog()))
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn outputs(graph: &PipelineGraph, component: ComponentId) -> Vec<String> {
    graph
        .component(component)
        .unwrap()
        .output_columns()
        .iter()
        .filter_map(|id| graph.column_name(*id))
        .map(str::to_string)
        .collect()
}

/// Listener that rejects every notification it receives
struct Rejecting;

impl ComponentListener for Rejecting {
    fn on_add(&self, _graph: &PipelineGraph, _component: ComponentId) -> Result<(), ListenerError> {
        Err("model out of sync".into())
    }
}

// =============================================================================
// Column visibility and removal cascades
// =============================================================================

#[test]
fn test_chained_transformers_and_removal_cascade() {
    let mut graph = graph();
    let root = graph.root();
    let email = graph.add_source_column(root, "crm.contacts.email").unwrap();

    let length = graph.add_transformer(root, builtin::string_length()).unwrap();
    graph.bind(length, "columns", vec![email.into()]).unwrap();
    assert_eq!(outputs(&graph, length), vec!["email length"]);
    let length_out = graph.component(length).unwrap().output_columns()[0];

    let concat = graph.add_transformer(root, builtin::concatenator()).unwrap();
    graph.bind(concat, "columns", vec![length_out.into()]).unwrap();
    assert_eq!(outputs(&graph, concat), vec!["Concat of email length"]);

    // The downstream output is not visible to the upstream stage
    let concat_out = graph.component(concat).unwrap().output_columns()[0];
    let available = graph.available_input_columns(length, None).unwrap();
    assert_eq!(available, vec![email]);
    assert!(!available.contains(&concat_out));
    let err = graph.add_input_column(length, concat_out.into()).unwrap_err();
    assert!(matches!(err, BuilderError::ColumnNotAvailable { .. }));

    assert_eq!(graph.execution_order(root).unwrap(), vec![length, concat]);

    let log = EventLog::new();
    graph.add_component_listener(root, StageKind::Transformer, log.clone()).unwrap();
    graph.add_output_column_listener(root, log.clone()).unwrap();

    graph.remove_transformer(length).unwrap();

    assert!(graph.column(length_out).is_none());
    assert!(graph.column(concat_out).is_none());
    assert!(graph.component(concat).unwrap().input_columns().is_empty());
    assert!(!graph.is_configured(concat, false).unwrap());
    assert_eq!(
        log.names(),
        vec![
            "output_columns_changed",
            "component_changed",
            "output_columns_changed",
            "component_removed",
        ]
    );
    let events = log.events();
    assert_eq!(events[0].subject, "[Concat of email length] -> []");
    assert_eq!(events[2].subject, "[email length] -> []");
    assert_eq!(events[3].subject, "String length");
}

#[test]
fn test_renamed_output_feeds_second_transformer() {
    let mut graph = PipelineGraph::new(Arc::new(InMemoryCatalog::new().with_table(
        Table::new(TableIdentifier::new("raw", "events")).with_column(TableColumn::new("foo", LogicalType::String)),
    )));
    let root = graph.root();
    let foo = graph.add_source_column(root, "raw.events.foo").unwrap();

    let t1 = graph.add_transformer(root, builtin::string_length()).unwrap();
    graph.bind(t1, "columns", vec![foo.into()]).unwrap();
    let out1 = graph.component(t1).unwrap().output_columns()[0];
    graph.rename_column(out1, "out1").unwrap();

    let t2 = graph.add_transformer(root, builtin::concatenator()).unwrap();
    graph.bind(t2, "columns", vec![out1.into()]).unwrap();
    let t2_out = graph.component(t2).unwrap().output_columns()[0];
    assert_eq!(graph.column_name(t2_out), Some("Concat of out1"));

    let visible = graph.available_input_columns(t2, None).unwrap();
    assert_eq!(visible, vec![foo, out1]);
    assert!(!visible.contains(&t2_out));
    assert_eq!(graph.available_input_columns(t1, None).unwrap(), vec![foo]);

    graph.remove_transformer(t1).unwrap();
    let t2_builder = graph.component(t2).unwrap();
    assert!(t2_builder.input_columns().is_empty());
    assert!(t2_builder.output_columns().is_empty());
    assert!(!graph.is_configured(t2, false).unwrap());
    assert!(matches!(
        graph.is_configured(t2, true),
        Err(BuilderError::UnconfiguredProperty { property, .. }) if property == "columns"
    ));
    assert_eq!(graph.transformers(root).unwrap(), vec![t2]);
}

#[test]
fn test_config_without_counter_placeholder_is_rejected() {
    let mut config = BuilderConfig::default();
    config.naming.collision_suffix = "-copy".to_string();

    let result = PipelineGraph::with_config(Arc::new(catalog()), config);
    assert!(matches!(result, Err(ConfigError::InvalidValue(_))));

    let mut config = BuilderConfig::default();
    config.naming.collision_suffix = "_{n}".to_string();
    let mut graph = PipelineGraph::with_config(Arc::new(catalog()), config).unwrap();
    let root = graph.root();
    let email = graph.add_source_column(root, "crm.contacts.email").unwrap();
    for _ in 0..2 {
        let length = graph.add_transformer(root, builtin::string_length()).unwrap();
        graph.bind(length, "columns", vec![email.into()]).unwrap();
    }
    let names: Vec<String> = graph
        .transformers(root)
        .unwrap()
        .into_iter()
        .flat_map(|t| outputs(&graph, t))
        .collect();
    assert_eq!(names, vec!["email length", "email length_1"]);
}

#[test]
fn test_source_columns_come_from_one_table() {
    let mut graph = PipelineGraph::new(Arc::new(
        catalog().with_table(
            Table::new(TableIdentifier::new("crm", "orders"))
                .with_column(TableColumn::new("total", LogicalType::Float)),
        ),
    ));
    let root = graph.root();

    let ids = graph.add_source_columns(root, &["crm.contacts.email", "phone"]).unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(graph.scope(root).unwrap().table(), Some(&TableIdentifier::new("crm", "contacts")));

    let err = graph.add_source_column(root, "crm.orders.total").unwrap_err();
    assert!(matches!(err, BuilderError::ForeignTable { .. }));

    // Adding the same column twice hands back the existing id
    assert_eq!(graph.add_source_column(root, "email").unwrap(), ids[0]);

    for id in ids {
        graph.remove_source_column(root, id).unwrap();
    }
    assert_eq!(graph.scope(root).unwrap().table(), None);
    graph.add_source_column(root, "crm.orders.total").unwrap();
}

// =============================================================================
// Requirements
// =============================================================================

#[test]
fn test_cyclic_requirement_is_rejected() {
    let mut graph = graph();
    let root = graph.root();
    let email = graph.add_source_column(root, "crm.contacts.email").unwrap();

    let first = graph.add_filter(root, builtin::null_check()).unwrap();
    let second = graph.add_filter(root, builtin::null_check()).unwrap();
    graph.bind(first, "columns", vec![email.into()]).unwrap();
    graph.bind(second, "columns", vec![email.into()]).unwrap();

    graph
        .set_requirement(second, Some(Requirement::outcome(first, "NOT_NULL")))
        .unwrap();

    let err = graph
        .set_requirement(first, Some(Requirement::outcome(second, "NULL")))
        .unwrap_err();
    assert!(matches!(err, BuilderError::CyclicRequirement { .. }));
    assert_eq!(graph.component(first).unwrap().requirement(), None);

    assert_eq!(graph.available_unfiltered_components(first).unwrap(), Vec::<ComponentId>::new());
    assert_eq!(graph.available_unfiltered_components(second).unwrap(), vec![first]);
}

#[test]
fn test_default_requirement_and_filter_removal() {
    let mut graph = graph();
    let root = graph.root();
    let age = graph.add_source_column(root, "crm.contacts.age").unwrap();

    let adults = graph.add_filter(root, builtin::number_range()).unwrap();
    graph.bind(adults, "column", vec![age.into()]).unwrap();
    let counter = graph.add_analyzer(root, builtin::record_counter()).unwrap();

    let requirement = Requirement::all([Outcome::new(adults, "VALID")]);
    graph.set_default_requirement(root, Some(requirement.clone())).unwrap();
    assert_eq!(graph.effective_requirement(counter).unwrap(), Some(requirement));
    assert_eq!(graph.effective_requirement(adults).unwrap(), None);

    let log = EventLog::new();
    graph.add_component_listener(root, StageKind::Analyzer, log.clone()).unwrap();
    graph.remove_filter(adults).unwrap();

    assert_eq!(graph.scope(root).unwrap().default_requirement(), None);
    assert_eq!(graph.effective_requirement(counter).unwrap(), None);
    assert_eq!(log.names(), vec!["requirement_changed"]);
}

// =============================================================================
// Output reconciliation
// =============================================================================

#[test]
fn test_tokenizer_shape_change_recreates_outputs() {
    let mut graph = graph();
    let root = graph.root();
    let email = graph.add_source_column(root, "crm.contacts.email").unwrap();

    let tokenizer = graph.add_transformer(root, builtin::tokenizer()).unwrap();
    graph.bind(tokenizer, "column", vec![email.into()]).unwrap();
    assert!(outputs(&graph, tokenizer).is_empty());

    graph
        .set_configured_property(tokenizer, "number of tokens", json!(2))
        .unwrap();
    assert_eq!(outputs(&graph, tokenizer), vec!["email (token 1)", "email (token 2)"]);
    let before = graph.component(tokenizer).unwrap().output_columns().to_vec();

    let log = EventLog::new();
    graph.add_output_column_listener(root, log.clone()).unwrap();
    graph
        .set_configured_property(tokenizer, "number of tokens", json!(3))
        .unwrap();

    let after = graph.component(tokenizer).unwrap().output_columns().to_vec();
    assert_eq!(after.len(), 3);
    assert!(after.iter().all(|id| !before.contains(id)));
    assert_eq!(
        log.events()[0].subject,
        "[email (token 1), email (token 2)] -> [email (token 1), email (token 2), email (token 3)]"
    );

    // Unchanged configuration keeps the same columns and stays silent
    log.clear();
    graph
        .set_configured_property(tokenizer, "number of tokens", json!(3))
        .unwrap();
    assert_eq!(graph.component(tokenizer).unwrap().output_columns(), after.as_slice());
    assert!(log.events().is_empty());
}

// =============================================================================
// Listener failures
// =============================================================================

#[test]
fn test_failing_listener_reports_after_mutation() {
    let mut graph = graph();
    let root = graph.root();
    let listener: Arc<dyn ComponentListener> = Arc::new(Rejecting);
    graph
        .add_component_listener(root, StageKind::Transformer, Arc::clone(&listener))
        .unwrap();

    let err = graph.add_transformer(root, builtin::concatenator()).unwrap_err();
    assert!(matches!(err, BuilderError::Listener { event: "component_added", .. }));
    assert_eq!(graph.transformers(root).unwrap().len(), 1);

    assert!(graph
        .remove_component_listener(root, StageKind::Transformer, &listener)
        .unwrap());
    graph.add_transformer(root, builtin::concatenator()).unwrap();
    assert_eq!(graph.transformers(root).unwrap().len(), 2);
}

// =============================================================================
// Nested scopes
// =============================================================================

#[test]
fn test_output_streams_compile_into_nested_jobs() {
    let mut graph = graph();
    let root = graph.root();
    let email = graph.add_source_column(root, "crm.contacts.email").unwrap();
    let age = graph.add_source_column(root, "age").unwrap();

    let structure = EventLog::new();
    graph.add_structure_listener(root, structure.clone()).unwrap();

    let splitter = graph.add_transformer(root, builtin::conditional_splitter()).unwrap();
    assert_eq!(structure.names(), vec!["scope_activated", "scope_activated"]);
    graph.bind(splitter, "columns", vec![email.into(), age.into()]).unwrap();
    graph
        .set_configured_property(splitter, "condition", json!("age >= 18"))
        .unwrap();
    graph.add_analyzer(root, builtin::record_counter()).unwrap();

    let matches = graph.output_stream(splitter, "matches").unwrap();
    assert_eq!(graph.parent_of(matches).unwrap(), Some(root));
    assert_eq!(graph.root_of(matches).unwrap(), root);
    assert_eq!(graph.scope_path(matches), "root/Conditional splitter/matches");

    let err = graph.add_source_column(matches, "crm.contacts.phone").unwrap_err();
    assert!(matches!(err, BuilderError::StreamScope(scope) if scope == matches));

    let projected = graph.scope(matches).unwrap().source_columns().to_vec();
    let distribution = graph.add_analyzer(matches, builtin::value_distribution()).unwrap();
    graph.bind(distribution, "columns", vec![projected[0].into()]).unwrap();

    let job = graph.to_job().unwrap();
    let split = &job.transformers()[0];
    let nested = split.output_stream("matches").unwrap();
    assert_eq!(nested.source_columns().count(), 2);
    assert_eq!(nested.analyzers().len(), 1);
    assert!(split.output_stream("others").is_none());
    assert_eq!(job.stage_count(), 3);

    structure.clear();
    graph.remove_transformer(splitter).unwrap();
    assert_eq!(structure.names(), vec!["scope_deactivated", "scope_deactivated"]);
    assert!(graph.scope(matches).is_err());
    assert!(graph.component(distribution).is_err());

    // Closing a scope twice is harmless
    graph.close(matches).unwrap();
}

// =============================================================================
// Job compilation
// =============================================================================

fn contact_profile(warm_up: bool) -> PipelineGraph {
    let mut graph = graph();
    let root = graph.root();

    if warm_up {
        // Burn a few ids so both graphs differ in identity only
        let scratch = graph.add_transformer(root, builtin::concatenator()).unwrap();
        graph.remove_transformer(scratch).unwrap();
    }

    let email = graph.add_source_column(root, "crm.contacts.email").unwrap();
    let (length, distribution) = if warm_up {
        let distribution = graph.add_analyzer(root, builtin::value_distribution()).unwrap();
        let length = graph.add_transformer(root, builtin::string_length()).unwrap();
        (length, distribution)
    } else {
        let length = graph.add_transformer(root, builtin::string_length()).unwrap();
        let distribution = graph.add_analyzer(root, builtin::value_distribution()).unwrap();
        (length, distribution)
    };

    graph.bind(length, "columns", vec![email.into()]).unwrap();
    let length_out = graph.component(length).unwrap().output_columns()[0];
    graph.set_configured_property(distribution, "top n", json!(10)).unwrap();
    graph.bind(distribution, "columns", vec![length_out.into()]).unwrap();
    graph
}

#[test]
fn test_equivalent_graphs_compile_to_equal_jobs() {
    let first = contact_profile(false);
    let second = contact_profile(true);

    let a = first.to_job().unwrap();
    let b = second.to_job().unwrap();
    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
    assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

    let column = a.column(1).unwrap();
    assert_eq!(column.name, "email length");
    assert_eq!(column.family, TypeFamily::Number);
}

#[test]
fn test_validation_report_lists_every_problem() {
    let mut graph = graph();
    let root = graph.root();
    graph.add_source_column(root, "crm.contacts.age").unwrap();
    let range = graph.add_filter(root, builtin::number_range()).unwrap();
    graph.set_configured_property(range, "lowest value", json!(18)).unwrap();

    let report = graph.validate();
    let codes: Vec<DiagnosticCode> = report.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(
        codes,
        vec![
            DiagnosticCode::NoAnalyzers,
            DiagnosticCode::UnconfiguredProperty,
            DiagnosticCode::UnconfiguredProperty,
        ]
    );
    assert_eq!(report.summary.stages_checked, 1);
    assert!(report.fingerprint.is_none());

    let location = report.diagnostics[1].location.as_ref().unwrap();
    assert_eq!(location.stage.as_deref(), Some("Number range"));
    assert_eq!(location.property.as_deref(), Some("column"));
}
