//! Built-in stage library
//!
//! A small set of commonly used stages, available to the CLI and to tests
//! without an external descriptor source.

use crate::descriptor::{
    OutputColumnSpec, OutputRule, OutputStreamSpec, PropertySlot, SimpleDescriptor, StageDescriptor,
};
use crate::registry::DescriptorRegistry;
use pipewright_core::TypeFamily;
use std::sync::Arc;

pub const NULL_CHECK: &str = "Null check";
pub const EQUALS: &str = "Equals";
pub const NUMBER_RANGE: &str = "Number range";
pub const STRING_LENGTH: &str = "String length";
pub const CONCATENATOR: &str = "Concatenator";
pub const TOKENIZER: &str = "Tokenizer";
pub const CONDITIONAL_SPLITTER: &str = "Conditional splitter";
pub const VALUE_DISTRIBUTION: &str = "Value distribution";
pub const RECORD_COUNTER: &str = "Record counter";

pub fn null_check() -> Arc<dyn StageDescriptor> {
    SimpleDescriptor::filter(NULL_CHECK, ["NULL", "NOT_NULL"])
        .with_slot(PropertySlot::column("columns", TypeFamily::Unknown).array().required())
        .with_slot(PropertySlot::value("consider empty string as null"))
        .build()
}

pub fn equals() -> Arc<dyn StageDescriptor> {
    SimpleDescriptor::filter(EQUALS, ["EQUALS", "NOT_EQUALS"])
        .with_slot(PropertySlot::column("column", TypeFamily::Unknown).required())
        .with_slot(PropertySlot::value("values").array().required())
        .build()
}

pub fn number_range() -> Arc<dyn StageDescriptor> {
    SimpleDescriptor::filter(NUMBER_RANGE, ["VALID", "INVALID"])
        .with_slot(PropertySlot::column("column", TypeFamily::Number).required())
        .with_slot(PropertySlot::value("lowest value").required())
        .with_slot(PropertySlot::value("highest value").required())
        .build()
}

pub fn string_length() -> Arc<dyn StageDescriptor> {
    SimpleDescriptor::transformer(STRING_LENGTH)
        .with_slot(PropertySlot::column("columns", TypeFamily::String).array().required())
        .with_output(OutputRule::PerInput {
            slot: "columns".to_string(),
            suffix: " length".to_string(),
            family: Some(TypeFamily::Number),
        })
        .build()
}

pub fn concatenator() -> Arc<dyn StageDescriptor> {
    SimpleDescriptor::transformer(CONCATENATOR)
        .with_slot(PropertySlot::column("columns", TypeFamily::Unknown).array().required())
        .with_slot(PropertySlot::value("separator"))
        .with_output(OutputRule::custom(|ctx| {
            let names: Vec<&str> = ctx.inputs("columns").iter().map(|i| i.name.as_str()).collect();
            vec![OutputColumnSpec::new(format!("Concat of {}", names.join(",")), TypeFamily::String)]
        }))
        .build()
}

pub fn tokenizer() -> Arc<dyn StageDescriptor> {
    SimpleDescriptor::transformer(TOKENIZER)
        .with_slot(PropertySlot::column("column", TypeFamily::String).required())
        .with_slot(PropertySlot::value("number of tokens").required().affects_output())
        .with_slot(PropertySlot::value("delimiters"))
        .with_output(OutputRule::custom(|ctx| {
            let count = ctx.property("number of tokens").and_then(|v| v.as_u64()).unwrap_or(0);
            let base = ctx
                .inputs("column")
                .first()
                .map(|i| i.name.clone())
                .unwrap_or_default();
            (1..=count)
                .map(|i| OutputColumnSpec::new(format!("{} (token {})", base, i), TypeFamily::String))
                .collect()
        }))
        .build()
}

pub fn conditional_splitter() -> Arc<dyn StageDescriptor> {
    let passthrough = OutputRule::PerInput {
        slot: "columns".to_string(),
        suffix: String::new(),
        family: None,
    };

    SimpleDescriptor::transformer(CONDITIONAL_SPLITTER)
        .with_slot(PropertySlot::column("columns", TypeFamily::Unknown).array().required())
        .with_slot(PropertySlot::value("condition").required())
        .with_stream(OutputStreamSpec::new("matches", passthrough.clone()))
        .with_stream(OutputStreamSpec::new("others", passthrough))
        .build()
}

pub fn value_distribution() -> Arc<dyn StageDescriptor> {
    SimpleDescriptor::analyzer(VALUE_DISTRIBUTION)
        .with_slot(PropertySlot::column("columns", TypeFamily::Unknown).array().required())
        .with_slot(PropertySlot::value("top n"))
        .build()
}

pub fn record_counter() -> Arc<dyn StageDescriptor> {
    SimpleDescriptor::analyzer(RECORD_COUNTER)
        .with_slot(PropertySlot::column("group by", TypeFamily::Unknown))
        .with_output(OutputRule::Fixed(vec![OutputColumnSpec::new("record count", TypeFamily::Number)]))
        .build()
}

/// Registry holding every built-in stage
pub fn registry() -> DescriptorRegistry {
    DescriptorRegistry::new()
        .with(null_check())
        .with(equals())
        .with(number_range())
        .with(string_length())
        .with(concatenator())
        .with(tokenizer())
        .with(conditional_splitter())
        .with(value_distribution())
        .with(record_counter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{InputInfo, OutputContext};
    use crate::registry::DescriptorProvider;
    use pipewright_core::StageKind;
    use serde_json::json;

    #[test]
    fn registry_contains_every_builtin() {
        let registry = registry();
        assert_eq!(registry.len(), 9);
        assert_eq!(registry.descriptors_of(StageKind::Filter).len(), 3);
        assert_eq!(registry.descriptors_of(StageKind::Analyzer).len(), 2);
    }

    #[test]
    fn tokenizer_arity_follows_property() {
        let ctx = OutputContext::new()
            .with_inputs("column", vec![InputInfo::new("name", TypeFamily::String)])
            .with_property("number of tokens", json!(3));

        let names: Vec<String> = tokenizer().output_columns(&ctx).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["name (token 1)", "name (token 2)", "name (token 3)"]);
    }

    #[test]
    fn splitter_projects_inputs_into_streams() {
        let splitter = conditional_splitter();
        let ctx = OutputContext::new().with_inputs(
            "columns",
            vec![InputInfo::new("id", TypeFamily::Number), InputInfo::new("email", TypeFamily::String)],
        );

        assert!(splitter.output_columns(&ctx).is_empty());
        let matches = splitter.stream_columns("matches", &ctx);
        assert_eq!(matches[0], OutputColumnSpec::new("id", TypeFamily::Number));
        assert_eq!(matches[1], OutputColumnSpec::new("email", TypeFamily::String));
    }
}
