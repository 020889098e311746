//! Component builders: one mutable wrapper per configured stage

use pipewright_catalog::{PropertySlot, StageDescriptor};
use pipewright_core::{ColumnId, ComponentId, InputRef, PropertyValue, Requirement, ScopeId, StageKind};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A stage instance inside a pipeline scope
///
/// Component builders are owned by the [`crate::PipelineGraph`] arena and
/// only mutated through graph operations, which keep bindings, outputs
/// and requirements coherent with the rest of the graph.
#[derive(Debug, Clone)]
pub struct ComponentBuilder {
    id: ComponentId,
    scope: ScopeId,
    descriptor: Arc<dyn StageDescriptor>,
    name: Option<String>,
    properties: BTreeMap<String, PropertyValue>,
    input_columns: Vec<InputRef>,
    output_columns: Vec<ColumnId>,
    requirement: Option<Requirement>,
    output_streams: Vec<(String, ScopeId)>,
}

impl ComponentBuilder {
    pub(crate) fn new(id: ComponentId, scope: ScopeId, descriptor: Arc<dyn StageDescriptor>) -> Self {
        Self {
            id,
            scope,
            descriptor,
            name: None,
            properties: BTreeMap::new(),
            input_columns: Vec::new(),
            output_columns: Vec::new(),
            requirement: None,
            output_streams: Vec::new(),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Scope (pipeline builder) owning this component
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn kind(&self) -> StageKind {
        self.descriptor.kind()
    }

    pub fn descriptor(&self) -> &Arc<dyn StageDescriptor> {
        &self.descriptor
    }

    /// Optional display name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Display name, falling back to the descriptor name
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.descriptor.name().to_string())
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Union of every column slot, in slot declaration order
    pub fn input_columns(&self) -> &[InputRef] {
        &self.input_columns
    }

    pub fn output_columns(&self) -> &[ColumnId] {
        &self.output_columns
    }

    /// Explicit requirement (the scope default is not substituted here)
    pub fn requirement(&self) -> Option<&Requirement> {
        self.requirement.as_ref()
    }

    /// Output data streams and the child scopes backing them
    pub fn output_streams(&self) -> &[(String, ScopeId)] {
        &self.output_streams
    }

    pub fn output_stream(&self, stream: &str) -> Option<ScopeId> {
        self.output_streams
            .iter()
            .find(|(name, _)| name == stream)
            .map(|(_, scope)| *scope)
    }

    /// Required slots that are currently empty, in declaration order
    pub fn unconfigured_properties(&self) -> Vec<&PropertySlot> {
        self.descriptor
            .slots()
            .iter()
            .filter(|slot| slot.required)
            .filter(|slot| !self.properties.get(&slot.name).is_some_and(PropertyValue::is_set))
            .collect()
    }

    /// Every required slot is bound or set
    pub fn is_configured(&self) -> bool {
        self.unconfigured_properties().is_empty()
    }

    /// Whether any slot references the stored column
    pub fn references_column(&self, column: ColumnId) -> bool {
        self.input_columns
            .iter()
            .any(|input| input.column_id() == Some(column))
    }

    pub(crate) fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub(crate) fn set_requirement(&mut self, requirement: Option<Requirement>) {
        self.requirement = requirement;
    }

    pub(crate) fn set_output_columns(&mut self, columns: Vec<ColumnId>) {
        self.output_columns = columns;
    }

    pub(crate) fn take_output_columns(&mut self) -> Vec<ColumnId> {
        std::mem::take(&mut self.output_columns)
    }

    pub(crate) fn add_output_stream(&mut self, stream: impl Into<String>, scope: ScopeId) {
        self.output_streams.push((stream.into(), scope));
    }

    pub(crate) fn detach_output_stream(&mut self, scope: ScopeId) {
        self.output_streams.retain(|(_, s)| *s != scope);
    }

    /// Set or clear (`None`) a property and re-derive the bound inputs
    pub(crate) fn set_property(&mut self, name: &str, value: Option<PropertyValue>) {
        match value {
            Some(value) => {
                self.properties.insert(name.to_string(), value);
            }
            None => {
                self.properties.remove(name);
            }
        }
        self.recompute_inputs();
    }

    /// Remove an input from every column slot; returns whether anything changed
    pub(crate) fn remove_input(&mut self, input: &InputRef) -> bool {
        let mut changed = false;
        let mut emptied = Vec::new();

        for (name, value) in self.properties.iter_mut() {
            if let PropertyValue::Columns(inputs) = value {
                let before = inputs.len();
                inputs.retain(|i| i != input);
                if inputs.len() != before {
                    changed = true;
                    if inputs.is_empty() {
                        emptied.push(name.clone());
                    }
                }
            }
        }

        for name in emptied {
            self.properties.remove(&name);
        }
        if changed {
            self.recompute_inputs();
        }
        changed
    }

    /// Clear every column slot; returns whether anything changed
    pub(crate) fn clear_inputs(&mut self) -> bool {
        let before = self.properties.len();
        self.properties
            .retain(|_, value| !matches!(value, PropertyValue::Columns(_)));
        let changed = self.properties.len() != before;
        self.recompute_inputs();
        changed
    }

    fn recompute_inputs(&mut self) {
        let mut inputs: Vec<InputRef> = Vec::new();
        for slot in self.descriptor.slots() {
            if let Some(PropertyValue::Columns(bound)) = self.properties.get(&slot.name) {
                for input in bound {
                    if !inputs.contains(input) {
                        inputs.push(input.clone());
                    }
                }
            }
        }
        self.input_columns = inputs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_catalog::builtin;
    use serde_json::json;

    fn builder(descriptor: Arc<dyn StageDescriptor>) -> ComponentBuilder {
        ComponentBuilder::new(ComponentId::new(10), ScopeId::new(1), descriptor)
    }

    #[test]
    fn input_union_follows_slot_order_without_duplicates() {
        let mut equals = builder(builtin::equals());
        let email = InputRef::from(ColumnId::new(1));

        equals.set_property("column", Some(PropertyValue::Columns(vec![email.clone()])));
        equals.set_property("values", Some(PropertyValue::Value(json!(["a"]))));

        assert_eq!(equals.input_columns(), &[email]);
        assert!(equals.is_configured());
        assert!(equals.references_column(ColumnId::new(1)));
    }

    #[test]
    fn removing_the_last_input_empties_the_slot() {
        let mut length = builder(builtin::string_length());
        let a = InputRef::from(ColumnId::new(1));
        let b = InputRef::from(ColumnId::new(2));
        length.set_property("columns", Some(PropertyValue::Columns(vec![a.clone(), b.clone()])));

        assert!(length.remove_input(&a));
        assert_eq!(length.input_columns(), &[b.clone()]);
        assert!(length.is_configured());

        assert!(length.remove_input(&b));
        assert!(length.property("columns").is_none());
        assert!(!length.is_configured());
        assert!(!length.remove_input(&b));
    }

    #[test]
    fn unconfigured_properties_are_listed_in_declaration_order() {
        let range = builder(builtin::number_range());
        let missing: Vec<&str> = range
            .unconfigured_properties()
            .iter()
            .map(|slot| slot.name.as_str())
            .collect();
        assert_eq!(missing, vec!["column", "lowest value", "highest value"]);
    }

    #[test]
    fn clear_inputs_keeps_value_properties() {
        let mut tokenizer = builder(builtin::tokenizer());
        tokenizer.set_property("column", Some(PropertyValue::Columns(vec![ColumnId::new(4).into()])));
        tokenizer.set_property("number of tokens", Some(PropertyValue::Value(json!(2))));

        assert!(tokenizer.clear_inputs());
        assert!(tokenizer.input_columns().is_empty());
        assert!(tokenizer.property("number of tokens").is_some());
        assert!(!tokenizer.clear_inputs());
    }

    #[test]
    fn label_falls_back_to_descriptor_name() {
        let mut counter = builder(builtin::record_counter());
        assert_eq!(counter.label(), "Record counter");
        counter.set_name(Some("Rows".to_string()));
        assert_eq!(counter.label(), "Rows");
    }
}
