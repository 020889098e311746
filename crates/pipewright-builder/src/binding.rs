//! Input binding and property configuration

use crate::graph::PipelineGraph;
use crate::listener::{GraphEvent, Notifier};
use pipewright_catalog::PropertySlot;
use pipewright_core::{BuilderError, ComponentId, InputRef, PropertyValue, TypeFamily};
use serde_json::Value;
use std::collections::HashSet;

impl PipelineGraph {
    /// Replace the inputs of a column slot; an empty list clears it
    pub fn bind(&mut self, component: ComponentId, slot: &str, inputs: Vec<InputRef>) -> Result<(), BuilderError> {
        let builder = self.component(component)?;
        let label = builder.label();
        let descriptor = builder.descriptor().clone();
        let slot = self.column_slot(&label, descriptor.slot(slot), slot)?;

        if !slot.array && inputs.len() > 1 {
            return Err(BuilderError::ArityMismatch {
                stage: label,
                property: slot.name.clone(),
                count: inputs.len(),
            });
        }
        self.check_inputs(component, &label, slot, &inputs)?;

        let value = (!inputs.is_empty()).then_some(PropertyValue::Columns(inputs));
        self.commit_property(component, &slot.name, value)
    }

    /// Append an input to the first column slot that accepts its family and
    /// still has room
    pub fn add_input_column(&mut self, component: ComponentId, input: InputRef) -> Result<(), BuilderError> {
        let builder = self.component(component)?;
        let label = builder.label();
        let family = self.input_family(&input)?;

        let column_slots: Vec<&PropertySlot> = builder.descriptor().slots().iter().filter(|s| s.is_column()).collect();
        let target = column_slots.iter().find(|slot| {
            let room = slot.array || !builder.property(&slot.name).is_some_and(PropertyValue::is_set);
            room && slot.accepts().is_some_and(|accepts| accepts.accepts(family))
        });

        let Some(slot) = target else {
            let full = column_slots
                .iter()
                .find(|slot| slot.accepts().is_some_and(|accepts| accepts.accepts(family)));
            if let Some(full) = full {
                let bound = builder
                    .property(&full.name)
                    .and_then(PropertyValue::as_columns)
                    .map_or(0, <[InputRef]>::len);
                return Err(BuilderError::ArityMismatch {
                    stage: label,
                    property: full.name.clone(),
                    count: bound + 1,
                });
            }

            let first = column_slots.first();
            return Err(BuilderError::IncompatibleColumnType {
                stage: label,
                property: first.map(|s| s.name.clone()).unwrap_or_default(),
                column: self.input_label(&input),
                expected: first.and_then(|s| s.accepts()).unwrap_or(TypeFamily::Unknown),
                actual: family,
            });
        };

        let slot = slot.name.clone();
        let mut inputs = builder
            .property(&slot)
            .and_then(PropertyValue::as_columns)
            .map(<[InputRef]>::to_vec)
            .unwrap_or_default();
        if inputs.contains(&input) {
            return Ok(());
        }
        inputs.push(input);

        self.bind(component, &slot, inputs)
    }

    /// Remove an input from every slot of a component
    pub fn unbind(&mut self, component: ComponentId, input: &InputRef) -> Result<(), BuilderError> {
        let builder = self
            .components
            .get_mut(&component)
            .ok_or(BuilderError::UnknownComponent(component))?;
        if !builder.remove_input(input) {
            return Ok(());
        }

        self.notify_configured(component)
    }

    /// Clear every column slot of a component
    pub fn clear_input_columns(&mut self, component: ComponentId) -> Result<(), BuilderError> {
        let builder = self
            .components
            .get_mut(&component)
            .ok_or(BuilderError::UnknownComponent(component))?;
        if !builder.clear_inputs() {
            return Ok(());
        }

        self.notify_configured(component)
    }

    /// Set a value property; `null` unsets it
    pub fn set_configured_property(
        &mut self,
        component: ComponentId,
        property: &str,
        value: Value,
    ) -> Result<(), BuilderError> {
        let builder = self.component(component)?;
        let label = builder.label();
        let descriptor = builder.descriptor().clone();
        let slot = descriptor.slot(property).ok_or_else(|| BuilderError::UnknownProperty {
            stage: label.clone(),
            property: property.to_string(),
        })?;

        let invalid = |reason: &str| BuilderError::InvalidPropertyValue {
            stage: label.clone(),
            property: property.to_string(),
            reason: reason.to_string(),
        };

        if slot.is_column() {
            return Err(invalid("column properties are set by binding inputs"));
        }
        if !value.is_null() {
            if slot.array && !value.is_array() {
                return Err(invalid("expected an array"));
            }
            if !slot.array && value.is_array() {
                return Err(invalid("expected a single value"));
            }
            if !slot.allowed_values.is_empty() {
                let items: Vec<&Value> = match &value {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                for item in items {
                    let allowed = item
                        .as_str()
                        .is_some_and(|s| slot.allowed_values.iter().any(|a| a == s));
                    if !allowed {
                        return Err(invalid(&format!(
                            "{} is not one of: {}",
                            item,
                            slot.allowed_values.join(", ")
                        )));
                    }
                }
            }
        }

        let value = (!value.is_null()).then_some(PropertyValue::Value(value));
        if slot.affects_output || slot.required {
            self.commit_property(component, property, value)
        } else {
            if let Some(builder) = self.components.get_mut(&component) {
                builder.set_property(property, value);
            }
            self.notify_changed(component)
        }
    }

    /// Whether every required slot is set; with `throw` the first missing
    /// slot is reported as an error instead
    pub fn is_configured(&self, component: ComponentId, throw: bool) -> Result<bool, BuilderError> {
        let builder = self.component(component)?;
        match builder.unconfigured_properties().first() {
            None => Ok(true),
            Some(slot) if throw => Err(BuilderError::UnconfiguredProperty {
                stage: builder.label(),
                property: slot.name.clone(),
            }),
            Some(_) => Ok(false),
        }
    }

    /// Set or clear the display name of a component
    pub fn set_component_name(&mut self, component: ComponentId, name: Option<String>) -> Result<(), BuilderError> {
        let builder = self
            .components
            .get_mut(&component)
            .ok_or(BuilderError::UnknownComponent(component))?;
        builder.set_name(name);
        self.notify_changed(component)
    }

    fn column_slot<'d>(
        &self,
        stage: &str,
        slot: Option<&'d PropertySlot>,
        name: &str,
    ) -> Result<&'d PropertySlot, BuilderError> {
        let slot = slot.ok_or_else(|| BuilderError::UnknownProperty {
            stage: stage.to_string(),
            property: name.to_string(),
        })?;
        if !slot.is_column() {
            return Err(BuilderError::InvalidPropertyValue {
                stage: stage.to_string(),
                property: name.to_string(),
                reason: "value properties cannot hold columns".to_string(),
            });
        }
        Ok(slot)
    }

    fn check_inputs(
        &self,
        component: ComponentId,
        stage: &str,
        slot: &PropertySlot,
        inputs: &[InputRef],
    ) -> Result<(), BuilderError> {
        let accepts = slot.accepts().unwrap_or(TypeFamily::Unknown);
        let mut available: Option<HashSet<_>> = None;

        for input in inputs {
            let family = self.input_family(input)?;

            if let Some(column) = input.column_id() {
                if available.is_none() {
                    available = Some(self.available_input_columns(component, None)?.into_iter().collect());
                }
                if !available.as_ref().is_some_and(|a| a.contains(&column)) {
                    return Err(BuilderError::ColumnNotAvailable {
                        stage: stage.to_string(),
                        column: self.column_label(column),
                    });
                }
            }

            if !accepts.accepts(family) {
                return Err(BuilderError::IncompatibleColumnType {
                    stage: stage.to_string(),
                    property: slot.name.clone(),
                    column: self.input_label(input),
                    expected: accepts,
                    actual: family,
                });
            }
        }
        Ok(())
    }

    fn input_family(&self, input: &InputRef) -> Result<TypeFamily, BuilderError> {
        match input {
            InputRef::Column { id } => self
                .column(*id)
                .map(|c| c.family())
                .ok_or_else(|| BuilderError::UnknownColumn(id.to_string())),
            InputRef::Constant(c) => Ok(c.family),
            InputRef::Expression(e) => Ok(e.family),
        }
    }

    fn input_label(&self, input: &InputRef) -> String {
        match input {
            InputRef::Column { id } => self.column_label(*id),
            InputRef::Constant(c) => format!("\"{}\"", c.value),
            InputRef::Expression(e) => format!("#{{{}}}", e.expression),
        }
    }

    /// Store a property, then reconcile outputs and notify
    fn commit_property(
        &mut self,
        component: ComponentId,
        property: &str,
        value: Option<PropertyValue>,
    ) -> Result<(), BuilderError> {
        if let Some(builder) = self.components.get_mut(&component) {
            builder.set_property(property, value);
        }
        tracing::debug!(component = %component, property, "configured property");
        self.notify_configured(component)
    }

    fn notify_configured(&mut self, component: ComponentId) -> Result<(), BuilderError> {
        let mut notifier = Notifier::new();
        self.refresh_outputs(component, &mut notifier);
        self.push_changed(component, &mut notifier)?;
        self.dispatch(notifier)
    }

    fn notify_changed(&self, component: ComponentId) -> Result<(), BuilderError> {
        let mut notifier = Notifier::new();
        self.push_changed(component, &mut notifier)?;
        self.dispatch(notifier)
    }

    fn push_changed(&self, component: ComponentId, notifier: &mut Notifier) -> Result<(), BuilderError> {
        let builder = self.component(component)?;
        notifier.push(GraphEvent::ComponentChanged {
            scope: builder.scope(),
            component,
            kind: builder.kind(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::customers_graph;
    use pipewright_catalog::{builtin, PropertySlot, SimpleDescriptor};
    use pipewright_core::{BuilderError, InputRef, TypeFamily};
    use serde_json::json;

    #[test]
    fn type_families_are_enforced() {
        let mut graph = customers_graph();
        let root = graph.root();
        let age = graph.add_source_column(root, "shop.customers.age").unwrap();

        let length = graph.add_transformer(root, builtin::string_length()).unwrap();
        let err = graph.bind(length, "columns", vec![age.into()]).unwrap_err();
        assert!(matches!(
            err,
            BuilderError::IncompatibleColumnType {
                expected: TypeFamily::String,
                actual: TypeFamily::Number,
                ..
            }
        ));
        assert!(graph.component(length).unwrap().input_columns().is_empty());

        let err = graph.add_input_column(length, age.into()).unwrap_err();
        assert!(matches!(err, BuilderError::IncompatibleColumnType { .. }));
    }

    #[test]
    fn single_valued_slots_take_one_input() {
        let mut graph = customers_graph();
        let root = graph.root();
        let ids = graph
            .add_source_columns(root, &["shop.customers.name", "shop.customers.email"])
            .unwrap();

        let tokenizer = graph.add_transformer(root, builtin::tokenizer()).unwrap();
        let err = graph
            .bind(tokenizer, "column", ids.iter().map(|id| (*id).into()).collect())
            .unwrap_err();
        assert!(matches!(err, BuilderError::ArityMismatch { count: 2, .. }));

        graph.add_input_column(tokenizer, ids[0].into()).unwrap();
        let err = graph.add_input_column(tokenizer, ids[1].into()).unwrap_err();
        assert!(err.to_string().ends_with("takes a single column, got 2"));
        assert!(matches!(err, BuilderError::ArityMismatch { property, count: 2, .. } if property == "column"));
        assert_eq!(graph.component(tokenizer).unwrap().input_columns(), &[InputRef::from(ids[0])]);
    }

    #[test]
    fn own_outputs_are_not_available() {
        let mut graph = customers_graph();
        let root = graph.root();
        let email = graph.add_source_column(root, "shop.customers.email").unwrap();

        let concat = graph.add_transformer(root, builtin::concatenator()).unwrap();
        graph.bind(concat, "columns", vec![email.into()]).unwrap();
        let out = graph.component(concat).unwrap().output_columns()[0];

        let err = graph.add_input_column(concat, out.into()).unwrap_err();
        assert!(matches!(err, BuilderError::ColumnNotAvailable { .. }));
    }

    #[test]
    fn value_and_constant_inputs() {
        let mut graph = customers_graph();
        let root = graph.root();
        let concat = graph.add_transformer(root, builtin::concatenator()).unwrap();

        graph
            .bind(
                concat,
                "columns",
                vec![InputRef::constant("Mr.", TypeFamily::String), InputRef::expression("upper(name)", TypeFamily::String)],
            )
            .unwrap();
        let out = graph.component(concat).unwrap().output_columns()[0];
        assert_eq!(graph.column_name(out), Some("Concat of Mr.,upper(name)"));

        let err = graph.bind(concat, "separator", vec![]).unwrap_err();
        assert!(matches!(err, BuilderError::InvalidPropertyValue { .. }));
        let err = graph.bind(concat, "missing", vec![]).unwrap_err();
        assert!(matches!(err, BuilderError::UnknownProperty { .. }));
    }

    #[test]
    fn property_values_are_validated() {
        let mut graph = customers_graph();
        let root = graph.root();
        let descriptor = SimpleDescriptor::transformer("Case")
            .with_slot(PropertySlot::value("mode").allowed(["UPPER", "LOWER"]).required())
            .with_slot(PropertySlot::value("tags").array())
            .build();
        let case = graph.add_transformer(root, descriptor).unwrap();

        assert!(!graph.is_configured(case, false).unwrap());
        let err = graph.is_configured(case, true).unwrap_err();
        assert!(matches!(err, BuilderError::UnconfiguredProperty { property, .. } if property == "mode"));

        let err = graph.set_configured_property(case, "mode", json!("TITLE")).unwrap_err();
        assert!(matches!(err, BuilderError::InvalidPropertyValue { .. }));
        let err = graph.set_configured_property(case, "tags", json!("a")).unwrap_err();
        assert!(matches!(err, BuilderError::InvalidPropertyValue { .. }));
        let err = graph.set_configured_property(case, "mode", json!(["UPPER"])).unwrap_err();
        assert!(matches!(err, BuilderError::InvalidPropertyValue { .. }));

        graph.set_configured_property(case, "mode", json!("UPPER")).unwrap();
        assert!(graph.is_configured(case, true).unwrap());

        graph.set_configured_property(case, "mode", json!(null)).unwrap();
        assert!(!graph.is_configured(case, false).unwrap());
    }
}
