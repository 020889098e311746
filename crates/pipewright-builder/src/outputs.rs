//! Output column reconciliation and output stream projection
//!
//! After every change to a stage's configuration the graph asks the
//! descriptor for the desired output columns and reconciles them with the
//! stored ones. When the shape (arity and family at each position) is
//! unchanged the existing columns keep their ids and only system names
//! follow the descriptor; otherwise every old column is destroyed and
//! unbound downstream before fresh ones are created.

use crate::graph::{PipelineGraph, StoredColumn};
use crate::listener::{GraphEvent, Notifier};
use pipewright_catalog::{InputInfo, OutputColumnSpec, OutputContext};
use pipewright_core::{
    BuilderError, Column, ColumnId, ComponentId, InputRef, LogicalType, PropertyValue, ScopeId, SourceColumn,
    SourceOrigin, StageKind, TableColumn, VirtualColumn,
};
use std::collections::HashSet;
use std::sync::Arc;

impl PipelineGraph {
    /// Rename a virtual output column on behalf of a caller
    ///
    /// The column keeps its manual name across later reconciliations.
    /// Consumers whose outputs derive from the name are updated.
    pub fn rename_column(&mut self, column: ColumnId, name: impl Into<String>) -> Result<(), BuilderError> {
        let name = name.into();
        let stored = self
            .columns
            .get(&column)
            .ok_or_else(|| BuilderError::UnknownColumn(column.to_string()))?;

        let producer = match &stored.column {
            Column::Virtual(c) => c.producer(),
            other => return Err(BuilderError::ImmutableColumn(other.name().to_string())),
        };
        let scope = stored.scope;
        let outputs = self.component(producer)?.output_columns().to_vec();
        let before = self.snapshots(&outputs);

        if let Some(Column::Virtual(c)) = self.columns.get_mut(&column).map(|s| &mut s.column) {
            c.rename(name.clone());
        }

        let mut notifier = Notifier::new();
        self.propagate_names(&[column], &mut notifier);
        notifier.push(GraphEvent::OutputColumnsChanged {
            scope,
            component: producer,
            before,
            after: self.snapshots(&outputs),
        });
        tracing::debug!(column = %column, name = %name, "renamed output column");

        self.dispatch(notifier)
    }

    /// Configuration of a component as seen by its descriptor
    pub(crate) fn output_context(&self, component: ComponentId) -> OutputContext {
        let Some(builder) = self.components.get(&component) else {
            return OutputContext::new();
        };

        let mut ctx = OutputContext::new();
        for slot in builder.descriptor().slots() {
            match builder.property(&slot.name) {
                Some(PropertyValue::Columns(inputs)) => {
                    let inputs = inputs.iter().filter_map(|input| self.describe_input(input)).collect();
                    ctx = ctx.with_inputs(slot.name.clone(), inputs);
                }
                Some(PropertyValue::Value(value)) => {
                    ctx = ctx.with_property(slot.name.clone(), value.clone());
                }
                None => {}
            }
        }
        ctx
    }

    fn describe_input(&self, input: &InputRef) -> Option<InputInfo> {
        match input {
            InputRef::Column { id } => self.column(*id).map(|c| InputInfo::new(c.name(), c.family())),
            InputRef::Constant(c) => Some(InputInfo::new(c.value.clone(), c.family)),
            InputRef::Expression(e) => Some(InputInfo::new(e.expression.clone(), e.family)),
        }
    }

    /// Recompute a component's output columns and stream projections
    pub(crate) fn refresh_outputs(&mut self, id: ComponentId, notifier: &mut Notifier) {
        let Some(builder) = self.components.get(&id) else {
            return;
        };
        let scope = builder.scope();

        let desired: Vec<OutputColumnSpec> = if builder.is_configured() && builder.kind() != StageKind::Filter {
            builder.descriptor().output_columns(&self.output_context(id))
        } else {
            Vec::new()
        };
        let current = builder.output_columns().to_vec();
        let before = self.snapshots(&current);

        let same_shape = desired.len() == current.len()
            && current
                .iter()
                .zip(&desired)
                .all(|(column, spec)| self.column(*column).map(Column::family) == Some(spec.family));

        let mut renamed = Vec::new();
        let after_ids = if same_shape {
            let mut taken = self.taken_names(scope, id);
            for column in &current {
                if let Some(c) = self.column(*column).and_then(Column::as_virtual) {
                    if c.is_manually_renamed() {
                        taken.insert(c.name().to_string());
                    }
                }
            }

            for (column, spec) in current.iter().zip(&desired) {
                let manual = self
                    .column(*column)
                    .and_then(Column::as_virtual)
                    .map_or(true, |c| c.is_manually_renamed());
                if manual {
                    continue;
                }

                let name = self.unique_name(&spec.name, &mut taken);
                if let Some(Column::Virtual(c)) = self.columns.get_mut(column).map(|s| &mut s.column) {
                    if c.name() != name {
                        c.assign_name(name);
                        renamed.push(*column);
                    }
                }
            }
            current
        } else {
            self.destroy_outputs(id, notifier);

            let mut taken = self.taken_names(scope, id);
            let mut fresh = Vec::with_capacity(desired.len());
            for spec in desired {
                let name = self.unique_name(&spec.name, &mut taken);
                let column = self.ids.column();
                self.columns.insert(
                    column,
                    StoredColumn {
                        scope,
                        column: Column::Virtual(VirtualColumn::new(column, id, name, spec.family)),
                    },
                );
                fresh.push(column);
            }
            if let Some(builder) = self.components.get_mut(&id) {
                builder.set_output_columns(fresh.clone());
            }
            fresh
        };

        let after = self.snapshots(&after_ids);
        if before != after {
            tracing::trace!(component = %id, before = before.len(), after = after.len(), "output columns changed");
            notifier.push(GraphEvent::OutputColumnsChanged {
                scope,
                component: id,
                before,
                after,
            });
        }

        self.propagate_names(&renamed, notifier);
        self.refresh_streams(id, notifier);
    }

    /// Destroy every output column of a component and unbind it downstream
    pub(crate) fn destroy_outputs(&mut self, id: ComponentId, notifier: &mut Notifier) {
        let Some(builder) = self.components.get_mut(&id) else {
            return;
        };
        let scope = builder.scope();
        let columns = builder.take_output_columns();

        for column in &columns {
            self.columns.remove(column);
        }
        for column in columns {
            self.purge_column(scope, column, notifier);
        }
    }

    /// Unbind a column from every component of a scope
    pub(crate) fn purge_column(&mut self, scope: ScopeId, column: ColumnId, notifier: &mut Notifier) {
        let Some(builder) = self.scopes.get(&scope) else {
            return;
        };
        let consumers: Vec<ComponentId> = builder
            .components()
            .iter()
            .filter(|id| self.components.get(*id).is_some_and(|c| c.references_column(column)))
            .copied()
            .collect();

        let input = InputRef::from(column);
        for consumer in consumers {
            let Some(builder) = self.components.get_mut(&consumer) else {
                continue;
            };
            builder.remove_input(&input);
            let kind = builder.kind();

            tracing::debug!(component = %consumer, column = %column, "unbound removed column");
            self.refresh_outputs(consumer, notifier);
            notifier.push(GraphEvent::ComponentChanged {
                scope,
                component: consumer,
                kind,
            });
        }
    }

    /// Refresh consumers of columns whose names changed
    fn propagate_names(&mut self, columns: &[ColumnId], notifier: &mut Notifier) {
        let mut consumers: Vec<ComponentId> = Vec::new();
        for column in columns {
            for consumer in self.consumers_of(*column) {
                if !consumers.contains(&consumer) {
                    consumers.push(consumer);
                }
            }
        }

        for consumer in consumers {
            self.refresh_outputs(consumer, notifier);
        }
    }

    /// Names visible in a scope other than the outputs of `except`
    fn taken_names(&self, scope: ScopeId, except: ComponentId) -> HashSet<String> {
        let Some(builder) = self.scopes.get(&scope) else {
            return HashSet::new();
        };

        let sources = builder.source_columns().iter();
        let outputs = builder
            .components()
            .iter()
            .filter(|id| **id != except)
            .filter_map(|id| self.components.get(id))
            .flat_map(|c| c.output_columns().iter());

        sources
            .chain(outputs)
            .filter_map(|id| self.column_name(*id))
            .map(str::to_string)
            .collect()
    }

    fn unique_name(&self, base: &str, taken: &mut HashSet<String>) -> String {
        let mut name = base.to_string();
        let mut counter = 1;
        while taken.contains(&name) {
            name = self.config.naming.disambiguate(base, counter);
            counter += 1;
        }
        taken.insert(name.clone());
        name
    }

    /// Mirror a component's stream projections into its child scopes
    fn refresh_streams(&mut self, id: ComponentId, notifier: &mut Notifier) {
        let Some(builder) = self.components.get(&id) else {
            return;
        };
        if builder.output_streams().is_empty() {
            return;
        }

        let streams = builder.output_streams().to_vec();
        let descriptor = Arc::clone(builder.descriptor());
        let configured = builder.is_configured();
        let ctx = self.output_context(id);

        for (stream, child) in streams {
            let desired = if configured {
                descriptor.stream_columns(&stream, &ctx)
            } else {
                Vec::new()
            };
            self.reconcile_stream(child, id, &stream, desired, notifier);
        }
    }

    /// Match stream columns by name and family; removals first, then additions
    fn reconcile_stream(
        &mut self,
        scope: ScopeId,
        owner: ComponentId,
        stream: &str,
        desired: Vec<OutputColumnSpec>,
        notifier: &mut Notifier,
    ) {
        let Some(builder) = self.scopes.get(&scope) else {
            return;
        };
        let current = builder.source_columns().to_vec();

        let mut kept: Vec<Option<ColumnId>> = Vec::with_capacity(desired.len());
        let mut matched: HashSet<ColumnId> = HashSet::new();
        for spec in &desired {
            let existing = current.iter().copied().find(|id| {
                !matched.contains(id)
                    && self
                        .column(*id)
                        .is_some_and(|c| c.name() == spec.name && c.family() == spec.family)
            });
            if let Some(id) = existing {
                matched.insert(id);
            }
            kept.push(existing);
        }

        for column in current.iter().filter(|id| !matched.contains(id)) {
            self.detach_source(scope, *column, notifier);
        }

        let mut ordered = Vec::with_capacity(desired.len());
        for (spec, existing) in desired.into_iter().zip(kept) {
            if let Some(id) = existing {
                ordered.push(id);
                continue;
            }

            let id = self.ids.column();
            let metadata = Arc::new(TableColumn::new(spec.name, LogicalType::from_family(spec.family)));
            let origin = SourceOrigin::Stream {
                component: owner,
                stream: stream.to_string(),
            };
            let column = Column::Source(SourceColumn::new(id, metadata, origin));
            notifier.push(GraphEvent::SourceColumnAdded {
                scope,
                column: column.snapshot(),
            });
            self.columns.insert(id, StoredColumn { scope, column });
            ordered.push(id);
        }

        if let Some(builder) = self.scopes.get_mut(&scope) {
            builder.set_source_columns(ordered);
        }
    }
}
