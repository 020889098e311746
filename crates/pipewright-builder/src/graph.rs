//! The pipeline graph arena
//!
//! [`PipelineGraph`] owns every scope, component and stored column of a
//! pipeline under construction. Entities refer to each other by id only;
//! all mutation goes through graph operations so the structural
//! invariants hold after every call:
//!
//! - source columns of a root pipeline all come from one table
//! - a component only consumes columns visible in its own scope, never its
//!   own outputs or those of components depending on it
//! - requirements never form a cycle
//! - output column ids stay stable while a stage's output shape is stable

use crate::component::ComponentBuilder;
use crate::lineage::LineageGraph;
use crate::listener::{
    unregister, ComponentListener, OutputColumnListener, SourceColumnListener, StructureListener,
};
use crate::scope::{PipelineBuilder, ScopeOrigin};
use pipewright_catalog::{DescriptorProvider, SchemaProvider};
use pipewright_core::{
    BuilderConfig, BuilderError, Column, ColumnId, ColumnSnapshot, ComponentId, ConfigError, IdSequence, ScopeId,
    StageKind, TypeFamily,
};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A stored (source or virtual) column and the scope it lives in
#[derive(Debug, Clone)]
pub(crate) struct StoredColumn {
    pub(crate) scope: ScopeId,
    pub(crate) column: Column,
}

/// Mutable graph of scopes, components and columns
pub struct PipelineGraph {
    pub(crate) config: BuilderConfig,
    pub(crate) schemas: Arc<dyn SchemaProvider>,
    pub(crate) descriptors: Option<Arc<dyn DescriptorProvider>>,
    pub(crate) ids: IdSequence,
    pub(crate) root: ScopeId,
    pub(crate) scopes: BTreeMap<ScopeId, PipelineBuilder>,
    pub(crate) components: BTreeMap<ComponentId, ComponentBuilder>,
    pub(crate) columns: BTreeMap<ColumnId, StoredColumn>,
}

impl PipelineGraph {
    /// Create an empty root pipeline reading from `schemas`
    pub fn new(schemas: Arc<dyn SchemaProvider>) -> Self {
        Self::build(schemas, BuilderConfig::default())
    }

    /// Create an empty root pipeline with explicit settings
    ///
    /// Fails with [`ConfigError::InvalidValue`] when the config does not
    /// pass [`BuilderConfig::validate`].
    pub fn with_config(schemas: Arc<dyn SchemaProvider>, config: BuilderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(schemas, config))
    }

    fn build(schemas: Arc<dyn SchemaProvider>, config: BuilderConfig) -> Self {
        let mut ids = IdSequence::new();
        let root = ids.scope();

        let mut scopes = BTreeMap::new();
        scopes.insert(root, PipelineBuilder::root(root));

        tracing::debug!(schema_provider = schemas.name(), root = %root, "created pipeline graph");

        Self {
            config,
            schemas,
            descriptors: None,
            ids,
            root,
            scopes,
            components: BTreeMap::new(),
            columns: BTreeMap::new(),
        }
    }

    /// Attach a descriptor source for [`PipelineGraph::add_component_by_name`]
    pub fn with_descriptors(mut self, descriptors: Arc<dyn DescriptorProvider>) -> Self {
        self.descriptors = Some(descriptors);
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn schema_provider(&self) -> &Arc<dyn SchemaProvider> {
        &self.schemas
    }

    /// The top-level pipeline
    pub fn root(&self) -> ScopeId {
        self.root
    }

    pub fn scope(&self, id: ScopeId) -> Result<&PipelineBuilder, BuilderError> {
        self.scopes.get(&id).ok_or(BuilderError::UnknownScope(id))
    }

    pub(crate) fn scope_mut(&mut self, id: ScopeId) -> Result<&mut PipelineBuilder, BuilderError> {
        self.scopes.get_mut(&id).ok_or(BuilderError::UnknownScope(id))
    }

    /// Every open scope, root first
    pub fn scopes(&self) -> impl Iterator<Item = &PipelineBuilder> {
        self.scopes.values()
    }

    pub fn component(&self, id: ComponentId) -> Result<&ComponentBuilder, BuilderError> {
        self.components.get(&id).ok_or(BuilderError::UnknownComponent(id))
    }

    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.get(&id).map(|stored| &stored.column)
    }

    /// Scope a stored column is visible in
    pub fn column_scope(&self, id: ColumnId) -> Option<ScopeId> {
        self.columns.get(&id).map(|stored| stored.scope)
    }

    pub fn column_name(&self, id: ColumnId) -> Option<&str> {
        self.column(id).map(Column::name)
    }

    /// Parent of a scope; `None` for the root
    pub fn parent_of(&self, scope: ScopeId) -> Result<Option<ScopeId>, BuilderError> {
        Ok(self.scope(scope)?.parent())
    }

    /// Outermost ancestor of a scope
    pub fn root_of(&self, scope: ScopeId) -> Result<ScopeId, BuilderError> {
        let mut current = self.scope(scope)?;
        while let Some(parent) = current.parent() {
            current = self.scope(parent)?;
        }
        Ok(current.id())
    }

    /// Scope backing a named output stream of a component
    pub fn output_stream(&self, component: ComponentId, stream: &str) -> Result<ScopeId, BuilderError> {
        let builder = self.component(component)?;
        builder
            .output_stream(stream)
            .ok_or_else(|| BuilderError::UnknownProperty {
                stage: builder.label(),
                property: stream.to_string(),
            })
    }

    /// Components of a scope with the given kind, in insertion order
    pub fn components_of(&self, scope: ScopeId, kind: StageKind) -> Result<Vec<ComponentId>, BuilderError> {
        Ok(self
            .scope(scope)?
            .components()
            .iter()
            .filter(|id| self.components.get(*id).is_some_and(|c| c.kind() == kind))
            .copied()
            .collect())
    }

    pub fn filters(&self, scope: ScopeId) -> Result<Vec<ComponentId>, BuilderError> {
        self.components_of(scope, StageKind::Filter)
    }

    pub fn transformers(&self, scope: ScopeId) -> Result<Vec<ComponentId>, BuilderError> {
        self.components_of(scope, StageKind::Transformer)
    }

    pub fn analyzers(&self, scope: ScopeId) -> Result<Vec<ComponentId>, BuilderError> {
        self.components_of(scope, StageKind::Analyzer)
    }

    /// Human readable path of a scope, e.g. `root/Splitter/matches`
    pub fn scope_path(&self, scope: ScopeId) -> String {
        let Some(builder) = self.scopes.get(&scope) else {
            return scope.to_string();
        };

        match (builder.origin(), builder.parent()) {
            (ScopeOrigin::Stream { owner, stream }, Some(parent)) => {
                let owner = self
                    .components
                    .get(owner)
                    .map(ComponentBuilder::label)
                    .unwrap_or_else(|| owner.to_string());
                format!("{}/{}/{}", self.scope_path(parent), owner, stream)
            }
            _ => "root".to_string(),
        }
    }

    /// Stored columns a component may consume, optionally restricted to
    /// those a slot of `family` would accept
    ///
    /// The scope's source columns come first, then the outputs of every
    /// other component in insertion order, skipping components that
    /// (transitively) consume this component's outputs.
    pub fn available_input_columns(
        &self,
        component: ComponentId,
        family: Option<TypeFamily>,
    ) -> Result<Vec<ColumnId>, BuilderError> {
        let builder = self.component(component)?;
        let scope = self.scope(builder.scope())?;
        let dependents: HashSet<ComponentId> = self.lineage(scope.id())?.downstream(component).into_iter().collect();

        let accepted = |id: &ColumnId| match (family, self.column(*id)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(family), Some(column)) => family.accepts(column.family()),
        };

        let mut available: Vec<ColumnId> = scope.source_columns().iter().copied().filter(&accepted).collect();

        for other in scope.components() {
            if *other == component || dependents.contains(other) {
                continue;
            }
            if let Some(producer) = self.components.get(other) {
                available.extend(producer.output_columns().iter().copied().filter(&accepted));
            }
        }

        Ok(available)
    }

    /// Producer/consumer lineage of a scope's components
    pub fn lineage(&self, scope: ScopeId) -> Result<LineageGraph, BuilderError> {
        let builder = self.scope(scope)?;
        let components = builder.components().iter().filter_map(|id| self.components.get(id));
        Ok(LineageGraph::build(components, |id| self.column(id)))
    }

    /// Components of a scope ordered so producers precede their consumers
    pub fn execution_order(&self, scope: ScopeId) -> Result<Vec<ComponentId>, BuilderError> {
        let lineage = self.lineage(scope)?;
        match lineage.topological_sort() {
            Some(order) => Ok(order),
            None => {
                tracing::warn!(scope = %scope, "column lineage is cyclic, keeping insertion order");
                Ok(self.scope(scope)?.components().to_vec())
            }
        }
    }

    /// Components consuming a stored column, in insertion order
    pub fn consumers_of(&self, column: ColumnId) -> Vec<ComponentId> {
        let Some(scope) = self.column_scope(column).and_then(|s| self.scopes.get(&s)) else {
            return Vec::new();
        };

        scope
            .components()
            .iter()
            .filter(|id| self.components.get(*id).is_some_and(|c| c.references_column(column)))
            .copied()
            .collect()
    }

    pub(crate) fn snapshots(&self, columns: &[ColumnId]) -> Vec<ColumnSnapshot> {
        columns
            .iter()
            .filter_map(|id| self.column(*id))
            .map(Column::snapshot)
            .collect()
    }

    pub(crate) fn label_of(&self, component: ComponentId) -> String {
        self.components
            .get(&component)
            .map(ComponentBuilder::label)
            .unwrap_or_else(|| component.to_string())
    }

    pub(crate) fn column_label(&self, column: ColumnId) -> String {
        self.column_name(column)
            .map(str::to_string)
            .unwrap_or_else(|| column.to_string())
    }

    // Listener registration

    pub fn add_component_listener(
        &mut self,
        scope: ScopeId,
        kind: StageKind,
        listener: Arc<dyn ComponentListener>,
    ) -> Result<(), BuilderError> {
        self.scope_mut(scope)?.listeners.components_mut(kind).push(listener);
        Ok(())
    }

    pub fn remove_component_listener(
        &mut self,
        scope: ScopeId,
        kind: StageKind,
        listener: &Arc<dyn ComponentListener>,
    ) -> Result<bool, BuilderError> {
        Ok(unregister(self.scope_mut(scope)?.listeners.components_mut(kind), listener))
    }

    pub fn add_source_column_listener(
        &mut self,
        scope: ScopeId,
        listener: Arc<dyn SourceColumnListener>,
    ) -> Result<(), BuilderError> {
        self.scope_mut(scope)?.listeners.source_columns_mut().push(listener);
        Ok(())
    }

    pub fn remove_source_column_listener(
        &mut self,
        scope: ScopeId,
        listener: &Arc<dyn SourceColumnListener>,
    ) -> Result<bool, BuilderError> {
        Ok(unregister(self.scope_mut(scope)?.listeners.source_columns_mut(), listener))
    }

    pub fn add_output_column_listener(
        &mut self,
        scope: ScopeId,
        listener: Arc<dyn OutputColumnListener>,
    ) -> Result<(), BuilderError> {
        self.scope_mut(scope)?.listeners.output_columns_mut().push(listener);
        Ok(())
    }

    pub fn remove_output_column_listener(
        &mut self,
        scope: ScopeId,
        listener: &Arc<dyn OutputColumnListener>,
    ) -> Result<bool, BuilderError> {
        Ok(unregister(self.scope_mut(scope)?.listeners.output_columns_mut(), listener))
    }

    pub fn add_structure_listener(
        &mut self,
        scope: ScopeId,
        listener: Arc<dyn StructureListener>,
    ) -> Result<(), BuilderError> {
        self.scope_mut(scope)?.listeners.structure_mut().push(listener);
        Ok(())
    }

    pub fn remove_structure_listener(
        &mut self,
        scope: ScopeId,
        listener: &Arc<dyn StructureListener>,
    ) -> Result<bool, BuilderError> {
        Ok(unregister(self.scope_mut(scope)?.listeners.structure_mut(), listener))
    }
}

impl fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("schema_provider", &self.schemas.name())
            .field("root", &self.root)
            .field("scopes", &self.scopes.len())
            .field("components", &self.components.len())
            .field("columns", &self.columns.len())
            .finish()
    }
}
