//! Pipeline scopes: the root pipeline and nested output-stream pipelines

use crate::listener::ListenerRegistry;
use pipewright_core::{ColumnId, ComponentId, Requirement, ScopeId, TableIdentifier};

/// How a scope came to exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeOrigin {
    /// Top-level pipeline reading from a table
    Root,

    /// Output data stream of a component in the parent scope
    Stream { owner: ComponentId, stream: String },
}

/// Mutable state of one pipeline (root or nested)
///
/// Stream scopes are created by the graph when a stage declaring output
/// streams is added and closed when that stage is removed. Their source
/// columns mirror the stage's current projection.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    id: ScopeId,
    parent: Option<ScopeId>,
    origin: ScopeOrigin,
    table: Option<TableIdentifier>,
    source_columns: Vec<ColumnId>,
    components: Vec<ComponentId>,
    default_requirement: Option<Requirement>,
    pub(crate) listeners: ListenerRegistry,
}

impl PipelineBuilder {
    pub(crate) fn root(id: ScopeId) -> Self {
        Self::new(id, None, ScopeOrigin::Root)
    }

    pub(crate) fn stream(id: ScopeId, parent: ScopeId, owner: ComponentId, stream: impl Into<String>) -> Self {
        Self::new(
            id,
            Some(parent),
            ScopeOrigin::Stream {
                owner,
                stream: stream.into(),
            },
        )
    }

    fn new(id: ScopeId, parent: Option<ScopeId>, origin: ScopeOrigin) -> Self {
        Self {
            id,
            parent,
            origin,
            table: None,
            source_columns: Vec::new(),
            components: Vec::new(),
            default_requirement: None,
            listeners: ListenerRegistry::default(),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn origin(&self) -> &ScopeOrigin {
        &self.origin
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.origin, ScopeOrigin::Stream { .. })
    }

    /// Table every source column of a root scope belongs to
    pub fn table(&self) -> Option<&TableIdentifier> {
        self.table.as_ref()
    }

    pub fn source_columns(&self) -> &[ColumnId] {
        &self.source_columns
    }

    /// Components in insertion order
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn default_requirement(&self) -> Option<&Requirement> {
        self.default_requirement.as_ref()
    }

    pub(crate) fn set_table(&mut self, table: Option<TableIdentifier>) {
        self.table = table;
    }

    pub(crate) fn push_source_column(&mut self, column: ColumnId) {
        self.source_columns.push(column);
    }

    pub(crate) fn set_source_columns(&mut self, columns: Vec<ColumnId>) {
        self.source_columns = columns;
    }

    /// Returns whether the column was present
    pub(crate) fn remove_source_column(&mut self, column: ColumnId) -> bool {
        let before = self.source_columns.len();
        self.source_columns.retain(|c| *c != column);
        before != self.source_columns.len()
    }

    pub(crate) fn push_component(&mut self, component: ComponentId) {
        self.components.push(component);
    }

    pub(crate) fn remove_component(&mut self, component: ComponentId) {
        self.components.retain(|c| *c != component);
    }

    pub(crate) fn set_default_requirement(&mut self, requirement: Option<Requirement>) {
        self.default_requirement = requirement;
    }

    pub(crate) fn into_listeners(self) -> ListenerRegistry {
        self.listeners
    }
}
