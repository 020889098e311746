//! Change notification
//!
//! Listeners are registered per scope. Operations collect [`GraphEvent`]s
//! while they mutate the graph and dispatch them once the graph is
//! consistent again, so every callback can query the graph freely.
//! Cascaded events (purged bindings, destroyed outputs, closed streams)
//! are dispatched before the event of the operation that caused them.
//!
//! Structural events (scope activation and deactivation) are delivered to
//! the scope's own structure listeners and to those of every enclosing
//! scope.

use crate::graph::PipelineGraph;
use pipewright_core::{BuilderError, ColumnSnapshot, ComponentId, ListenerError, ScopeId, StageKind};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Observes stages of one kind
pub trait ComponentListener: Send + Sync {
    fn on_add(&self, _graph: &PipelineGraph, _component: ComponentId) -> Result<(), ListenerError> {
        Ok(())
    }

    /// The component is gone from the graph; only its label survives
    fn on_remove(&self, _graph: &PipelineGraph, _component: ComponentId, _label: &str) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_configuration_changed(&self, _graph: &PipelineGraph, _component: ComponentId) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_requirement_changed(&self, _graph: &PipelineGraph, _component: ComponentId) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// Observes the source columns of a scope
pub trait SourceColumnListener: Send + Sync {
    fn on_add(&self, _graph: &PipelineGraph, _scope: ScopeId, _column: &ColumnSnapshot) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_remove(&self, _graph: &PipelineGraph, _scope: ScopeId, _column: &ColumnSnapshot) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// Observes output column changes of transformers and analyzers
pub trait OutputColumnListener: Send + Sync {
    fn on_output_changed(
        &self,
        _graph: &PipelineGraph,
        _component: ComponentId,
        _before: &[ColumnSnapshot],
        _after: &[ColumnSnapshot],
    ) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// Observes nested scopes coming and going
pub trait StructureListener: Send + Sync {
    fn on_activation(&self, _graph: &PipelineGraph, _scope: ScopeId) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_deactivation(&self, _graph: &PipelineGraph, _scope: ScopeId) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// A change to the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    SourceColumnAdded {
        scope: ScopeId,
        column: ColumnSnapshot,
    },
    SourceColumnRemoved {
        scope: ScopeId,
        column: ColumnSnapshot,
    },
    ComponentAdded {
        scope: ScopeId,
        component: ComponentId,
        kind: StageKind,
    },
    ComponentRemoved {
        scope: ScopeId,
        component: ComponentId,
        kind: StageKind,
        label: String,
    },
    ComponentChanged {
        scope: ScopeId,
        component: ComponentId,
        kind: StageKind,
    },
    RequirementChanged {
        scope: ScopeId,
        component: ComponentId,
        kind: StageKind,
    },
    OutputColumnsChanged {
        scope: ScopeId,
        component: ComponentId,
        before: Vec<ColumnSnapshot>,
        after: Vec<ColumnSnapshot>,
    },
    ScopeActivated {
        scope: ScopeId,
        parent: Option<ScopeId>,
    },
    ScopeDeactivated {
        scope: ScopeId,
        parent: Option<ScopeId>,
    },
}

impl GraphEvent {
    /// Stable event name used in logs and listener errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::SourceColumnAdded { .. } => "source_column_added",
            Self::SourceColumnRemoved { .. } => "source_column_removed",
            Self::ComponentAdded { .. } => "component_added",
            Self::ComponentRemoved { .. } => "component_removed",
            Self::ComponentChanged { .. } => "component_changed",
            Self::RequirementChanged { .. } => "requirement_changed",
            Self::OutputColumnsChanged { .. } => "output_columns_changed",
            Self::ScopeActivated { .. } => "scope_activated",
            Self::ScopeDeactivated { .. } => "scope_deactivated",
        }
    }

    /// Scope the event happened in
    pub fn scope(&self) -> ScopeId {
        match self {
            Self::SourceColumnAdded { scope, .. }
            | Self::SourceColumnRemoved { scope, .. }
            | Self::ComponentAdded { scope, .. }
            | Self::ComponentRemoved { scope, .. }
            | Self::ComponentChanged { scope, .. }
            | Self::RequirementChanged { scope, .. }
            | Self::OutputColumnsChanged { scope, .. }
            | Self::ScopeActivated { scope, .. }
            | Self::ScopeDeactivated { scope, .. } => *scope,
        }
    }
}

/// Listeners registered on one scope
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    filters: Vec<Arc<dyn ComponentListener>>,
    transformers: Vec<Arc<dyn ComponentListener>>,
    analyzers: Vec<Arc<dyn ComponentListener>>,
    source_columns: Vec<Arc<dyn SourceColumnListener>>,
    output_columns: Vec<Arc<dyn OutputColumnListener>>,
    structure: Vec<Arc<dyn StructureListener>>,
}

impl ListenerRegistry {
    pub(crate) fn components(&self, kind: StageKind) -> &[Arc<dyn ComponentListener>] {
        match kind {
            StageKind::Filter => &self.filters,
            StageKind::Transformer => &self.transformers,
            StageKind::Analyzer => &self.analyzers,
        }
    }

    pub(crate) fn components_mut(&mut self, kind: StageKind) -> &mut Vec<Arc<dyn ComponentListener>> {
        match kind {
            StageKind::Filter => &mut self.filters,
            StageKind::Transformer => &mut self.transformers,
            StageKind::Analyzer => &mut self.analyzers,
        }
    }

    pub(crate) fn source_columns_mut(&mut self) -> &mut Vec<Arc<dyn SourceColumnListener>> {
        &mut self.source_columns
    }

    pub(crate) fn output_columns_mut(&mut self) -> &mut Vec<Arc<dyn OutputColumnListener>> {
        &mut self.output_columns
    }

    pub(crate) fn structure_mut(&mut self) -> &mut Vec<Arc<dyn StructureListener>> {
        &mut self.structure
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
            && self.transformers.is_empty()
            && self.analyzers.is_empty()
            && self.source_columns.is_empty()
            && self.output_columns.is_empty()
            && self.structure.is_empty()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("filters", &self.filters.len())
            .field("transformers", &self.transformers.len())
            .field("analyzers", &self.analyzers.len())
            .field("source_columns", &self.source_columns.len())
            .field("output_columns", &self.output_columns.len())
            .field("structure", &self.structure.len())
            .finish()
    }
}

/// Remove a listener by identity; returns whether it was registered
pub(crate) fn unregister<T: ?Sized>(listeners: &mut Vec<Arc<T>>, listener: &Arc<T>) -> bool {
    let before = listeners.len();
    listeners.retain(|l| !Arc::ptr_eq(l, listener));
    before != listeners.len()
}

/// Listeners of a scope that was closed by the current operation
struct RetiredScope {
    id: ScopeId,
    parent: Option<ScopeId>,
    listeners: ListenerRegistry,
}

/// Events collected by one operation, dispatched once it completes
#[derive(Default)]
pub(crate) struct Notifier {
    events: Vec<GraphEvent>,
    retired: Vec<RetiredScope>,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, event: GraphEvent) {
        self.events.push(event);
    }

    /// Keep the listeners of a closed scope reachable for its deactivation event
    pub(crate) fn retire(&mut self, id: ScopeId, parent: Option<ScopeId>, listeners: ListenerRegistry) {
        self.retired.push(RetiredScope { id, parent, listeners });
    }

    #[cfg(test)]
    pub(crate) fn events(&self) -> &[GraphEvent] {
        &self.events
    }
}

impl PipelineGraph {
    /// Deliver collected events; the first failing callback aborts delivery
    pub(crate) fn dispatch(&self, notifier: Notifier) -> Result<(), BuilderError> {
        let Notifier { events, retired } = notifier;

        for event in &events {
            tracing::trace!(event = event.name(), scope = %event.scope(), "dispatching graph event");
            self.deliver(event, &retired).map_err(|source| {
                tracing::warn!(event = event.name(), error = %source, "listener failed");
                BuilderError::Listener {
                    event: event.name(),
                    source,
                }
            })?;
        }

        Ok(())
    }

    fn deliver(&self, event: &GraphEvent, retired: &[RetiredScope]) -> Result<(), ListenerError> {
        let scope = event.scope();

        match event {
            GraphEvent::SourceColumnAdded { column, .. } => {
                for listener in self.registry_of(scope, retired).map(|r| r.source_columns.as_slice()).unwrap_or(&[]) {
                    listener.on_add(self, scope, column)?;
                }
            }
            GraphEvent::SourceColumnRemoved { column, .. } => {
                for listener in self.registry_of(scope, retired).map(|r| r.source_columns.as_slice()).unwrap_or(&[]) {
                    listener.on_remove(self, scope, column)?;
                }
            }
            GraphEvent::ComponentAdded { component, kind, .. } => {
                for listener in self.component_listeners(scope, *kind, retired) {
                    listener.on_add(self, *component)?;
                }
            }
            GraphEvent::ComponentRemoved {
                component, kind, label, ..
            } => {
                for listener in self.component_listeners(scope, *kind, retired) {
                    listener.on_remove(self, *component, label)?;
                }
            }
            GraphEvent::ComponentChanged { component, kind, .. } => {
                for listener in self.component_listeners(scope, *kind, retired) {
                    listener.on_configuration_changed(self, *component)?;
                }
            }
            GraphEvent::RequirementChanged { component, kind, .. } => {
                for listener in self.component_listeners(scope, *kind, retired) {
                    listener.on_requirement_changed(self, *component)?;
                }
            }
            GraphEvent::OutputColumnsChanged {
                component, before, after, ..
            } => {
                for listener in self.registry_of(scope, retired).map(|r| r.output_columns.as_slice()).unwrap_or(&[]) {
                    listener.on_output_changed(self, *component, before, after)?;
                }
            }
            GraphEvent::ScopeActivated { .. } => {
                for registry in self.enclosing_registries(scope, retired) {
                    for listener in &registry.structure {
                        listener.on_activation(self, scope)?;
                    }
                }
            }
            GraphEvent::ScopeDeactivated { .. } => {
                for registry in self.enclosing_registries(scope, retired) {
                    for listener in &registry.structure {
                        listener.on_deactivation(self, scope)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn registry_of<'a>(&'a self, scope: ScopeId, retired: &'a [RetiredScope]) -> Option<&'a ListenerRegistry> {
        self.scopes
            .get(&scope)
            .map(|s| &s.listeners)
            .or_else(|| retired.iter().find(|r| r.id == scope).map(|r| &r.listeners))
    }

    fn parent_in(&self, scope: ScopeId, retired: &[RetiredScope]) -> Option<ScopeId> {
        match self.scopes.get(&scope) {
            Some(s) => s.parent(),
            None => retired.iter().find(|r| r.id == scope).and_then(|r| r.parent),
        }
    }

    fn component_listeners<'a>(
        &'a self,
        scope: ScopeId,
        kind: StageKind,
        retired: &'a [RetiredScope],
    ) -> &'a [Arc<dyn ComponentListener>] {
        self.registry_of(scope, retired)
            .map(|r| r.components(kind))
            .unwrap_or(&[])
    }

    /// The scope's registry followed by those of its ancestors
    fn enclosing_registries<'a>(&'a self, scope: ScopeId, retired: &'a [RetiredScope]) -> Vec<&'a ListenerRegistry> {
        let mut registries = Vec::new();
        let mut current = Some(scope);

        while let Some(id) = current {
            if let Some(registry) = self.registry_of(id, retired) {
                registries.push(registry);
            }
            current = self.parent_in(id, retired);
        }

        registries
    }
}

/// One notification as seen by an [`EventLog`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    /// Event name, as returned by [`GraphEvent::name`]
    pub event: &'static str,

    /// Component, scope or column the notification is about
    pub subject: String,
}

impl LoggedEvent {
    fn new(event: &'static str, subject: impl fmt::Display) -> Self {
        Self {
            event,
            subject: subject.to_string(),
        }
    }
}

/// Listener recording every notification it receives, in delivery order
///
/// Register it on any combination of listener kinds to mirror graph
/// changes into another model.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<LoggedEvent>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, event: LoggedEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<LoggedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Event names in delivery order
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.event).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl ComponentListener for EventLog {
    fn on_add(&self, _graph: &PipelineGraph, component: ComponentId) -> Result<(), ListenerError> {
        self.record(LoggedEvent::new("component_added", component));
        Ok(())
    }

    fn on_remove(&self, _graph: &PipelineGraph, _component: ComponentId, label: &str) -> Result<(), ListenerError> {
        self.record(LoggedEvent::new("component_removed", label));
        Ok(())
    }

    fn on_configuration_changed(&self, _graph: &PipelineGraph, component: ComponentId) -> Result<(), ListenerError> {
        self.record(LoggedEvent::new("component_changed", component));
        Ok(())
    }

    fn on_requirement_changed(&self, _graph: &PipelineGraph, component: ComponentId) -> Result<(), ListenerError> {
        self.record(LoggedEvent::new("requirement_changed", component));
        Ok(())
    }
}

impl SourceColumnListener for EventLog {
    fn on_add(&self, _graph: &PipelineGraph, _scope: ScopeId, column: &ColumnSnapshot) -> Result<(), ListenerError> {
        self.record(LoggedEvent::new("source_column_added", &column.name));
        Ok(())
    }

    fn on_remove(&self, _graph: &PipelineGraph, _scope: ScopeId, column: &ColumnSnapshot) -> Result<(), ListenerError> {
        self.record(LoggedEvent::new("source_column_removed", &column.name));
        Ok(())
    }
}

impl OutputColumnListener for EventLog {
    fn on_output_changed(
        &self,
        _graph: &PipelineGraph,
        _component: ComponentId,
        before: &[ColumnSnapshot],
        after: &[ColumnSnapshot],
    ) -> Result<(), ListenerError> {
        let names = |columns: &[ColumnSnapshot]| {
            columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
        };
        self.record(LoggedEvent::new(
            "output_columns_changed",
            format!("[{}] -> [{}]", names(before), names(after)),
        ));
        Ok(())
    }
}

impl StructureListener for EventLog {
    fn on_activation(&self, _graph: &PipelineGraph, scope: ScopeId) -> Result<(), ListenerError> {
        self.record(LoggedEvent::new("scope_activated", scope));
        Ok(())
    }

    fn on_deactivation(&self, _graph: &PipelineGraph, scope: ScopeId) -> Result<(), ListenerError> {
        self.record(LoggedEvent::new("scope_deactivated", scope));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl StructureListener for Noop {}

    #[test]
    fn unregister_matches_by_identity() {
        let first: Arc<dyn StructureListener> = Arc::new(Noop);
        let second: Arc<dyn StructureListener> = Arc::new(Noop);
        let mut listeners = vec![Arc::clone(&first), Arc::clone(&second)];

        assert!(unregister(&mut listeners, &first));
        assert_eq!(listeners.len(), 1);
        assert!(Arc::ptr_eq(&listeners[0], &second));
        assert!(!unregister(&mut listeners, &first));
    }

    #[test]
    fn notifier_keeps_push_order() {
        let mut notifier = Notifier::new();
        notifier.push(GraphEvent::ScopeActivated {
            scope: ScopeId::new(2),
            parent: Some(ScopeId::new(1)),
        });
        notifier.push(GraphEvent::ScopeDeactivated {
            scope: ScopeId::new(2),
            parent: Some(ScopeId::new(1)),
        });

        let names: Vec<_> = notifier.events().iter().map(GraphEvent::name).collect();
        assert_eq!(names, vec!["scope_activated", "scope_deactivated"]);
        assert_eq!(notifier.events()[0].scope(), ScopeId::new(2));
    }
}
