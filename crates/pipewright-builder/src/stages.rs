//! Adding and removing stages, closing scopes

use crate::component::ComponentBuilder;
use crate::graph::PipelineGraph;
use crate::listener::{GraphEvent, Notifier};
use crate::scope::{PipelineBuilder, ScopeOrigin};
use pipewright_catalog::StageDescriptor;
use pipewright_core::{BuilderError, ComponentId, ScopeId, StageKind};
use std::sync::Arc;

impl PipelineGraph {
    pub fn add_filter(
        &mut self,
        scope: ScopeId,
        descriptor: Arc<dyn StageDescriptor>,
    ) -> Result<ComponentId, BuilderError> {
        self.add_stage(scope, descriptor, Some(StageKind::Filter))
    }

    pub fn add_transformer(
        &mut self,
        scope: ScopeId,
        descriptor: Arc<dyn StageDescriptor>,
    ) -> Result<ComponentId, BuilderError> {
        self.add_stage(scope, descriptor, Some(StageKind::Transformer))
    }

    pub fn add_analyzer(
        &mut self,
        scope: ScopeId,
        descriptor: Arc<dyn StageDescriptor>,
    ) -> Result<ComponentId, BuilderError> {
        self.add_stage(scope, descriptor, Some(StageKind::Analyzer))
    }

    /// Add a stage of whatever kind its descriptor declares
    pub fn add_component(
        &mut self,
        scope: ScopeId,
        descriptor: Arc<dyn StageDescriptor>,
    ) -> Result<ComponentId, BuilderError> {
        self.add_stage(scope, descriptor, None)
    }

    /// Add a stage looked up in the attached descriptor provider
    pub fn add_component_by_name(&mut self, scope: ScopeId, name: &str) -> Result<ComponentId, BuilderError> {
        let descriptor = self
            .descriptors
            .as_ref()
            .and_then(|provider| provider.descriptor(name))
            .ok_or_else(|| BuilderError::UnknownDescriptor(name.to_string()))?;

        self.add_component(scope, descriptor)
    }

    fn add_stage(
        &mut self,
        scope: ScopeId,
        descriptor: Arc<dyn StageDescriptor>,
        expected: Option<StageKind>,
    ) -> Result<ComponentId, BuilderError> {
        self.scope(scope)?;
        let kind = descriptor.kind();
        if let Some(expected) = expected.filter(|e| *e != kind) {
            return Err(BuilderError::StageKindMismatch {
                stage: descriptor.name().to_string(),
                expected,
                actual: kind,
            });
        }

        let id = self.ids.component();
        let mut component = ComponentBuilder::new(id, scope, Arc::clone(&descriptor));
        let mut notifier = Notifier::new();

        for stream in descriptor.output_streams() {
            let child = self.ids.scope();
            self.scopes
                .insert(child, PipelineBuilder::stream(child, scope, id, stream.name.clone()));
            component.add_output_stream(stream.name.clone(), child);
            notifier.push(GraphEvent::ScopeActivated {
                scope: child,
                parent: Some(scope),
            });
        }

        self.components.insert(id, component);
        self.scope_mut(scope)?.push_component(id);

        // Stages without required slots are configured from the start
        self.refresh_outputs(id, &mut notifier);

        notifier.push(GraphEvent::ComponentAdded { scope, component: id, kind });
        tracing::debug!(scope = %scope, component = %id, kind = %kind, stage = descriptor.name(), "added stage");

        self.dispatch(notifier)?;
        Ok(id)
    }

    pub fn remove_filter(&mut self, component: ComponentId) -> Result<(), BuilderError> {
        self.remove_stage(component, Some(StageKind::Filter))
    }

    pub fn remove_transformer(&mut self, component: ComponentId) -> Result<(), BuilderError> {
        self.remove_stage(component, Some(StageKind::Transformer))
    }

    pub fn remove_analyzer(&mut self, component: ComponentId) -> Result<(), BuilderError> {
        self.remove_stage(component, Some(StageKind::Analyzer))
    }

    pub fn remove_component(&mut self, component: ComponentId) -> Result<(), BuilderError> {
        self.remove_stage(component, None)
    }

    /// Remove a stage: requirements on a removed filter are cleared, output
    /// columns are destroyed and unbound downstream, output stream scopes
    /// are closed.
    fn remove_stage(&mut self, id: ComponentId, expected: Option<StageKind>) -> Result<(), BuilderError> {
        let component = self.component(id)?;
        let kind = component.kind();
        let scope = component.scope();
        let label = component.label();
        let streams: Vec<ScopeId> = component.output_streams().iter().map(|(_, s)| *s).collect();

        if let Some(expected) = expected.filter(|e| *e != kind) {
            return Err(BuilderError::StageKindMismatch {
                stage: label,
                expected,
                actual: kind,
            });
        }

        let mut notifier = Notifier::new();

        if kind == StageKind::Filter {
            self.clear_requirements_on(scope, id, &mut notifier);
        }

        let before = self.component(id)?.output_columns().to_vec();
        let before = self.snapshots(&before);
        self.destroy_outputs(id, &mut notifier);
        if !before.is_empty() {
            notifier.push(GraphEvent::OutputColumnsChanged {
                scope,
                component: id,
                before,
                after: Vec::new(),
            });
        }

        for stream in streams {
            self.close_scope(stream, &mut notifier);
        }

        self.components.remove(&id);
        self.scope_mut(scope)?.remove_component(id);

        notifier.push(GraphEvent::ComponentRemoved {
            scope,
            component: id,
            kind,
            label: label.clone(),
        });
        tracing::debug!(scope = %scope, component = %id, stage = %label, "removed stage");

        self.dispatch(notifier)
    }

    /// Close a scope and everything nested in it
    ///
    /// Closing a scope that no longer exists does nothing. Closing a stream
    /// scope detaches it from its owning stage.
    pub fn close(&mut self, scope: ScopeId) -> Result<(), BuilderError> {
        if !self.scopes.contains_key(&scope) {
            return Ok(());
        }

        let mut notifier = Notifier::new();
        self.close_scope(scope, &mut notifier);
        self.dispatch(notifier)
    }

    /// Depth first: nested stream scopes deactivate before their parent
    pub(crate) fn close_scope(&mut self, scope: ScopeId, notifier: &mut Notifier) {
        let Some(builder) = self.scopes.get(&scope) else {
            return;
        };

        let children: Vec<ScopeId> = builder
            .components()
            .iter()
            .filter_map(|id| self.components.get(id))
            .flat_map(|c| c.output_streams().iter().map(|(_, s)| *s))
            .collect();
        for child in children {
            self.close_scope(child, notifier);
        }

        let Some(builder) = self.scopes.remove(&scope) else {
            return;
        };

        for id in builder.components() {
            if let Some(component) = self.components.remove(id) {
                for column in component.output_columns() {
                    self.columns.remove(column);
                }
            }
        }
        for column in builder.source_columns() {
            self.columns.remove(column);
        }

        if let ScopeOrigin::Stream { owner, .. } = builder.origin() {
            if let Some(owner) = self.components.get_mut(owner) {
                owner.detach_output_stream(scope);
            }
        }

        let parent = builder.parent();
        notifier.retire(scope, parent, builder.into_listeners());
        notifier.push(GraphEvent::ScopeDeactivated { scope, parent });
        tracing::debug!(scope = %scope, "closed scope");
    }
}

#[cfg(test)]
mod tests {
    use crate::listener::EventLog;
    use crate::testing::customers_graph;
    use pipewright_catalog::{builtin, DescriptorRegistry};
    use pipewright_core::{BuilderError, StageKind};
    use std::sync::Arc;

    #[test]
    fn kind_checked_add_and_remove() {
        let mut graph = customers_graph();
        let root = graph.root();

        let err = graph.add_filter(root, builtin::string_length()).unwrap_err();
        assert!(matches!(
            err,
            BuilderError::StageKindMismatch {
                expected: StageKind::Filter,
                actual: StageKind::Transformer,
                ..
            }
        ));

        let length = graph.add_component(root, builtin::string_length()).unwrap();
        assert!(matches!(
            graph.remove_analyzer(length),
            Err(BuilderError::StageKindMismatch { .. })
        ));
        graph.remove_transformer(length).unwrap();
        assert!(matches!(
            graph.remove_transformer(length),
            Err(BuilderError::UnknownComponent(_))
        ));
    }

    #[test]
    fn add_by_name_uses_the_descriptor_provider() {
        let mut graph = customers_graph();
        let root = graph.root();
        assert!(matches!(
            graph.add_component_by_name(root, builtin::TOKENIZER),
            Err(BuilderError::UnknownDescriptor(_))
        ));

        let mut graph = customers_graph().with_descriptors(Arc::new(builtin::registry()));
        let root = graph.root();
        let tokenizer = graph.add_component_by_name(root, builtin::TOKENIZER).unwrap();
        assert_eq!(graph.component(tokenizer).unwrap().kind(), StageKind::Transformer);

        let mut empty = customers_graph().with_descriptors(Arc::new(DescriptorRegistry::new()));
        let root = empty.root();
        assert!(matches!(
            empty.add_component_by_name(root, builtin::TOKENIZER),
            Err(BuilderError::UnknownDescriptor(_))
        ));
    }

    #[test]
    fn stages_with_streams_open_child_scopes() {
        let mut graph = customers_graph();
        let root = graph.root();
        let log = EventLog::new();
        graph.add_structure_listener(root, log.clone()).unwrap();

        let splitter = graph.add_transformer(root, builtin::conditional_splitter()).unwrap();
        let matches = graph.output_stream(splitter, "matches").unwrap();
        let others = graph.output_stream(splitter, "others").unwrap();

        assert_eq!(graph.parent_of(matches).unwrap(), Some(root));
        assert_eq!(graph.root_of(others).unwrap(), root);
        assert!(graph.scope(matches).unwrap().is_stream());
        assert_eq!(log.names(), vec!["scope_activated", "scope_activated"]);

        graph.remove_transformer(splitter).unwrap();
        assert!(graph.scope(matches).is_err());
        assert!(graph.scope(others).is_err());
        assert_eq!(log.names()[2..], ["scope_deactivated", "scope_deactivated"]);
    }

    #[test]
    fn closing_is_idempotent() {
        let mut graph = customers_graph();
        let root = graph.root();
        let splitter = graph.add_transformer(root, builtin::conditional_splitter()).unwrap();
        let matches = graph.output_stream(splitter, "matches").unwrap();

        graph.close(matches).unwrap();
        graph.close(matches).unwrap();
        assert!(graph.component(splitter).unwrap().output_stream("matches").is_none());
        assert!(graph.output_stream(splitter, "others").is_ok());
    }
}
