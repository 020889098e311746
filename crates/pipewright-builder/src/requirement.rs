//! Requirement graph: which filter outcomes gate which components
//!
//! A component's effective requirement is its explicit requirement or,
//! failing that, the scope's default requirement. The default is never
//! applied to a filter the default itself (transitively) depends on, which
//! keeps defaults from introducing cycles.

use crate::graph::PipelineGraph;
use crate::listener::{GraphEvent, Notifier};
use crate::scope::PipelineBuilder;
use pipewright_core::{BuilderError, ComponentId, Requirement, ScopeId, StageKind};
use std::collections::HashSet;

/// Read-only view of the requirements of one scope
pub(crate) struct RequirementGraph<'a> {
    graph: &'a PipelineGraph,
    scope: &'a PipelineBuilder,
    default_closure: HashSet<ComponentId>,
}

impl<'a> RequirementGraph<'a> {
    pub(crate) fn new(graph: &'a PipelineGraph, scope: ScopeId) -> Result<Self, BuilderError> {
        let scope = graph.scope(scope)?;
        let mut view = Self {
            graph,
            scope,
            default_closure: HashSet::new(),
        };
        view.default_closure = view.closure_of_default();
        Ok(view)
    }

    fn explicit(&self, component: ComponentId) -> Option<&'a Requirement> {
        self.graph
            .components
            .get(&component)
            .and_then(|c| c.requirement())
    }

    /// Filters the default requirement depends on, following explicit edges
    fn closure_of_default(&self) -> HashSet<ComponentId> {
        let mut closure = HashSet::new();
        let mut stack: Vec<ComponentId> = self
            .scope
            .default_requirement()
            .map(Requirement::filters)
            .unwrap_or_default();

        while let Some(filter) = stack.pop() {
            if closure.insert(filter) {
                if let Some(requirement) = self.explicit(filter) {
                    stack.extend(requirement.filters());
                }
            }
        }
        closure
    }

    pub(crate) fn effective(&self, component: ComponentId) -> Option<&'a Requirement> {
        self.explicit(component).or_else(|| {
            if self.default_closure.contains(&component) {
                None
            } else {
                self.scope.default_requirement()
            }
        })
    }

    /// Whether following effective requirements from `starts` reaches `target`
    pub(crate) fn reaches(&self, starts: Vec<ComponentId>, target: ComponentId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = starts;

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if visited.insert(current) {
                if let Some(requirement) = self.effective(current) {
                    stack.extend(requirement.filters());
                }
            }
        }
        false
    }
}

impl PipelineGraph {
    /// Explicit requirement, else the scope default where it applies
    pub fn effective_requirement(&self, component: ComponentId) -> Result<Option<Requirement>, BuilderError> {
        let scope = self.component(component)?.scope();
        Ok(RequirementGraph::new(self, scope)?.effective(component).cloned())
    }

    /// Set (or clear with `None`) the explicit requirement of a component
    ///
    /// Fails with [`BuilderError::CyclicRequirement`] when the referenced
    /// filters already depend on this component; the graph is unchanged.
    pub fn set_requirement(
        &mut self,
        component: ComponentId,
        requirement: Option<Requirement>,
    ) -> Result<(), BuilderError> {
        let builder = self.component(component)?;
        let scope = builder.scope();
        let kind = builder.kind();
        let label = builder.label();

        if let Some(requirement) = &requirement {
            self.check_requirement(scope, &label, requirement)?;

            let graph = RequirementGraph::new(self, scope)?;
            if graph.reaches(requirement.filters(), component) {
                let requirement = self.describe_requirement(requirement);
                tracing::warn!(component = %component, requirement = %requirement, "rejected cyclic requirement");
                return Err(BuilderError::CyclicRequirement {
                    stage: label,
                    requirement,
                });
            }
        }

        if let Some(builder) = self.components.get_mut(&component) {
            builder.set_requirement(requirement);
        }

        let mut notifier = Notifier::new();
        notifier.push(GraphEvent::RequirementChanged { scope, component, kind });
        tracing::debug!(component = %component, "requirement changed");
        self.dispatch(notifier)
    }

    /// Set (or clear) the requirement applied to components without one
    pub fn set_default_requirement(
        &mut self,
        scope: ScopeId,
        requirement: Option<Requirement>,
    ) -> Result<(), BuilderError> {
        if let Some(requirement) = &requirement {
            let label = self.scope_path(scope);
            self.check_requirement(scope, &label, requirement)?;
        }

        self.scope_mut(scope)?.set_default_requirement(requirement);

        let mut notifier = Notifier::new();
        self.notify_defaulted(scope, &mut notifier);
        self.dispatch(notifier)
    }

    /// Components of the scope other than `filter` that are not gated by
    /// any of its outcomes, neither explicitly nor through the default
    pub fn available_unfiltered_components(&self, filter: ComponentId) -> Result<Vec<ComponentId>, BuilderError> {
        let builder = self.component(filter)?;
        if builder.kind() != StageKind::Filter {
            return Err(BuilderError::StageKindMismatch {
                stage: builder.label(),
                expected: StageKind::Filter,
                actual: builder.kind(),
            });
        }

        let scope = builder.scope();
        let graph = RequirementGraph::new(self, scope)?;
        Ok(self
            .scope(scope)?
            .components()
            .iter()
            .copied()
            .filter(|id| *id != filter)
            .filter(|id| !graph.effective(*id).is_some_and(|r| r.references(filter)))
            .collect())
    }

    /// Drop every requirement referencing a filter that is going away
    pub(crate) fn clear_requirements_on(&mut self, scope: ScopeId, filter: ComponentId, notifier: &mut Notifier) {
        let Some(builder) = self.scopes.get(&scope) else {
            return;
        };
        let default_cleared = builder.default_requirement().is_some_and(|r| r.references(filter));
        let dependents: Vec<ComponentId> = builder
            .components()
            .iter()
            .copied()
            .filter(|id| {
                self.components
                    .get(id)
                    .and_then(|c| c.requirement())
                    .is_some_and(|r| r.references(filter))
            })
            .collect();

        for id in dependents {
            if let Some(component) = self.components.get_mut(&id) {
                component.set_requirement(None);
                notifier.push(GraphEvent::RequirementChanged {
                    scope,
                    component: id,
                    kind: component.kind(),
                });
                tracing::debug!(component = %id, filter = %filter, "cleared requirement on removed filter");
            }
        }

        if default_cleared {
            if let Some(builder) = self.scopes.get_mut(&scope) {
                builder.set_default_requirement(None);
            }
            self.notify_defaulted(scope, notifier);
        }
    }

    /// Components whose effective requirement follows the scope default
    fn notify_defaulted(&self, scope: ScopeId, notifier: &mut Notifier) {
        let Some(builder) = self.scopes.get(&scope) else {
            return;
        };
        for id in builder.components() {
            if let Some(component) = self.components.get(id).filter(|c| c.requirement().is_none()) {
                notifier.push(GraphEvent::RequirementChanged {
                    scope,
                    component: *id,
                    kind: component.kind(),
                });
            }
        }
    }

    fn check_requirement(&self, scope: ScopeId, stage: &str, requirement: &Requirement) -> Result<(), BuilderError> {
        let invalid = |reason: String| BuilderError::InvalidRequirement {
            stage: stage.to_string(),
            reason,
        };

        for outcome in requirement.outcomes() {
            let filter = self
                .components
                .get(&outcome.filter)
                .ok_or_else(|| invalid(format!("{} does not exist", outcome.filter)))?;

            if filter.scope() != scope {
                return Err(invalid(format!("'{}' belongs to another pipeline", filter.label())));
            }
            if filter.kind() != StageKind::Filter {
                return Err(invalid(format!("'{}' is a {}, not a filter", filter.label(), filter.kind())));
            }
            if !filter.descriptor().outcomes().iter().any(|o| *o == outcome.category) {
                return Err(invalid(format!(
                    "'{}' has no outcome '{}'",
                    filter.label(),
                    outcome.category
                )));
            }
        }
        Ok(())
    }

    /// Requirement with filter labels instead of ids
    pub(crate) fn describe_requirement(&self, requirement: &Requirement) -> String {
        requirement
            .outcomes()
            .iter()
            .map(|o| format!("{}={}", self.label_of(o.filter), o.category))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}
