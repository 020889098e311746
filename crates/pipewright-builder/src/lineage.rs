//! Column lineage between the components of one scope
//!
//! A component depends on another when it consumes one of its virtual
//! output columns. The graph is rebuilt from the current bindings whenever
//! it is needed, so it never drifts from the component state.

use crate::component::ComponentBuilder;
use pipewright_core::{Column, ColumnId, ComponentId};
use std::collections::{HashMap, HashSet, VecDeque};

/// Producer/consumer edges between the components of a scope
#[derive(Debug, Clone, Default)]
pub struct LineageGraph {
    /// consumer -> producers it reads from
    parents: HashMap<ComponentId, Vec<ComponentId>>,

    /// producer -> consumers reading from it
    children: HashMap<ComponentId, Vec<ComponentId>>,

    /// Components in insertion order
    nodes: Vec<ComponentId>,
}

impl LineageGraph {
    /// Build the lineage of `components` given a column lookup
    pub(crate) fn build<'a, I, F>(components: I, column: F) -> Self
    where
        I: IntoIterator<Item = &'a ComponentBuilder>,
        F: Fn(ColumnId) -> Option<&'a Column>,
    {
        let mut graph = Self::default();

        for component in components {
            graph.nodes.push(component.id());

            for input in component.input_columns() {
                let producer = input
                    .column_id()
                    .and_then(&column)
                    .and_then(Column::as_virtual)
                    .map(|c| c.producer());

                if let Some(producer) = producer {
                    let parents = graph.parents.entry(component.id()).or_default();
                    if !parents.contains(&producer) {
                        parents.push(producer);
                        graph.children.entry(producer).or_default().push(component.id());
                    }
                }
            }
        }

        graph
    }

    pub fn parents(&self, component: ComponentId) -> &[ComponentId] {
        self.parents.get(&component).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children(&self, component: ComponentId) -> &[ComponentId] {
        self.children.get(&component).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every component transitively consuming the outputs of `component`
    pub fn downstream(&self, component: ComponentId) -> Vec<ComponentId> {
        Self::walk(component, &self.children)
    }

    /// Every component whose outputs `component` transitively consumes
    pub fn upstream(&self, component: ComponentId) -> Vec<ComponentId> {
        Self::walk(component, &self.parents)
    }

    fn walk(start: ComponentId, edges: &HashMap<ComponentId, Vec<ComponentId>>) -> Vec<ComponentId> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<ComponentId> = edges.get(&start).into_iter().flatten().copied().collect();
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current);

            if let Some(next) = edges.get(&current) {
                queue.extend(next.iter().filter(|n| !visited.contains(*n)));
            }
        }

        result
    }

    /// Producers before consumers; ties keep insertion order.
    /// `None` if the bindings form a cycle.
    pub fn topological_sort(&self) -> Option<Vec<ComponentId>> {
        let mut in_degree: HashMap<ComponentId, usize> = self
            .nodes
            .iter()
            .map(|node| (*node, self.parents(*node).len()))
            .collect();

        let mut queue: VecDeque<ComponentId> = self
            .nodes
            .iter()
            .filter(|node| in_degree.get(*node) == Some(&0))
            .copied()
            .collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        // Kahn's algorithm
        while let Some(node) = queue.pop_front() {
            result.push(node);

            for child in self.children(node) {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }

        (result.len() == self.nodes.len()).then_some(result)
    }
}
