//! Pipeline definition files
//!
//! A definition lists the source columns of the root pipeline and its
//! stages in insertion order. Importing one replays it through the public
//! graph operations, so every check the builder performs applies to
//! imported pipelines as well.
//!
//! ```toml
//! sources = ["crm.contacts.email", "age"]
//!
//! [[stages]]
//! id = "adults"
//! descriptor = "Number range"
//! inputs = { column = ["age"] }
//! properties = { "lowest value" = 18, "highest value" = 130 }
//!
//! [[stages]]
//! id = "profile"
//! descriptor = "Value distribution"
//! inputs = { columns = ["email"] }
//! requires = [{ stage = "adults", outcome = "VALID" }]
//! ```

use anyhow::{anyhow, bail, Context, Result};
use pipewright_builder::PipelineGraph;
use pipewright_core::{ComponentId, InputRef, Outcome, Requirement, ScopeId, TypeFamily};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Root of a definition file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineDefinition {
    /// Catalog file, relative to the definition
    #[serde(default)]
    pub catalog: Option<String>,

    /// Source column paths; bare names resolve against the first table used
    #[serde(default)]
    pub sources: Vec<String>,

    /// Requirement applied to stages of the root pipeline without one
    #[serde(default)]
    pub default_requirement: Vec<OutcomeDefinition>,

    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

/// One stage of the pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct StageDefinition {
    /// Key other stages use to refer to this one
    pub id: String,

    /// Descriptor name, e.g. `String length`
    pub descriptor: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Output stream the stage is placed in, as `<stage id>/<stream>`
    #[serde(default)]
    pub stream: Option<String>,

    /// Column slots and the inputs bound to them
    #[serde(default)]
    pub inputs: BTreeMap<String, Vec<InputDefinition>>,

    /// Value slots
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,

    /// Generated output name to the name it should carry instead
    #[serde(default)]
    pub rename: BTreeMap<String, String>,

    #[serde(default)]
    pub requires: Vec<OutcomeDefinition>,
}

/// A bound input: a visible column name, a constant or an expression
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InputDefinition {
    Column(String),
    Constant {
        constant: String,
        #[serde(default)]
        family: Option<TypeFamily>,
    },
    Expression {
        expression: String,
        #[serde(default)]
        family: Option<TypeFamily>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutcomeDefinition {
    pub stage: String,
    pub outcome: String,
}

impl PipelineDefinition {
    /// Load a definition, TOML or JSON depending on the extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline definition {}", path.display()))?;

        let definition = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents)?
        } else {
            Self::from_toml(&contents)?
        };
        Ok(definition)
    }

    pub fn from_toml(toml: &str) -> Result<Self> {
        toml::from_str(toml).context("Failed to parse pipeline definition")
    }

    /// Replay the definition on an empty graph
    pub fn apply(&self, graph: &mut PipelineGraph) -> Result<()> {
        let root = graph.root();
        if !self.sources.is_empty() {
            graph.add_source_columns(root, &self.sources)?;
        }

        let mut stages: HashMap<&str, ComponentId> = HashMap::new();
        for stage in &self.stages {
            if stages.contains_key(stage.id.as_str()) {
                bail!("Stage id '{}' is defined twice", stage.id);
            }
            let scope = match &stage.stream {
                Some(stream) => stream_scope(graph, &stages, stream)?,
                None => root,
            };

            let component = add_stage(graph, scope, stage).with_context(|| format!("In stage '{}'", stage.id))?;
            stages.insert(stage.id.as_str(), component);
        }

        // Requirements may point at stages defined later on
        for stage in &self.stages {
            if stage.requires.is_empty() {
                continue;
            }
            let component = stages[stage.id.as_str()];
            let requirement = requirement(&stages, &stage.requires)?;
            graph
                .set_requirement(component, requirement)
                .with_context(|| format!("In stage '{}'", stage.id))?;
        }

        if !self.default_requirement.is_empty() {
            let requirement = requirement(&stages, &self.default_requirement)?;
            graph.set_default_requirement(root, requirement)?;
        }

        tracing::debug!(stages = stages.len(), sources = self.sources.len(), "imported pipeline definition");
        Ok(())
    }
}

fn add_stage(graph: &mut PipelineGraph, scope: ScopeId, stage: &StageDefinition) -> Result<ComponentId> {
    let component = graph.add_component_by_name(scope, &stage.descriptor)?;
    if stage.name.is_some() {
        graph.set_component_name(component, stage.name.clone())?;
    }

    for (property, value) in &stage.properties {
        graph.set_configured_property(component, property, value.clone())?;
    }

    for (slot, inputs) in &stage.inputs {
        let inputs = inputs
            .iter()
            .map(|input| resolve_input(graph, component, input))
            .collect::<Result<Vec<_>>>()?;
        graph.bind(component, slot, inputs)?;
    }

    for (generated, name) in &stage.rename {
        let column = graph
            .component(component)?
            .output_columns()
            .iter()
            .copied()
            .find(|id| graph.column_name(*id) == Some(generated.as_str()))
            .ok_or_else(|| anyhow!("No output column named '{}'", generated))?;
        graph.rename_column(column, name.clone())?;
    }

    Ok(component)
}

fn resolve_input(graph: &PipelineGraph, component: ComponentId, input: &InputDefinition) -> Result<InputRef> {
    match input {
        InputDefinition::Column(name) => graph
            .available_input_columns(component, None)?
            .into_iter()
            .find(|id| graph.column_name(*id) == Some(name.as_str()))
            .map(InputRef::from)
            .ok_or_else(|| anyhow!("No column named '{}' is available", name)),
        InputDefinition::Constant { constant, family } => {
            Ok(InputRef::constant(constant.clone(), family.unwrap_or(TypeFamily::String)))
        }
        InputDefinition::Expression { expression, family } => {
            Ok(InputRef::expression(expression.clone(), family.unwrap_or(TypeFamily::Unknown)))
        }
    }
}

fn stream_scope(graph: &PipelineGraph, stages: &HashMap<&str, ComponentId>, stream: &str) -> Result<ScopeId> {
    let (owner, name) = stream
        .split_once('/')
        .ok_or_else(|| anyhow!("Stream '{}' must be written as <stage id>/<stream>", stream))?;
    let owner = stages
        .get(owner)
        .ok_or_else(|| anyhow!("Stream '{}' refers to unknown stage '{}'", stream, owner))?;

    Ok(graph.output_stream(*owner, name)?)
}

fn requirement(stages: &HashMap<&str, ComponentId>, outcomes: &[OutcomeDefinition]) -> Result<Option<Requirement>> {
    let outcomes = outcomes
        .iter()
        .map(|o| {
            stages
                .get(o.stage.as_str())
                .map(|filter| Outcome::new(*filter, o.outcome.clone()))
                .ok_or_else(|| anyhow!("Requirement refers to unknown stage '{}'", o.stage))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((!outcomes.is_empty()).then(|| Requirement::all(outcomes)))
}
