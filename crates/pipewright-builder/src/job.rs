//! Immutable pipeline jobs
//!
//! A [`Job`] is the compiled form of a pipeline scope. Every reference in
//! it is positional (column index, stage index within its kind), so two
//! graphs built through equivalent operation sequences compile to equal
//! jobs with equal hashes and fingerprints.

use pipewright_core::{ConstantColumn, ExpressionColumn, LogicalType, StageKind, TableIdentifier, TypeFamily};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::hash::{Hash, Hasher};

/// Position of a stage within the job: kind plus index among that kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageRef {
    pub kind: StageKind,
    pub index: usize,
}

/// Where a job column comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum JobColumnOrigin {
    Table {
        table: TableIdentifier,
        logical_type: LogicalType,
    },
    Stream {
        logical_type: LogicalType,
    },
    Produced {
        producer: StageRef,
    },
}

/// A column of the job, identified by its index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobColumn {
    pub index: usize,
    pub name: String,
    pub family: TypeFamily,
    pub origin: JobColumnOrigin,
}

/// An input as referenced by a stage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobInput {
    Column { index: usize },
    Constant(ConstantColumn),
    Expression(ExpressionColumn),
}

/// Literal property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Literal(pub serde_json::Value);

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Maps serialize in key order, so equal values print equally
        self.0.to_string().hash(state);
    }
}

/// Value assigned to one property slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum JobValue {
    Columns(Vec<JobInput>),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobProperty {
    pub name: String,
    pub value: JobValue,
}

/// One filter outcome a stage requires; `filter` indexes [`Job::filters`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobOutcome {
    pub filter: usize,
    pub category: String,
}

/// A nested job fed by one output stream of a stage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputStreamJob {
    pub name: String,
    pub job: Job,
}

/// One configured stage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentJob {
    pub(crate) stage: StageRef,
    pub(crate) descriptor: String,
    pub(crate) name: Option<String>,
    pub(crate) properties: Vec<JobProperty>,
    pub(crate) inputs: Vec<JobInput>,
    pub(crate) outputs: Vec<usize>,
    pub(crate) requirement: Vec<JobOutcome>,
    pub(crate) output_streams: Vec<OutputStreamJob>,
}

impl ComponentJob {
    pub fn stage(&self) -> StageRef {
        self.stage
    }

    pub fn kind(&self) -> StageKind {
        self.stage.kind
    }

    /// Descriptor name
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Every set property, in slot declaration order
    pub fn properties(&self) -> &[JobProperty] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&JobValue> {
        self.properties.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    /// Union of every column property
    pub fn inputs(&self) -> &[JobInput] {
        &self.inputs
    }

    /// Indexes of the produced columns
    pub fn outputs(&self) -> &[usize] {
        &self.outputs
    }

    /// Effective requirement; empty means unconditional
    pub fn requirement(&self) -> &[JobOutcome] {
        &self.requirement
    }

    pub fn output_streams(&self) -> &[OutputStreamJob] {
        &self.output_streams
    }

    pub fn output_stream(&self, name: &str) -> Option<&Job> {
        self.output_streams.iter().find(|s| s.name == name).map(|s| &s.job)
    }
}

/// Compiled pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Job {
    pub(crate) columns: Vec<JobColumn>,
    pub(crate) source_columns: Vec<usize>,
    pub(crate) filters: Vec<ComponentJob>,
    pub(crate) transformers: Vec<ComponentJob>,
    pub(crate) analyzers: Vec<ComponentJob>,
}

impl Job {
    /// Every column of the job, sources first
    pub fn columns(&self) -> &[JobColumn] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&JobColumn> {
        self.columns.get(index)
    }

    /// Source columns in the order they were added
    pub fn source_columns(&self) -> impl Iterator<Item = &JobColumn> {
        self.source_columns.iter().filter_map(|i| self.columns.get(*i))
    }

    pub fn filters(&self) -> &[ComponentJob] {
        &self.filters
    }

    pub fn transformers(&self) -> &[ComponentJob] {
        &self.transformers
    }

    pub fn analyzers(&self) -> &[ComponentJob] {
        &self.analyzers
    }

    pub fn stages(&self, kind: StageKind) -> &[ComponentJob] {
        match kind {
            StageKind::Filter => &self.filters,
            StageKind::Transformer => &self.transformers,
            StageKind::Analyzer => &self.analyzers,
        }
    }

    pub fn stage(&self, stage: StageRef) -> Option<&ComponentJob> {
        self.stages(stage.kind).get(stage.index)
    }

    /// Number of stages, nested stream jobs included
    pub fn stage_count(&self) -> usize {
        [&self.filters, &self.transformers, &self.analyzers]
            .into_iter()
            .flatten()
            .map(|c| 1 + c.output_streams.iter().map(|s| s.job.stage_count()).sum::<usize>())
            .sum()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// SHA-256 of the canonical JSON form, hex encoded
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn empty_job() -> Job {
        Job {
            columns: vec![JobColumn {
                index: 0,
                name: "email".to_string(),
                family: TypeFamily::String,
                origin: JobColumnOrigin::Table {
                    table: TableIdentifier::new("shop", "customers"),
                    logical_type: LogicalType::String,
                },
            }],
            source_columns: vec![0],
            filters: Vec::new(),
            transformers: Vec::new(),
            analyzers: Vec::new(),
        }
    }

    #[test]
    fn literal_hash_ignores_construction_order() {
        let mut a = serde_json::Map::new();
        a.insert("x".to_string(), json!(1));
        a.insert("y".to_string(), json!(2));
        let mut b = serde_json::Map::new();
        b.insert("y".to_string(), json!(2));
        b.insert("x".to_string(), json!(1));

        let a = Literal(serde_json::Value::Object(a));
        let b = Literal(serde_json::Value::Object(b));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let job = empty_job();
        let fingerprint = job.fingerprint().unwrap();
        assert_eq!(fingerprint.len(), 64);
        assert_eq!(fingerprint, empty_job().fingerprint().unwrap());
        assert_eq!(job.source_columns().count(), 1);
        assert_eq!(job.stage_count(), 0);
    }
}
