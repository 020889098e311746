//! pipewright graph builder
//!
//! Mutable construction of a pipeline graph and compilation into an
//! immutable [`Job`]:
//! - Source columns resolved through a [`pipewright_catalog::SchemaProvider`]
//! - Filters, transformers and analyzers configured through their descriptors
//! - Output columns reconciled after every configuration change
//! - Requirements gating stages on filter outcomes, kept acyclic
//! - Nested pipelines for stage output streams
//! - Change listeners notified after each operation

pub mod component;
pub mod graph;
pub mod job;
pub mod lineage;
pub mod listener;
pub mod scope;

mod binding;
mod compiler;
mod outputs;
mod requirement;
mod sources;
mod stages;

pub use component::ComponentBuilder;
pub use graph::PipelineGraph;
pub use job::{
    ComponentJob, Job, JobColumn, JobColumnOrigin, JobInput, JobOutcome, JobProperty, JobValue, Literal,
    OutputStreamJob, StageRef,
};
pub use lineage::LineageGraph;
pub use listener::{
    ComponentListener, EventLog, GraphEvent, ListenerRegistry, LoggedEvent, OutputColumnListener, SourceColumnListener,
    StructureListener,
};
pub use scope::{PipelineBuilder, ScopeOrigin};
