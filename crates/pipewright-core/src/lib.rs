//! pipewright core
//!
//! Core domain model with stable, versioned types shared by the catalog,
//! the graph builder and the CLI.
//! Never rename diagnostic codes - they are part of the public API.

pub mod column;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod id;
pub mod report;
pub mod requirement;
pub mod schema;
pub mod stage;

pub use column::{Column, ColumnSnapshot, ConstantColumn, ExpressionColumn, InputRef, SourceColumn, SourceOrigin, VirtualColumn};
pub use config::{BuilderConfig, ConfigError, NamingConfig, ValidationConfig};
pub use diagnostic::{Diagnostic, DiagnosticCode, Location, Severity};
pub use error::{BuilderError, ListenerError};
pub use id::{ColumnId, ComponentId, IdSequence, ScopeId};
pub use report::{ReportSummary, ReportVersion, ValidationReport};
pub use requirement::{Outcome, Requirement};
pub use schema::{LogicalType, Nullability, Table, TableColumn, TableIdentifier, TypeFamily};
pub use stage::{PropertyValue, StageKind};
