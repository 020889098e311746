//! Builder error taxonomy
//!
//! Every rejection names the offending stage, slot or column so callers can
//! surface an actionable message.

use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::id::{ComponentId, ScopeId};
use crate::schema::TypeFamily;
use crate::stage::StageKind;

/// Error raised by a change listener callback
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by pipeline graph operations
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("Column '{column}' ({actual}) cannot be bound to property '{property}' of '{stage}', which accepts {expected} columns")]
    IncompatibleColumnType {
        stage: String,
        property: String,
        column: String,
        expected: TypeFamily,
        actual: TypeFamily,
    },

    #[error("Property '{property}' of '{stage}' is required but not set")]
    UnconfiguredProperty { stage: String, property: String },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Requiring '{requirement}' for '{stage}' would create a cyclic requirement")]
    CyclicRequirement { stage: String, requirement: String },

    #[error("{} problem(s) prevent building the job: {}", .problems.len(), summarize(.problems))]
    NotConfigured { problems: Vec<Diagnostic> },

    #[error("'{stage}' has no property named '{property}'")]
    UnknownProperty { stage: String, property: String },

    #[error("Property '{property}' of '{stage}' takes a single column, got {count}")]
    ArityMismatch { stage: String, property: String, count: usize },

    #[error("Invalid value for property '{property}' of '{stage}': {reason}")]
    InvalidPropertyValue { stage: String, property: String, reason: String },

    #[error("Column '{column}' is not available to '{stage}'")]
    ColumnNotAvailable { stage: String, column: String },

    #[error("Column '{0}' is a source column and cannot be renamed")]
    ImmutableColumn(String),

    #[error("Column '{column}' belongs to table '{actual}' but the pipeline reads from '{expected}'")]
    ForeignTable { column: String, expected: String, actual: String },

    #[error("Source columns of output stream scope {0} are derived from its owning stage")]
    StreamScope(ScopeId),

    #[error("Unknown component: {0}")]
    UnknownComponent(ComponentId),

    #[error("Unknown scope: {0}")]
    UnknownScope(ScopeId),

    #[error("'{stage}' is a {actual}, expected a {expected}")]
    StageKindMismatch { stage: String, expected: StageKind, actual: StageKind },

    #[error("Invalid requirement for '{stage}': {reason}")]
    InvalidRequirement { stage: String, reason: String },

    #[error("No stage descriptor named '{0}'")]
    UnknownDescriptor(String),

    #[error("Listener failed while handling {event}: {source}")]
    Listener {
        event: &'static str,
        #[source]
        source: ListenerError,
    },
}

fn summarize(problems: &[Diagnostic]) -> String {
    problems
        .iter()
        .map(|p| p.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl BuilderError {
    /// Stable diagnostic code of this error
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::IncompatibleColumnType { .. } => DiagnosticCode::IncompatibleColumnType,
            Self::UnconfiguredProperty { .. } => DiagnosticCode::UnconfiguredProperty,
            Self::UnknownColumn(_) => DiagnosticCode::UnknownColumn,
            Self::CyclicRequirement { .. } => DiagnosticCode::CyclicRequirement,
            Self::NotConfigured { .. } => DiagnosticCode::NotConfigured,
            Self::UnknownProperty { .. } => DiagnosticCode::UnknownProperty,
            Self::ArityMismatch { .. } => DiagnosticCode::ArityMismatch,
            Self::InvalidPropertyValue { .. } => DiagnosticCode::InvalidPropertyValue,
            Self::ColumnNotAvailable { .. } => DiagnosticCode::ColumnNotAvailable,
            Self::ImmutableColumn(_) => DiagnosticCode::ImmutableColumn,
            Self::ForeignTable { .. } => DiagnosticCode::ForeignTable,
            Self::StreamScope(_) => DiagnosticCode::StreamScope,
            Self::UnknownComponent(_) | Self::UnknownScope(_) | Self::UnknownDescriptor(_) => {
                DiagnosticCode::UnknownReference
            }
            Self::StageKindMismatch { .. } => DiagnosticCode::StageKindMismatch,
            Self::InvalidRequirement { .. } => DiagnosticCode::InvalidRequirement,
            Self::Listener { .. } => DiagnosticCode::ListenerFailure,
        }
    }

    /// Flatten into diagnostics; aggregates yield every contained problem
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        match self {
            Self::NotConfigured { problems } => problems,
            other => vec![Diagnostic::error(other.code(), other.to_string())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Location;

    #[test]
    fn messages_name_the_offender() {
        let err = BuilderError::IncompatibleColumnType {
            stage: "String length".to_string(),
            property: "column".to_string(),
            column: "age".to_string(),
            expected: TypeFamily::String,
            actual: TypeFamily::Number,
        };
        let message = err.to_string();
        assert!(message.contains("'age'"));
        assert!(message.contains("'column'"));
        assert!(message.contains("'String length'"));
        assert_eq!(err.code(), DiagnosticCode::IncompatibleColumnType);
    }

    #[test]
    fn aggregate_keeps_every_problem() {
        let problems = vec![
            Diagnostic::error(DiagnosticCode::UnconfiguredProperty, "a not set")
                .with_location(Location::new("root").with_stage("A")),
            Diagnostic::error(DiagnosticCode::UnconfiguredProperty, "b not set"),
        ];
        let err = BuilderError::NotConfigured { problems: problems.clone() };
        assert_eq!(err.to_string(), "2 problem(s) prevent building the job: a not set; b not set");
        assert_eq!(err.into_diagnostics(), problems);
    }
}
