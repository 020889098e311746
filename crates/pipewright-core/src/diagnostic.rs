//! Diagnostic codes and structured problem reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Column binding (1xxx)
    /// A column's type family is not accepted by the slot
    IncompatibleColumnType,

    /// A column path cannot be resolved against the active schema
    UnknownColumn,

    /// A column exists but is not visible to the stage
    ColumnNotAvailable,

    /// Source columns cannot be renamed
    ImmutableColumn,

    /// A column belongs to another table than the active one
    ForeignTable,

    // Configuration (2xxx)
    /// A required property slot is empty
    UnconfiguredProperty,

    /// The stage descriptor declares no such property
    UnknownProperty,

    /// Too many values for a single-valued slot
    ArityMismatch,

    /// A value does not fit the slot
    InvalidPropertyValue,

    /// One or more stages are not configured (aggregate)
    NotConfigured,

    /// The root pipeline has no source columns
    NoSourceColumns,

    /// The root pipeline has no analyzers
    NoAnalyzers,

    // Requirements (3xxx)
    /// Requirement would close a cycle between filters
    CyclicRequirement,

    /// Requirement refers to an unknown filter or outcome
    InvalidRequirement,

    // Structure (4xxx)
    /// Stage, scope or descriptor not found
    UnknownReference,

    /// Operation not valid for the stage's kind
    StageKindMismatch,

    /// Output stream scopes manage their own source columns
    StreamScope,

    /// A change listener failed
    ListenerFailure,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IncompatibleColumnType => "INCOMPATIBLE_COLUMN_TYPE",
            Self::UnknownColumn => "UNKNOWN_COLUMN",
            Self::ColumnNotAvailable => "COLUMN_NOT_AVAILABLE",
            Self::ImmutableColumn => "IMMUTABLE_COLUMN",
            Self::ForeignTable => "FOREIGN_TABLE",
            Self::UnconfiguredProperty => "UNCONFIGURED_PROPERTY",
            Self::UnknownProperty => "UNKNOWN_PROPERTY",
            Self::ArityMismatch => "ARITY_MISMATCH",
            Self::InvalidPropertyValue => "INVALID_PROPERTY_VALUE",
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::NoSourceColumns => "NO_SOURCE_COLUMNS",
            Self::NoAnalyzers => "NO_ANALYZERS",
            Self::CyclicRequirement => "CYCLIC_REQUIREMENT",
            Self::InvalidRequirement => "INVALID_REQUIREMENT",
            Self::UnknownReference => "UNKNOWN_REFERENCE",
            Self::StageKindMismatch => "STAGE_KIND_MISMATCH",
            Self::StreamScope => "STREAM_SCOPE",
            Self::ListenerFailure => "LISTENER_FAILURE",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - blocks job compilation
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where in the pipeline a problem sits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Scope path from the root, e.g. `root` or `root/Splitter/matches`
    pub scope: String,

    /// Stage label
    pub stage: Option<String>,

    /// Property slot name
    pub property: Option<String>,

    /// Column name
    pub column: Option<String>,
}

impl Location {
    /// Create a location pointing at a scope only
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            stage: None,
            property: None,
            column: None,
        }
    }

    /// Point at a stage within the scope
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Point at a property slot of the stage
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Point at a column
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.scope)?;
        if let Some(stage) = &self.stage {
            write!(f, " > {}", stage)?;
        }
        if let Some(property) = &self.property {
            write!(f, " [{}]", property)?;
        }
        if let Some(column) = &self.column {
            write!(f, " '{}'", column)?;
        }
        Ok(())
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Pipeline location (best-effort)
    pub location: Option<Location>,

    /// Expected value (for comparison diagnostics)
    pub expected: Option<String>,

    /// Actual value (for comparison diagnostics)
    pub actual: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            expected: None,
            actual: None,
        }
    }

    /// Shorthand for an error-level diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set expected/actual values
    pub fn with_comparison(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }
        Ok(())
    }
}
