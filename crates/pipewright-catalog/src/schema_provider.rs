//! Schema provider trait for resolving source column paths

use pipewright_core::{TableColumn, TableIdentifier};
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};

fn path_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Either `schema.table.column` or a bare `column`
        Regex::new(r"^(?:([^.\s]+)\.([^.\s]+)\.)?([^.]+)$").unwrap_or_else(|_| unreachable!())
    })
}

/// A textual column path, optionally qualified with its table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPath {
    /// Table the column belongs to, when qualified
    pub table: Option<TableIdentifier>,

    /// Column name
    pub column: String,
}

impl ColumnPath {
    /// Parse `schema.table.column` or a bare `column`
    pub fn parse(path: &str) -> Result<Self, LookupError> {
        let captures = path_pattern()
            .captures(path.trim())
            .ok_or_else(|| LookupError::InvalidPath(path.to_string()))?;

        let table = match (captures.get(1), captures.get(2)) {
            (Some(schema), Some(table)) => Some(TableIdentifier::new(schema.as_str(), table.as_str())),
            _ => None,
        };
        let column = captures
            .get(3)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| LookupError::InvalidPath(path.to_string()))?;

        Ok(Self { table, column })
    }

    /// Qualify a bare path with a table; qualified paths are left as they are
    pub fn qualified_with(mut self, table: &TableIdentifier) -> Self {
        if self.table.is_none() {
            self.table = Some(table.clone());
        }
        self
    }
}

impl fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}", table.column_path(&self.column)),
            None => write!(f, "{}", self.column),
        }
    }
}

/// A source column resolved against a schema provider
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColumn {
    /// Table owning the column
    pub table: TableIdentifier,

    /// Shared, read-only column metadata
    pub column: Arc<TableColumn>,
}

impl ResolvedColumn {
    /// Fully qualified path
    pub fn path(&self) -> String {
        self.table.column_path(&self.column.name)
    }
}

/// Errors that can occur when resolving columns
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Invalid column path: {0}")]
    InvalidPath(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Column path '{0}' is not qualified with a table")]
    Unqualified(String),
}

/// Trait for schema providers that own source column metadata
pub trait SchemaProvider: Send + Sync {
    /// Get the provider name (e.g., "memory")
    fn name(&self) -> &str;

    /// Resolve a qualified column path to its metadata
    fn resolve_column(&self, path: &ColumnPath) -> Result<ResolvedColumn, LookupError>;

    /// List every column of a table, in table order
    fn list_columns(&self, table: &TableIdentifier) -> Result<Vec<ResolvedColumn>, LookupError>;
}
