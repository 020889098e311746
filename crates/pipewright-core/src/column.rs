//! Column model: source, virtual, constant and expression columns

use crate::id::{ColumnId, ComponentId};
use crate::schema::{TableColumn, TableIdentifier, TypeFamily};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a source column comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum SourceOrigin {
    /// Column of an external table
    Table { table: TableIdentifier },

    /// Projection of a parent scope's column into an output data stream
    Stream { component: ComponentId, stream: String },
}

/// A column backed by schema metadata owned elsewhere
#[derive(Debug, Clone, PartialEq)]
pub struct SourceColumn {
    id: ColumnId,
    metadata: Arc<TableColumn>,
    origin: SourceOrigin,
}

impl SourceColumn {
    pub fn new(id: ColumnId, metadata: Arc<TableColumn>, origin: SourceOrigin) -> Self {
        Self { id, metadata, origin }
    }

    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn family(&self) -> TypeFamily {
        self.metadata.family()
    }

    /// Shared, read-only schema metadata
    pub fn metadata(&self) -> &Arc<TableColumn> {
        &self.metadata
    }

    pub fn origin(&self) -> &SourceOrigin {
        &self.origin
    }

    /// Qualified path the column was resolved from
    pub fn path(&self) -> String {
        match &self.origin {
            SourceOrigin::Table { table } => table.column_path(self.name()),
            SourceOrigin::Stream { stream, .. } => format!("{}.{}", stream, self.name()),
        }
    }
}

/// A column produced by a transformer or analyzer
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualColumn {
    id: ColumnId,
    producer: ComponentId,
    name: String,
    family: TypeFamily,
    manually_renamed: bool,
}

impl VirtualColumn {
    pub fn new(id: ColumnId, producer: ComponentId, name: impl Into<String>, family: TypeFamily) -> Self {
        Self {
            id,
            producer,
            name: name.into(),
            family,
            manually_renamed: false,
        }
    }

    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn producer(&self) -> ComponentId {
        self.producer
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> TypeFamily {
        self.family
    }

    /// Set once a caller renames the column explicitly; never cleared
    pub fn is_manually_renamed(&self) -> bool {
        self.manually_renamed
    }

    /// Rename on behalf of a caller
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.manually_renamed = true;
    }

    /// Rename with a system-assigned name, keeping the manual flag as is
    pub fn assign_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

/// A literal value used in place of a column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstantColumn {
    pub value: String,
    pub family: TypeFamily,
}

impl ConstantColumn {
    pub fn new(value: impl Into<String>, family: TypeFamily) -> Self {
        Self {
            value: value.into(),
            family,
        }
    }
}

/// A formula evaluated per record in place of a column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpressionColumn {
    pub expression: String,
    pub family: TypeFamily,
}

impl ExpressionColumn {
    pub fn new(expression: impl Into<String>, family: TypeFamily) -> Self {
        Self {
            expression: expression.into(),
            family,
        }
    }
}

/// Any column
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Source(SourceColumn),
    Virtual(VirtualColumn),
    Constant(ConstantColumn),
    Expression(ExpressionColumn),
}

impl Column {
    /// Stored columns have an id; value columns do not
    pub fn id(&self) -> Option<ColumnId> {
        match self {
            Self::Source(c) => Some(c.id()),
            Self::Virtual(c) => Some(c.id()),
            Self::Constant(_) | Self::Expression(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Source(c) => c.name(),
            Self::Virtual(c) => c.name(),
            Self::Constant(c) => &c.value,
            Self::Expression(c) => &c.expression,
        }
    }

    pub fn family(&self) -> TypeFamily {
        match self {
            Self::Source(c) => c.family(),
            Self::Virtual(c) => c.family(),
            Self::Constant(c) => c.family,
            Self::Expression(c) => c.family,
        }
    }

    pub fn as_source(&self) -> Option<&SourceColumn> {
        match self {
            Self::Source(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_virtual(&self) -> Option<&VirtualColumn> {
        match self {
            Self::Virtual(c) => Some(c),
            _ => None,
        }
    }

    /// Point-in-time copy of the column's identity, name and family
    pub fn snapshot(&self) -> ColumnSnapshot {
        ColumnSnapshot {
            id: self.id(),
            name: self.name().to_string(),
            family: self.family(),
        }
    }
}

/// What a column slot of a component holds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputRef {
    Column { id: ColumnId },
    Constant(ConstantColumn),
    Expression(ExpressionColumn),
}

impl InputRef {
    /// The stored column this input points at, if any
    pub fn column_id(&self) -> Option<ColumnId> {
        match self {
            Self::Column { id } => Some(*id),
            _ => None,
        }
    }

    pub fn constant(value: impl Into<String>, family: TypeFamily) -> Self {
        Self::Constant(ConstantColumn::new(value, family))
    }

    pub fn expression(expression: impl Into<String>, family: TypeFamily) -> Self {
        Self::Expression(ExpressionColumn::new(expression, family))
    }
}

impl From<ColumnId> for InputRef {
    fn from(id: ColumnId) -> Self {
        Self::Column { id }
    }
}

/// Column state carried by change notifications
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub id: Option<ColumnId>,
    pub name: String,
    pub family: TypeFamily,
}
