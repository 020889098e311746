//! External schema metadata and the canonical type system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Portable logical type system
///
/// Maps source-specific types to a common representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogicalType {
    /// Boolean type
    Bool,

    /// Integer type (any precision)
    Int,

    /// Floating point (any precision)
    Float,

    /// Decimal with precision and scale
    Decimal {
        precision: Option<u16>,
        scale: Option<u16>,
    },

    /// String/text type
    String,

    /// Date (no time component)
    Date,

    /// Timestamp (with time component)
    Timestamp,

    /// JSON/Variant type
    Json,

    /// Structured type with named fields
    Struct {
        fields: Vec<TableColumn>,
    },

    /// Array type
    Array {
        element_type: Box<LogicalType>,
    },

    /// Unknown type (cannot infer)
    Unknown,
}

impl LogicalType {
    /// Collapse the logical type into the family used for slot matching
    pub fn family(&self) -> TypeFamily {
        match self {
            Self::Bool => TypeFamily::Boolean,
            Self::Int | Self::Float | Self::Decimal { .. } => TypeFamily::Number,
            Self::String => TypeFamily::String,
            Self::Date | Self::Timestamp => TypeFamily::Date,
            Self::Json | Self::Struct { .. } | Self::Array { .. } | Self::Unknown => {
                TypeFamily::Unknown
            }
        }
    }

    /// Representative logical type for a family
    ///
    /// Used when stream projections need schema metadata for columns that
    /// only carry a family.
    pub fn from_family(family: TypeFamily) -> Self {
        match family {
            TypeFamily::String => Self::String,
            TypeFamily::Number => Self::Float,
            TypeFamily::Date => Self::Timestamp,
            TypeFamily::Boolean => Self::Bool,
            TypeFamily::Unknown => Self::Unknown,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "BOOL"),
            Self::Int => write!(f, "INT"),
            Self::Float => write!(f, "FLOAT"),
            Self::Decimal { precision, scale } => {
                match (precision, scale) {
                    (Some(p), Some(s)) => write!(f, "DECIMAL({}, {})", p, s),
                    (Some(p), None) => write!(f, "DECIMAL({})", p),
                    _ => write!(f, "DECIMAL"),
                }
            }
            Self::String => write!(f, "STRING"),
            Self::Date => write!(f, "DATE"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
            Self::Json => write!(f, "JSON"),
            Self::Struct { .. } => write!(f, "STRUCT"),
            Self::Array { .. } => write!(f, "ARRAY"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Coarse value type family
///
/// Property slots declare the family they accept; columns carry the family
/// of their values. `Unknown` on a slot accepts every column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFamily {
    String,
    Number,
    Date,
    Boolean,
    Unknown,
}

impl TypeFamily {
    /// Whether a slot accepting `self` takes a column of family `column`
    pub fn accepts(&self, column: TypeFamily) -> bool {
        *self == TypeFamily::Unknown || *self == column
    }
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Date => write!(f, "date"),
            Self::Boolean => write!(f, "boolean"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Nullability state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nullability {
    /// Definitely nullable
    Yes,

    /// Definitely not nullable
    No,

    /// Cannot determine nullability
    Unknown,
}

impl Default for Nullability {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Identifies a table in an external schema
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableIdentifier {
    /// Schema name
    pub schema: String,

    /// Table name
    pub table: String,
}

impl TableIdentifier {
    /// Create a new table identifier
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Get fully qualified name
    pub fn fqn(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Path of a column of this table
    pub fn column_path(&self, column: &str) -> String {
        format!("{}.{}", self.fqn(), column)
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

/// A column of an external table, owned by the schema provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableColumn {
    /// Column name
    pub name: String,

    /// Logical type
    pub logical_type: LogicalType,

    /// Nullability
    #[serde(default)]
    pub nullable: Nullability,
}

impl TableColumn {
    /// Create a new column with unknown nullability
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: Nullability::Unknown,
        }
    }

    /// Set nullability
    pub fn with_nullability(mut self, nullable: Nullability) -> Self {
        self.nullable = nullable;
        self
    }

    /// Type family of the column's values
    pub fn family(&self) -> TypeFamily {
        self.logical_type.family()
    }
}

/// An external table: identifier plus ordered columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table identifier
    #[serde(flatten)]
    pub id: TableIdentifier,

    /// Ordered list of columns
    pub columns: Vec<TableColumn>,
}

impl Table {
    /// Create an empty table
    pub fn new(id: TableIdentifier) -> Self {
        Self {
            id,
            columns: Vec::new(),
        }
    }

    /// Add a column
    pub fn with_column(mut self, column: TableColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_type_display() {
        assert_eq!(LogicalType::Bool.to_string(), "BOOL");
        assert_eq!(
            LogicalType::Decimal { precision: Some(10), scale: Some(2) }.to_string(),
            "DECIMAL(10, 2)"
        );
    }

    #[test]
    fn logical_types_collapse_into_families() {
        assert_eq!(LogicalType::Int.family(), TypeFamily::Number);
        assert_eq!(LogicalType::Decimal { precision: None, scale: None }.family(), TypeFamily::Number);
        assert_eq!(LogicalType::Timestamp.family(), TypeFamily::Date);
        assert_eq!(LogicalType::Json.family(), TypeFamily::Unknown);
        assert_eq!(LogicalType::from_family(TypeFamily::Boolean).family(), TypeFamily::Boolean);
    }

    #[test]
    fn unknown_slot_family_accepts_everything() {
        assert!(TypeFamily::Unknown.accepts(TypeFamily::Date));
        assert!(TypeFamily::String.accepts(TypeFamily::String));
        assert!(!TypeFamily::String.accepts(TypeFamily::Number));
        assert!(!TypeFamily::Number.accepts(TypeFamily::Unknown));
    }

    #[test]
    fn table_operations() {
        let table = Table::new(TableIdentifier::new("shop", "orders"))
            .with_column(TableColumn::new("id", LogicalType::Int))
            .with_column(TableColumn::new("email", LogicalType::String));

        assert_eq!(table.column_names(), vec!["id", "email"]);
        assert!(table.find_column("id").is_some());
        assert!(table.find_column("nonexistent").is_none());
        assert_eq!(table.id.column_path("id"), "shop.orders.id");
    }
}
