//! In-memory schema provider
//!
//! This provider serves predefined tables without talking to any database.
//! It's useful for:
//! - Unit testing pipeline construction
//! - The CLI, which loads table definitions from a JSON or TOML file
//! - Demos and examples
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pipewright_catalog::{InMemoryCatalog, SchemaProvider, ColumnPath};
//! use pipewright_core::{Table, TableColumn, TableIdentifier, LogicalType};
//!
//! let catalog = InMemoryCatalog::new().with_table(
//!     Table::new(TableIdentifier::new("shop", "orders"))
//!         .with_column(TableColumn::new("id", LogicalType::Int)),
//! );
//!
//! let resolved = catalog.resolve_column(&ColumnPath::parse("shop.orders.id")?)?;
//! ```

use crate::schema_provider::{ColumnPath, LookupError, ResolvedColumn, SchemaProvider};
use pipewright_core::{Table, TableColumn, TableIdentifier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Serialized form of a catalog file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    /// Provider name
    #[serde(default)]
    pub name: Option<String>,

    /// Table definitions
    #[serde(default)]
    pub tables: Vec<Table>,
}

/// In-memory schema provider
///
/// Column metadata is stored behind `Arc` so that every source column
/// resolved from this catalog shares the same allocation.
#[derive(Debug, Clone)]
pub struct InMemoryCatalog {
    /// Columns by table, in table order
    tables: BTreeMap<TableIdentifier, Vec<Arc<TableColumn>>>,

    /// Name to return from name() method
    catalog_name: String,
}

impl InMemoryCatalog {
    /// Create a new catalog with no tables
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            catalog_name: "memory".to_string(),
        }
    }

    /// Add (or replace) a table
    pub fn add_table(&mut self, table: Table) {
        let columns = table.columns.into_iter().map(Arc::new).collect();
        self.tables.insert(table.id, columns);
    }

    /// Builder-style variant of `add_table`
    pub fn with_table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    /// Set a custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.catalog_name = name.into();
        self
    }

    /// Build a catalog from its serialized form
    pub fn from_file_contents(file: CatalogFile) -> Self {
        let mut catalog = Self::new();
        if let Some(name) = file.name {
            catalog.catalog_name = name;
        }
        for table in file.tables {
            catalog.add_table(table);
        }
        catalog
    }

    /// Parse a JSON catalog document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Ok(Self::from_file_contents(file))
    }

    /// Known table identifiers
    pub fn table_ids(&self) -> Vec<&TableIdentifier> {
        self.tables.keys().collect()
    }

    /// Number of tables
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Clear all tables
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaProvider for InMemoryCatalog {
    fn name(&self) -> &str {
        &self.catalog_name
    }

    fn resolve_column(&self, path: &ColumnPath) -> Result<ResolvedColumn, LookupError> {
        let table = path
            .table
            .as_ref()
            .ok_or_else(|| LookupError::Unqualified(path.to_string()))?;

        let columns = self
            .tables
            .get(table)
            .ok_or_else(|| LookupError::TableNotFound(table.fqn()))?;

        columns
            .iter()
            .find(|c| c.name == path.column)
            .map(|c| ResolvedColumn {
                table: table.clone(),
                column: Arc::clone(c),
            })
            .ok_or_else(|| LookupError::ColumnNotFound(path.to_string()))
    }

    fn list_columns(&self, table: &TableIdentifier) -> Result<Vec<ResolvedColumn>, LookupError> {
        let columns = self
            .tables
            .get(table)
            .ok_or_else(|| LookupError::TableNotFound(table.fqn()))?;

        Ok(columns
            .iter()
            .map(|c| ResolvedColumn {
                table: table.clone(),
                column: Arc::clone(c),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::LogicalType;

    fn orders() -> Table {
        Table::new(TableIdentifier::new("shop", "orders"))
            .with_column(TableColumn::new("id", LogicalType::Int))
            .with_column(TableColumn::new("email", LogicalType::String))
    }

    #[test]
    fn resolves_shared_metadata() {
        let catalog = InMemoryCatalog::new().with_table(orders());
        let path = ColumnPath::parse("shop.orders.email").unwrap();

        let first = catalog.resolve_column(&path).unwrap();
        let second = catalog.resolve_column(&path).unwrap();
        assert!(Arc::ptr_eq(&first.column, &second.column));
        assert_eq!(first.path(), "shop.orders.email");
    }

    #[test]
    fn missing_table_and_column() {
        let catalog = InMemoryCatalog::new().with_table(orders());

        let result = catalog.resolve_column(&ColumnPath::parse("shop.users.id").unwrap());
        assert!(matches!(result, Err(LookupError::TableNotFound(t)) if t == "shop.users"));

        let result = catalog.resolve_column(&ColumnPath::parse("shop.orders.total").unwrap());
        assert!(matches!(result, Err(LookupError::ColumnNotFound(_))));

        let result = catalog.resolve_column(&ColumnPath::parse("id").unwrap());
        assert!(matches!(result, Err(LookupError::Unqualified(_))));
    }

    #[test]
    fn lists_columns_in_table_order() {
        let catalog = InMemoryCatalog::new().with_table(orders());
        let columns = catalog.list_columns(&TableIdentifier::new("shop", "orders")).unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.column.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email"]);
    }

    #[test]
    fn loads_from_json() {
        let json = r#"{
            "name": "fixtures",
            "tables": [
                {
                    "schema": "shop",
                    "table": "orders",
                    "columns": [
                        { "name": "id", "logical_type": { "type": "int" }, "nullable": "no" },
                        { "name": "email", "logical_type": { "type": "string" } }
                    ]
                }
            ]
        }"#;

        let catalog = InMemoryCatalog::from_json(json).unwrap();
        assert_eq!(catalog.name(), "fixtures");
        assert_eq!(catalog.table_count(), 1);
        assert!(catalog.resolve_column(&ColumnPath::parse("shop.orders.email").unwrap()).is_ok());
    }
}
