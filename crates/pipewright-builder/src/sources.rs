//! Source column operations on table-reading scopes

use crate::graph::{PipelineGraph, StoredColumn};
use crate::listener::{GraphEvent, Notifier};
use pipewright_catalog::{ColumnPath, ResolvedColumn};
use pipewright_core::{BuilderError, Column, ColumnId, ScopeId, SourceColumn, SourceOrigin, TableIdentifier};

impl PipelineGraph {
    /// Add a source column by path (`schema.table.column`, or a bare column
    /// name once the pipeline has a table). Adding a column that is already
    /// present returns its existing id.
    pub fn add_source_column(&mut self, scope: ScopeId, path: &str) -> Result<ColumnId, BuilderError> {
        self.add_source_columns(scope, &[path])?
            .into_iter()
            .next()
            .ok_or_else(|| BuilderError::UnknownColumn(path.to_string()))
    }

    /// Add several source columns; either all are added or none
    pub fn add_source_columns<S: AsRef<str>>(
        &mut self,
        scope: ScopeId,
        paths: &[S],
    ) -> Result<Vec<ColumnId>, BuilderError> {
        self.ensure_table_scope(scope)?;

        let mut table = self.scope(scope)?.table().cloned();
        let mut resolved = Vec::with_capacity(paths.len());
        for path in paths {
            let column = self.resolve_source(table.as_ref(), path.as_ref())?;
            table.get_or_insert_with(|| column.table.clone());
            resolved.push(column);
        }

        self.insert_sources(scope, resolved)
    }

    /// Add every column of a table, in schema order
    pub fn add_table_columns(
        &mut self,
        scope: ScopeId,
        table: &TableIdentifier,
    ) -> Result<Vec<ColumnId>, BuilderError> {
        self.ensure_table_scope(scope)?;

        let resolved = self
            .schemas
            .list_columns(table)
            .map_err(|e| BuilderError::UnknownColumn(format!("{}.* ({})", table.fqn(), e)))?;

        self.insert_sources(scope, resolved)
    }

    /// Remove a source column, unbinding it everywhere first
    pub fn remove_source_column(&mut self, scope: ScopeId, column: ColumnId) -> Result<(), BuilderError> {
        self.ensure_table_scope(scope)?;
        if !self.scope(scope)?.source_columns().contains(&column) {
            return Err(BuilderError::UnknownColumn(column.to_string()));
        }

        let mut notifier = Notifier::new();
        self.detach_source(scope, column, &mut notifier);
        self.dispatch(notifier)
    }

    /// Swap a source column for another one of the same table
    ///
    /// Consumers of the old column lose it; the new column is not bound
    /// anywhere.
    pub fn replace_source_column(
        &mut self,
        scope: ScopeId,
        old: ColumnId,
        path: &str,
    ) -> Result<ColumnId, BuilderError> {
        self.ensure_table_scope(scope)?;
        let builder = self.scope(scope)?;
        if !builder.source_columns().contains(&old) {
            return Err(BuilderError::UnknownColumn(old.to_string()));
        }

        let resolved = self.resolve_source(builder.table(), path)?;
        let sole_column = builder.source_columns() == [old];
        if let Some(active) = builder.table() {
            if !sole_column && *active != resolved.table {
                return Err(self.foreign_table(&resolved, active));
            }
        }

        let mut notifier = Notifier::new();
        self.detach_source(scope, old, &mut notifier);
        let id = self.insert_source(scope, resolved, &mut notifier);
        self.dispatch(notifier)?;
        Ok(id)
    }

    fn ensure_table_scope(&self, scope: ScopeId) -> Result<(), BuilderError> {
        if self.scope(scope)?.is_stream() {
            return Err(BuilderError::StreamScope(scope));
        }
        Ok(())
    }

    /// Bare column names resolve against `table`
    fn resolve_source(&self, table: Option<&TableIdentifier>, path: &str) -> Result<ResolvedColumn, BuilderError> {
        let mut parsed = ColumnPath::parse(path).map_err(|_| BuilderError::UnknownColumn(path.to_string()))?;

        if parsed.table.is_none() {
            let table = table.ok_or_else(|| BuilderError::UnknownColumn(path.to_string()))?;
            parsed = parsed.qualified_with(table);
        }

        self.schemas
            .resolve_column(&parsed)
            .map_err(|_| BuilderError::UnknownColumn(parsed.to_string()))
    }

    fn foreign_table(&self, resolved: &ResolvedColumn, active: &TableIdentifier) -> BuilderError {
        BuilderError::ForeignTable {
            column: resolved.path(),
            expected: active.fqn(),
            actual: resolved.table.fqn(),
        }
    }

    fn insert_sources(
        &mut self,
        scope: ScopeId,
        resolved: Vec<ResolvedColumn>,
    ) -> Result<Vec<ColumnId>, BuilderError> {
        let mut table = self.scope(scope)?.table().cloned();
        for column in &resolved {
            match &table {
                Some(active) if *active != column.table => return Err(self.foreign_table(column, active)),
                Some(_) => {}
                None => table = Some(column.table.clone()),
            }
        }

        let mut notifier = Notifier::new();
        let ids = resolved
            .into_iter()
            .map(|column| self.insert_source(scope, column, &mut notifier))
            .collect();

        self.dispatch(notifier)?;
        Ok(ids)
    }

    /// Insert one resolved column whose table was already checked
    fn insert_source(&mut self, scope: ScopeId, resolved: ResolvedColumn, notifier: &mut Notifier) -> ColumnId {
        let origin = SourceOrigin::Table {
            table: resolved.table.clone(),
        };

        let existing = self.scopes.get(&scope).and_then(|builder| {
            builder.source_columns().iter().copied().find(|id| {
                self.column(*id)
                    .and_then(Column::as_source)
                    .is_some_and(|c| *c.origin() == origin && c.name() == resolved.column.name)
            })
        });
        if let Some(id) = existing {
            tracing::trace!(column = %resolved.path(), "source column already present");
            return id;
        }

        let id = self.ids.column();
        let column = Column::Source(SourceColumn::new(id, resolved.column, origin));
        notifier.push(GraphEvent::SourceColumnAdded {
            scope,
            column: column.snapshot(),
        });
        self.columns.insert(id, StoredColumn { scope, column });

        if let Some(builder) = self.scopes.get_mut(&scope) {
            if builder.table().is_none() {
                builder.set_table(Some(resolved.table));
            }
            builder.push_source_column(id);
        }

        tracing::debug!(scope = %scope, column = %id, "added source column");
        id
    }

    /// Remove a source column and purge it from every consumer
    ///
    /// The last removed column of a root scope releases its table.
    pub(crate) fn detach_source(&mut self, scope: ScopeId, column: ColumnId, notifier: &mut Notifier) {
        let Some(builder) = self.scopes.get_mut(&scope) else {
            return;
        };
        if !builder.remove_source_column(column) {
            return;
        }
        if builder.source_columns().is_empty() && !builder.is_stream() {
            builder.set_table(None);
        }

        let Some(stored) = self.columns.remove(&column) else {
            return;
        };
        self.purge_column(scope, column, notifier);

        notifier.push(GraphEvent::SourceColumnRemoved {
            scope,
            column: stored.column.snapshot(),
        });
        tracing::debug!(scope = %scope, column = %column, "removed source column");
    }
}
