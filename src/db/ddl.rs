//! DDL synthesizer: realizes desired table and index states.
//!
//! SQLite's `ALTER TABLE` can only add a column or rename the table. Every
//! other change goes through [`SqliteSchemaEditor::recreate_table`].

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::db::catalog::{CatalogReader, SqliteCatalog};
use crate::db::engine::Engine;
use crate::db::error::{DriverError, Result};
use crate::db::grammar::{
    column_definition, create_index_sql, escape_id, index_column, quote, truncate_table_sql,
};
use crate::types::{
    ColumnDescriptor, GeneratedStorage, IndexDescriptor, IndexKind, RebuildRequest, TableChange,
};

/// Schema mutation entry points
pub trait DdlSynthesizer {
    fn create_table(&self, table: &TableChange) -> Result<()>;

    /// Bring table `current` to the state described by `table`
    fn alter_table(&self, current: &str, table: &TableChange) -> Result<()>;

    /// Drop `drop` in reverse order, then create `add` in order.
    /// Primary key changes are rejected without running anything.
    fn alter_indexes(
        &self,
        table: &str,
        add: &[IndexDescriptor],
        drop: &[IndexDescriptor],
    ) -> Result<()>;

    fn drop_tables(&self, tables: &[String]) -> Result<()>;

    fn truncate_tables(&self, tables: &[String]) -> Result<()>;

    fn drop_views(&self, views: &[String]) -> Result<()>;

    /// Moving tables between database files is not supported
    fn move_tables(&self, tables: &[String], views: &[String], target: &str) -> Result<()>;
}

/// DDL synthesizer over a borrowed engine
#[derive(Clone, Copy)]
pub struct SqliteSchemaEditor<'e> {
    pub(crate) engine: &'e dyn Engine,
}

impl<'e> SqliteSchemaEditor<'e> {
    pub fn new(engine: &'e dyn Engine) -> Self {
        Self { engine }
    }

    pub fn catalog(&self) -> SqliteCatalog<'e> {
        SqliteCatalog::new(self.engine)
    }

    /// Set the sequence value of `table`, inserting the row when missing.
    /// Runs inside whatever transaction is open.
    pub(crate) fn write_sequence(&self, table: &str, value: i64) -> Result<()> {
        let updated = self.engine.execute(&format!(
            "UPDATE sqlite_sequence SET seq = {} WHERE name = {}",
            value,
            quote(table)
        ))?;
        if updated == 0 {
            self.engine.execute(&format!(
                "INSERT INTO sqlite_sequence (name, seq) VALUES ({}, {})",
                quote(table),
                value
            ))?;
        }
        Ok(())
    }

    /// Sequence maintenance in its own transaction. Failures are logged only.
    fn set_auto_increment(&self, table: &str, value: i64) {
        let outcome = self
            .engine
            .execute("BEGIN")
            .and_then(|_| self.write_sequence(table, value));
        if self.engine.in_transaction() {
            if let Err(e) = self.engine.execute("COMMIT") {
                warn!(table, error = %e, "sequence commit failed");
            }
        }
        if let Err(e) = outcome {
            warn!(table, value, error = %e, "sequence update ignored");
        }
    }

    /// Whether `change` needs a full rebuild of `existing`
    fn needs_rebuild(&self, existing: &[ColumnDescriptor], change: &TableChange) -> Result<bool> {
        if !change.foreign_keys.is_empty() {
            return Ok(true);
        }

        let mut kept = HashSet::new();
        let mut next_position = 0;
        let mut seen_new = false;
        for entry in &change.columns {
            let Some(original) = &entry.original else {
                seen_new = true;
                if !can_add_column(&entry.column) {
                    return Ok(true);
                }
                continue;
            };
            let Some(position) = existing.iter().position(|c| &c.name == original) else {
                return Err(DriverError::NotFound(format!("column {}", original)));
            };
            // ADD COLUMN only appends, so kept columns must stay in order ahead of new ones
            if seen_new || position != next_position {
                return Ok(true);
            }
            next_position += 1;
            kept.insert(original.as_str());

            let current = &existing[position];
            if entry.column.name != current.name
                || entry.column.primary_key != current.primary_key
                || column_definition(&entry.column) != column_definition(current)
            {
                return Ok(true);
            }
        }

        Ok(kept.len() != existing.len())
    }
}

/// Whether `ALTER TABLE ... ADD` accepts this column
fn can_add_column(column: &ColumnDescriptor) -> bool {
    let stored = column
        .generated
        .as_ref()
        .is_some_and(|g| g.storage == GeneratedStorage::Stored);
    let needs_value = !column.nullable && column.default.is_none() && column.generated.is_none();
    !(column.primary_key || column.auto_increment || stored || needs_value)
}

impl DdlSynthesizer for SqliteSchemaEditor<'_> {
    fn create_table(&self, table: &TableChange) -> Result<()> {
        self.recreate_table(&RebuildRequest::from(table), None)?;
        if let Some(value) = table.auto_increment.filter(|v| *v > 0) {
            self.set_auto_increment(&table.name, value);
        }
        Ok(())
    }

    fn alter_table(&self, current: &str, table: &TableChange) -> Result<()> {
        let existing = self.catalog().read_columns(current)?;
        if existing.is_empty() {
            return Err(DriverError::NotFound(format!("table {}", current)));
        }

        if self.needs_rebuild(&existing, table)? {
            debug!(table = current, "alter requires rebuild");
            self.recreate_table(&RebuildRequest::from(table), Some(current))?;
        } else {
            for entry in table.columns.iter().filter(|c| c.original.is_none()) {
                self.engine.execute(&format!(
                    "ALTER TABLE {} ADD {}",
                    escape_id(current),
                    column_definition(&entry.column)
                ))?;
            }
            if table.name != current {
                self.engine.execute(&format!(
                    "ALTER TABLE {} RENAME TO {}",
                    escape_id(current),
                    escape_id(&table.name)
                ))?;
            }
        }

        if let Some(value) = table.auto_increment.filter(|v| *v > 0) {
            self.set_auto_increment(&table.name, value);
        }
        Ok(())
    }

    fn alter_indexes(
        &self,
        table: &str,
        add: &[IndexDescriptor],
        drop: &[IndexDescriptor],
    ) -> Result<()> {
        if add
            .iter()
            .chain(drop.iter())
            .any(|index| index.kind == IndexKind::Primary)
        {
            return Err(DriverError::Unsupported(
                "primary key changes require a table rebuild".to_string(),
            ));
        }

        for index in drop.iter().rev() {
            self.engine
                .execute(&format!("DROP INDEX {}", escape_id(&index.name)))?;
        }
        for index in add {
            let columns: Vec<String> = index
                .columns
                .iter()
                .enumerate()
                .map(|(i, column)| index_column(column, index.is_descending(i)))
                .collect();
            self.engine
                .execute(&create_index_sql(table, index.kind, &index.name, &columns))?;
        }
        Ok(())
    }

    fn drop_tables(&self, tables: &[String]) -> Result<()> {
        for table in tables {
            self.engine
                .execute(&format!("DROP TABLE {}", escape_id(table)))?;
        }
        Ok(())
    }

    fn truncate_tables(&self, tables: &[String]) -> Result<()> {
        for table in tables {
            self.engine.execute(&truncate_table_sql(table))?;
        }
        Ok(())
    }

    fn drop_views(&self, views: &[String]) -> Result<()> {
        for view in views {
            self.engine
                .execute(&format!("DROP VIEW {}", escape_id(view)))?;
        }
        Ok(())
    }

    fn move_tables(&self, _tables: &[String], _views: &[String], target: &str) -> Result<()> {
        Err(DriverError::Unsupported(format!(
            "moving tables to database {}",
            target
        )))
    }
}
