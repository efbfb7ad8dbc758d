//! One open database and the operations the admin front end calls on it.

use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::DriverOptions;
use crate::db::{
    CatalogReader, DdlSynthesizer, Engine, Result, SqliteCatalog, SqliteEngine,
    SqliteSchemaEditor,
};
use crate::types::{
    ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, RebuildRequest, TableChange,
    TableDescriptor, TriggerDescriptor,
};

/// Explicit context for one logical session over one database file
pub struct Session {
    engine: Box<dyn Engine>,
}

impl Session {
    /// Open `database` inside `options.directory`; an empty name is in-memory
    pub fn open(options: &DriverOptions, database: &str) -> Result<Self> {
        let engine = if database.is_empty() {
            SqliteEngine::open_in_memory()?
        } else {
            SqliteEngine::open(options.filename(database), options)?
        };
        info!(database, version = %engine.server_info(), "database opened");
        Ok(Self::with_engine(Box::new(engine)))
    }

    pub fn with_engine(engine: Box<dyn Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub fn catalog(&self) -> SqliteCatalog<'_> {
        SqliteCatalog::new(self.engine.as_ref())
    }

    pub fn editor(&self) -> SqliteSchemaEditor<'_> {
        SqliteSchemaEditor::new(self.engine.as_ref())
    }

    /// Message of the last failed statement
    pub fn last_error(&self) -> Option<String> {
        self.engine.last_error()
    }

    pub fn table_list(&self) -> Result<BTreeMap<String, TableDescriptor>> {
        self.catalog().read_table_list()
    }

    pub fn table_descriptor(&self, name: &str) -> Result<Option<TableDescriptor>> {
        self.catalog().read_table(name)
    }

    pub fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        self.catalog().read_columns(table)
    }

    pub fn indexes(&self, table: &str) -> Result<BTreeMap<String, IndexDescriptor>> {
        self.catalog().read_indexes(table)
    }

    pub fn foreign_keys(&self, table: &str) -> Result<BTreeMap<i64, ForeignKeyDescriptor>> {
        self.catalog().read_foreign_keys(table)
    }

    pub fn triggers(&self, table: &str) -> Result<BTreeMap<String, TriggerDescriptor>> {
        self.catalog().read_triggers(table)
    }

    pub fn trigger_descriptor(&self, name: &str) -> Result<Option<TriggerDescriptor>> {
        self.catalog().read_trigger(name)
    }

    pub fn create_table(&self, table: &TableChange) -> Result<()> {
        self.editor().create_table(table)
    }

    pub fn alter_table(&self, current: &str, table: &TableChange) -> Result<()> {
        self.editor().alter_table(current, table)
    }

    /// Create `current` from `table` when it does not exist, otherwise alter it.
    /// A failed alter is rolled back and its own error returned.
    pub fn save_table(&self, current: &str, table: &TableChange) -> Result<()> {
        if self.columns(current)?.is_empty() {
            return self.create_table(table);
        }
        let outcome = self.alter_table(current, table);
        if outcome.is_err() {
            if let Err(e) = self.rollback_pending() {
                warn!(table = current, error = %e, "rollback after failed alter failed");
            }
        }
        outcome
    }

    pub fn alter_indexes(
        &self,
        table: &str,
        add: &[IndexDescriptor],
        drop: &[IndexDescriptor],
    ) -> Result<()> {
        self.editor().alter_indexes(table, add, drop)
    }

    /// Index changes through a full rebuild. Required for primary key changes.
    pub fn rebuild_table(
        &self,
        table: &str,
        add: &[IndexDescriptor],
        drop: &[IndexDescriptor],
    ) -> Result<()> {
        let request = RebuildRequest {
            name: table.to_string(),
            add_indexes: add.to_vec(),
            drop_indexes: drop.to_vec(),
            ..Default::default()
        };
        self.editor().recreate_table(&request, Some(table))
    }

    pub fn drop_tables(&self, tables: &[String]) -> Result<()> {
        self.editor().drop_tables(tables)
    }

    pub fn truncate_tables(&self, tables: &[String]) -> Result<()> {
        self.editor().truncate_tables(tables)
    }

    pub fn drop_views(&self, views: &[String]) -> Result<()> {
        self.editor().drop_views(views)
    }

    pub fn move_tables(&self, tables: &[String], views: &[String], target: &str) -> Result<()> {
        self.editor().move_tables(tables, views, target)
    }

    /// Roll back a transaction left open by a failed rebuild and turn
    /// foreign key enforcement back on. Returns whether anything was open.
    pub fn rollback_pending(&self) -> Result<bool> {
        if !self.engine.in_transaction() {
            return Ok(false);
        }
        warn!("rolling back unfinished transaction");
        self.engine.execute("ROLLBACK")?;
        self.engine.execute("PRAGMA legacy_alter_table = OFF")?;
        self.engine.execute("PRAGMA foreign_keys = ON")?;
        Ok(true)
    }
}
