//! Catalog reader: structured descriptors from `sqlite_master` and the
//! introspection pragmas.
//!
//! Descriptors are snapshots. Every call goes back to the engine; nothing is
//! cached between calls.

use std::collections::BTreeMap;
use tracing::debug;

use crate::db::engine::Engine;
use crate::db::error::Result;
use crate::db::grammar::{escape_id, index_column, quote};
use crate::db::patterns;
use crate::types::{
    ColumnDescriptor, ForeignKeyDescriptor, GeneratedColumn, GeneratedStorage, IndexDescriptor,
    IndexKind, LogicalType, TableDescriptor, TableKind, TriggerDescriptor,
};

/// Prefix of names the engine reserves for its own objects
pub const RESERVED_PREFIX: &str = "sqlite_";

/// Read-only schema introspection
pub trait CatalogReader {
    /// Tables and views by name, with kind and row count only
    fn read_table_list(&self) -> Result<BTreeMap<String, TableDescriptor>>;

    /// Full snapshot of one table or view, `None` when it does not exist
    fn read_table(&self, name: &str) -> Result<Option<TableDescriptor>>;

    /// Columns in declaration order; empty when the table does not exist
    fn read_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Indexes by name. The primary key, if any, is keyed by `""`.
    fn read_indexes(&self, table: &str) -> Result<BTreeMap<String, IndexDescriptor>>;

    /// Foreign keys by the engine's relationship id
    fn read_foreign_keys(&self, table: &str) -> Result<BTreeMap<i64, ForeignKeyDescriptor>>;

    /// Triggers by name, with timing and event only
    fn read_triggers(&self, table: &str) -> Result<BTreeMap<String, TriggerDescriptor>>;

    /// One trigger including its body
    fn read_trigger(&self, name: &str) -> Result<Option<TriggerDescriptor>>;

    fn read_check_constraints(&self, table: &str) -> Result<Vec<String>>;
}

/// Catalog reader over a borrowed engine
#[derive(Clone, Copy)]
pub struct SqliteCatalog<'e> {
    engine: &'e dyn Engine,
}

impl<'e> SqliteCatalog<'e> {
    pub fn new(engine: &'e dyn Engine) -> Self {
        Self { engine }
    }

    /// Stored `CREATE TABLE` or `CREATE VIEW` text
    pub fn table_sql(&self, table: &str) -> Result<Option<String>> {
        let value = self.engine.result(&format!(
            "SELECT sql FROM sqlite_master WHERE type IN ('table', 'view') AND name = {}",
            quote(table)
        ))?;
        Ok(value.and_then(|v| v.as_text()))
    }

    /// Stored trigger statements of a table as `(name, sql)`
    pub fn stored_triggers(&self, table: &str) -> Result<Vec<(String, String)>> {
        let rows = self.engine.rows(&format!(
            "SELECT name, sql FROM sqlite_master WHERE type = 'trigger' AND tbl_name = {} ORDER BY name",
            quote(table)
        ))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| Some((row.text("name")?, row.text("sql")?)))
            .collect())
    }

    /// `CREATE TABLE` text followed by one `CREATE INDEX` per secondary index
    pub fn create_table_sql(&self, table: &str) -> Result<Option<String>> {
        let Some(mut sql) = self.table_sql(table)? else {
            return Ok(None);
        };
        for (name, index) in self.read_indexes(table)? {
            if name.is_empty() {
                continue;
            }
            let columns: Vec<String> = index
                .columns
                .iter()
                .enumerate()
                .map(|(i, column)| index_column(column, index.is_descending(i)))
                .collect();
            let keyword = match index.kind {
                IndexKind::Unique => "UNIQUE INDEX",
                _ => "INDEX",
            };
            sql.push_str(&format!(
                ";\n\nCREATE {} {} ON {} ({})",
                keyword,
                escape_id(&name),
                escape_id(table),
                columns.join(", ")
            ));
        }
        Ok(Some(sql))
    }

    /// Stored trigger statements, each terminated by `;;`
    pub fn create_trigger_sql(&self, table: &str) -> Result<String> {
        Ok(self
            .stored_triggers(table)?
            .into_iter()
            .map(|(_, sql)| format!("{};;\n", sql))
            .collect())
    }

    /// Whether the linked engine was built with foreign key support
    pub fn supports_foreign_keys(&self) -> Result<bool> {
        let omitted = self
            .engine
            .result("SELECT sqlite_compileoption_used('OMIT_FOREIGN_KEY')")?
            .and_then(|v| v.as_integer())
            .unwrap_or(0);
        Ok(omitted == 0)
    }

    /// The `SELECT` a view is defined by
    pub fn view(&self, name: &str) -> Result<Option<String>> {
        let sql = self.engine.result(&format!(
            "SELECT sql FROM sqlite_master WHERE type = 'view' AND name = {}",
            quote(name)
        ))?;
        Ok(sql.and_then(|v| v.as_text()).map(|sql| patterns::view_select(&sql)))
    }

    pub fn is_view(&self, table: &str) -> Result<bool> {
        let kind = self.engine.result(&format!(
            "SELECT type FROM sqlite_master WHERE name = {}",
            quote(table)
        ))?;
        Ok(kind.and_then(|v| v.as_text()).as_deref() == Some("view"))
    }

    fn row_count(&self, table: &str) -> Option<u64> {
        match self
            .engine
            .result(&format!("SELECT COUNT(*) FROM {}", escape_id(table)))
        {
            Ok(value) => value.and_then(|v| v.as_integer()).map(|n| n as u64),
            Err(e) => {
                debug!(table, error = %e, "row count unavailable");
                None
            }
        }
    }

    fn primary_index(
        &self,
        create_sql: Option<&str>,
        columns: &[ColumnDescriptor],
    ) -> Option<IndexDescriptor> {
        if let Some(key) = create_sql.and_then(patterns::primary_key_columns) {
            let (names, descs): (Vec<String>, Vec<bool>) = key.into_iter().unzip();
            let mut index = IndexDescriptor::new(IndexKind::Primary, "", names);
            index.descs = descs;
            return Some(index);
        }
        let names: Vec<String> = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(IndexDescriptor::new(IndexKind::Primary, "", names))
        }
    }
}

/// Whether `index` is the engine's own shadow of the primary key
fn shadows_primary(index: &IndexDescriptor, primary: Option<&IndexDescriptor>) -> bool {
    match primary {
        Some(primary) => {
            index.kind == IndexKind::Unique
                && index.columns == primary.columns
                && index.descs == primary.descs
                && index.name.starts_with(RESERVED_PREFIX)
        }
        None => false,
    }
}

impl CatalogReader for SqliteCatalog<'_> {
    fn read_table_list(&self) -> Result<BTreeMap<String, TableDescriptor>> {
        let rows = self.engine.rows(&format!(
            "SELECT name, type FROM sqlite_master WHERE type IN ('table', 'view') AND (name NOT LIKE '{}%' OR name = 'sqlite_sequence') ORDER BY (name = 'sqlite_sequence'), name",
            RESERVED_PREFIX
        ))?;
        let mut tables = BTreeMap::new();
        for row in rows {
            let Some(name) = row.text("name") else {
                continue;
            };
            let kind = if row.text("type").as_deref() == Some("view") {
                TableKind::View
            } else {
                TableKind::Table
            };
            let row_count = match kind {
                TableKind::Table => self.row_count(&name),
                TableKind::View => None,
            };
            tables.insert(
                name.clone(),
                TableDescriptor {
                    name,
                    kind,
                    row_count,
                    columns: Vec::new(),
                    indexes: BTreeMap::new(),
                    foreign_keys: BTreeMap::new(),
                    triggers: BTreeMap::new(),
                    checks: Vec::new(),
                },
            );
        }
        Ok(tables)
    }

    fn read_table(&self, name: &str) -> Result<Option<TableDescriptor>> {
        let kind = self.engine.result(&format!(
            "SELECT type FROM sqlite_master WHERE type IN ('table', 'view') AND name = {}",
            quote(name)
        ))?;
        let Some(kind) = kind.and_then(|v| v.as_text()) else {
            return Ok(None);
        };

        if kind == "view" {
            return Ok(Some(TableDescriptor {
                name: name.to_string(),
                kind: TableKind::View,
                row_count: None,
                columns: self.read_columns(name)?,
                indexes: BTreeMap::new(),
                foreign_keys: BTreeMap::new(),
                triggers: self.read_triggers(name)?,
                checks: Vec::new(),
            }));
        }

        Ok(Some(TableDescriptor {
            name: name.to_string(),
            kind: TableKind::Table,
            row_count: self.row_count(name),
            columns: self.read_columns(name)?,
            indexes: self.read_indexes(name)?,
            foreign_keys: self.read_foreign_keys(name)?,
            triggers: self.read_triggers(name)?,
            checks: self.read_check_constraints(name)?,
        }))
    }

    fn read_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let rows = self
            .engine
            .rows(&format!("PRAGMA table_xinfo({})", escape_id(table)))?;

        let mut columns = Vec::with_capacity(rows.len());
        let mut hidden_generated = Vec::new();
        for row in rows {
            let hidden = row.integer("hidden").unwrap_or(0);
            if hidden == 1 {
                continue;
            }
            let Some(name) = row.text("name") else {
                continue;
            };
            let declared_type = row.text("type").unwrap_or_default();
            if hidden == 2 || hidden == 3 {
                hidden_generated.push((name.clone(), hidden == 3));
            }
            columns.push(ColumnDescriptor {
                logical_type: LogicalType::from_declared(&declared_type),
                declared_type,
                nullable: !row.flag("notnull"),
                default: patterns::parse_default(row.text("dflt_value").as_deref()),
                collation: None,
                generated: None,
                primary_key: row.integer("pk").unwrap_or(0) > 0,
                auto_increment: false,
                name,
            });
        }

        let key_columns = columns.iter().filter(|c| c.primary_key).count();
        if key_columns == 1 {
            // Only a column declared exactly INTEGER aliases the rowid
            if let Some(column) = columns
                .iter_mut()
                .find(|c| c.primary_key && c.declared_type.eq_ignore_ascii_case("integer"))
            {
                column.auto_increment = true;
            }
        }

        if columns.is_empty() {
            return Ok(columns);
        }

        if let Some(sql) = self.table_sql(table)? {
            for (name, collation) in patterns::column_collations(&sql) {
                if let Some(column) = columns.iter_mut().find(|c| c.name == name) {
                    column.collation = Some(collation);
                }
            }
            for (name, generated) in patterns::generated_columns(&sql) {
                if let Some(column) = columns.iter_mut().find(|c| c.name == name) {
                    column.generated = Some(generated);
                }
            }
        }

        for (name, stored) in hidden_generated {
            if let Some(column) = columns
                .iter_mut()
                .find(|c| c.name == name && c.generated.is_none())
            {
                debug!(table, column = %name, "generated column expression not recovered");
                column.generated = Some(GeneratedColumn {
                    expression: String::new(),
                    storage: if stored {
                        GeneratedStorage::Stored
                    } else {
                        GeneratedStorage::Virtual
                    },
                });
            }
        }

        Ok(columns)
    }

    fn read_indexes(&self, table: &str) -> Result<BTreeMap<String, IndexDescriptor>> {
        let columns = self.read_columns(table)?;
        let create_sql = self.table_sql(table)?;
        let primary = self.primary_index(create_sql.as_deref(), &columns);

        let mut indexes = BTreeMap::new();
        let list = self
            .engine
            .rows(&format!("PRAGMA index_list({})", escape_id(table)))?;
        for entry in list {
            let Some(name) = entry.text("name") else {
                continue;
            };
            let index_columns: Vec<String> = self
                .engine
                .rows(&format!("PRAGMA index_info({})", escape_id(&name)))?
                .into_iter()
                .map(|row| row.text("name").unwrap_or_default())
                .collect();

            let sql = self
                .engine
                .result(&format!(
                    "SELECT sql FROM sqlite_master WHERE type = 'index' AND name = {}",
                    quote(&name)
                ))?
                .and_then(|v| v.as_text());
            // Automatic indexes have no stored SQL
            let mut descs = match sql.as_deref() {
                Some(sql) => patterns::index_descending(sql),
                None => self
                    .engine
                    .rows(&format!("PRAGMA index_xinfo({})", escape_id(&name)))?
                    .into_iter()
                    .filter(|row| row.flag("key"))
                    .map(|row| row.flag("desc"))
                    .collect(),
            };
            descs.resize(index_columns.len(), false);

            let kind = if entry.flag("unique") {
                IndexKind::Unique
            } else {
                IndexKind::Index
            };
            let index = IndexDescriptor {
                name: name.clone(),
                kind,
                columns: index_columns,
                descs,
                lengths: Vec::new(),
            };
            if shadows_primary(&index, primary.as_ref()) {
                debug!(table, index = %name, "skipping primary key shadow index");
                continue;
            }
            indexes.insert(name, index);
        }

        if let Some(primary) = primary {
            indexes.insert(String::new(), primary);
        }
        Ok(indexes)
    }

    fn read_foreign_keys(&self, table: &str) -> Result<BTreeMap<i64, ForeignKeyDescriptor>> {
        let rows = self
            .engine
            .rows(&format!("PRAGMA foreign_key_list({})", escape_id(table)))?;

        let mut keys: BTreeMap<i64, ForeignKeyDescriptor> = BTreeMap::new();
        for row in rows {
            let id = row.integer("id").unwrap_or(0);
            let key = keys.entry(id).or_insert_with(|| ForeignKeyDescriptor {
                table: row.text("table").unwrap_or_default(),
                source: Vec::new(),
                target: Vec::new(),
                on_update: referential_action(row.text("on_update")),
                on_delete: referential_action(row.text("on_delete")),
            });
            if let Some(from) = row.text("from") {
                key.source.push(from);
            }
            if let Some(to) = row.text("to") {
                key.target.push(to);
            }
        }
        Ok(keys)
    }

    fn read_triggers(&self, table: &str) -> Result<BTreeMap<String, TriggerDescriptor>> {
        let mut triggers = BTreeMap::new();
        for (name, sql) in self.stored_triggers(table)? {
            match patterns::trigger_timing_event(&sql) {
                Some((timing, event, columns)) => {
                    triggers.insert(
                        name.clone(),
                        TriggerDescriptor {
                            name,
                            timing,
                            event,
                            columns,
                            statement: String::new(),
                        },
                    );
                }
                None => debug!(table, trigger = %name, "trigger header not recognised"),
            }
        }
        Ok(triggers)
    }

    fn read_trigger(&self, name: &str) -> Result<Option<TriggerDescriptor>> {
        let sql = self.engine.result(&format!(
            "SELECT sql FROM sqlite_master WHERE type = 'trigger' AND name = {}",
            quote(name)
        ))?;
        let Some(sql) = sql.and_then(|v| v.as_text()) else {
            return Ok(None);
        };
        match patterns::trigger_definition(&sql) {
            Some(parts) => Ok(Some(TriggerDescriptor {
                name: name.to_string(),
                timing: parts.timing,
                event: parts.event,
                columns: parts.columns,
                statement: parts.statement,
            })),
            None => {
                debug!(trigger = name, "trigger definition not recognised");
                Ok(None)
            }
        }
    }

    fn read_check_constraints(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .table_sql(table)?
            .map(|sql| patterns::check_constraints(&sql))
            .unwrap_or_default())
    }
}

fn referential_action(action: Option<String>) -> Option<String> {
    action.filter(|a| !a.is_empty() && !a.eq_ignore_ascii_case("NO ACTION"))
}
