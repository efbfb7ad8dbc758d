//! Shadow-table rebuild.
//!
//! The new layout is created under a temporary name, rows are copied
//! across, the original is dropped and the copy renamed into place. Indexes,
//! triggers and the sequence value are then restored. All writes run inside
//! one transaction.
//!
//! A failed statement returns immediately and leaves the transaction open,
//! so the engine's own error text stays the last error.
//! [`crate::Session::rollback_pending`] closes it.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::db::catalog::{CatalogReader, RESERVED_PREFIX};
use crate::db::ddl::{DdlSynthesizer, SqliteSchemaEditor};
use crate::db::error::{DriverError, Result};
use crate::db::grammar::{
    column_definition, escape_id, foreign_key_clause, index_column, primary_key_clause, quote,
};
use crate::db::patterns::{self, TriggerParts};
use crate::types::{
    ColumnChange, ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, IndexKind,
    RebuildRequest,
};

/// Prefix of the shadow table during an in-place rebuild
const SHADOW_PREFIX: &str = "adminer_";

/// Table body and the secondary indexes to create afterwards
struct Layout {
    definitions: Vec<String>,
    indexes: Vec<IndexDescriptor>,
}

impl SqliteSchemaEditor<'_> {
    /// Create `request.name`, or rebuild table `current` into it.
    pub fn recreate_table(&self, request: &RebuildRequest, current: Option<&str>) -> Result<()> {
        match current.filter(|name| !name.is_empty()) {
            None => self.create_fresh(request),
            Some(current) => self.rebuild_guarded(request, current),
        }
    }

    fn create_fresh(&self, request: &RebuildRequest) -> Result<()> {
        let mut indexes = request.add_indexes.clone();
        let primary = take_primary(&mut indexes);
        let layout = layout(
            &request.columns,
            primary,
            indexes,
            request.foreign_keys.iter().cloned().collect(),
        );

        self.engine.execute(&create_table_sql(&request.name, &layout.definitions))?;
        self.alter_indexes(&request.name, &layout.indexes, &[])?;
        if let Some(value) = request.auto_increment.filter(|v| *v != 0) {
            if let Err(e) = self.write_sequence(&request.name, value) {
                warn!(table = %request.name, error = %e, "sequence update ignored");
            }
        }
        Ok(())
    }

    /// Switch off foreign key enforcement and rename rewriting for the rebuild
    fn rebuild_guarded(&self, request: &RebuildRequest, current: &str) -> Result<()> {
        let existing = self.catalog().read_columns(current)?;
        if existing.is_empty() {
            return Err(DriverError::NotFound(format!("table {}", current)));
        }

        let foreign_keys = self.pragma_flag("foreign_keys")?;
        let legacy_alter = self.pragma_flag("legacy_alter_table")?;
        if foreign_keys {
            self.engine.execute("PRAGMA foreign_keys = OFF")?;
        }
        if !legacy_alter {
            self.engine.execute("PRAGMA legacy_alter_table = ON")?;
        }

        self.rebuild(request, current, existing)?;

        if !legacy_alter {
            self.engine.execute("PRAGMA legacy_alter_table = OFF")?;
        }
        if foreign_keys {
            self.engine.execute("PRAGMA foreign_keys = ON")?;
        }
        Ok(())
    }

    fn pragma_flag(&self, pragma: &str) -> Result<bool> {
        Ok(self
            .engine
            .result(&format!("PRAGMA {}", pragma))?
            .and_then(|v| v.as_integer())
            .unwrap_or(0)
            != 0)
    }

    fn rebuild(
        &self,
        request: &RebuildRequest,
        current: &str,
        existing: Vec<ColumnDescriptor>,
    ) -> Result<()> {
        let catalog = self.catalog();
        let index_changes = !request.add_indexes.is_empty() || !request.drop_indexes.is_empty();

        let columns: Vec<ColumnChange> = if request.columns.is_empty() {
            existing
                .into_iter()
                .map(|mut column| {
                    if index_changes {
                        column.primary_key = false;
                        column.auto_increment = false;
                    }
                    ColumnChange::keep(column.name.clone(), column)
                })
                .collect()
        } else {
            request.columns.clone()
        };

        // original name -> new name
        let originals: HashMap<&str, &str> = columns
            .iter()
            .filter_map(|c| Some((c.original.as_deref()?, c.column.name.as_str())))
            .collect();
        let inline_key = columns.iter().any(|c| c.column.auto_increment);
        // Key columns the caller asked for, `None` when the flags were cleared above
        let key_columns: Option<Vec<&str>> = (!request.columns.is_empty() || !index_changes)
            .then(|| {
                let mut names: Vec<&str> = columns
                    .iter()
                    .filter(|c| c.column.primary_key)
                    .map(|c| c.column.name.as_str())
                    .collect();
                names.sort_unstable();
                names
            });

        let mut indexes = request.add_indexes.clone();
        let adds_primary = indexes.iter().any(|i| i.kind == IndexKind::Primary);
        for (name, index) in catalog.read_indexes(current)? {
            let is_primary = index.kind == IndexKind::Primary;
            let dropped = request
                .drop_indexes
                .iter()
                .any(|d| d.name == name && (d.kind == IndexKind::Primary) == is_primary);
            if dropped || (is_primary && (inline_key || adds_primary)) {
                continue;
            }
            let Some(mapped) = index
                .columns
                .iter()
                .map(|c| originals.get(c.as_str()).map(|n| n.to_string()))
                .collect::<Option<Vec<String>>>()
            else {
                debug!(table = current, index = %name, "index refers to a dropped column");
                continue;
            };
            // The existing key keeps its order and sort flags while it covers the same columns
            if is_primary {
                if let Some(wanted) = &key_columns {
                    let mut have: Vec<&str> = mapped.iter().map(String::as_str).collect();
                    have.sort_unstable();
                    if &have != wanted {
                        debug!(table = current, "primary key columns changed");
                        continue;
                    }
                }
            }
            let name = if name.starts_with(RESERVED_PREFIX) {
                String::new()
            } else {
                name
            };
            indexes.push(IndexDescriptor {
                name,
                kind: index.kind,
                columns: mapped,
                descs: index.descs,
                lengths: Vec::new(),
            });
        }
        let primary = take_primary(&mut indexes);

        let mut foreign_keys: Vec<ForeignKeyDescriptor> = Vec::new();
        for key in catalog.read_foreign_keys(current)?.into_values() {
            let Some(source) = key
                .source
                .iter()
                .map(|c| originals.get(c.as_str()).map(|n| n.to_string()))
                .collect::<Option<Vec<String>>>()
            else {
                debug!(table = current, parent = %key.table, "foreign key refers to a dropped column");
                continue;
            };
            foreign_keys.push(ForeignKeyDescriptor { source, ..key });
        }
        for key in &request.foreign_keys {
            if !foreign_keys.contains(key) {
                foreign_keys.push(key.clone());
            }
        }

        let layout = layout(&columns, primary, indexes, foreign_keys);

        let triggers: Vec<String> = catalog
            .stored_triggers(current)?
            .into_iter()
            .map(|(name, sql)| match patterns::trigger_definition(&sql) {
                Some(parts) => trigger_sql(&name, &parts, &request.name),
                None => {
                    warn!(trigger = %name, "trigger replayed from stored text");
                    sql
                }
            })
            .collect();

        let sequence = match request.auto_increment {
            Some(value) => value,
            None => self.current_sequence(current),
        };

        self.engine.execute("BEGIN")?;

        let in_place = request.name == current;
        let target = if in_place {
            format!("{}{}", SHADOW_PREFIX, request.name)
        } else {
            request.name.clone()
        };
        info!(table = current, shadow = %target, "creating rebuilt table");
        self.engine.execute(&create_table_sql(&target, &layout.definitions))?;

        let copied: Vec<&ColumnChange> = columns
            .iter()
            .filter(|c| c.original.is_some() && c.column.generated.is_none())
            .collect();
        if !copied.is_empty() {
            let into: Vec<String> = copied.iter().map(|c| escape_id(&c.column.name)).collect();
            let from: Vec<String> = copied
                .iter()
                .filter_map(|c| c.original.as_deref().map(escape_id))
                .collect();
            self.engine.execute(&format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                escape_id(&target),
                into.join(", "),
                from.join(", "),
                escape_id(current)
            ))?;
        }

        self.engine
            .execute(&format!("DROP TABLE {}", escape_id(current)))?;
        if in_place {
            self.engine.execute(&format!(
                "ALTER TABLE {} RENAME TO {}",
                escape_id(&target),
                escape_id(&request.name)
            ))?;
        }
        info!(table = %request.name, "rebuilt table swapped in");
        self.alter_indexes(&request.name, &layout.indexes, &[])?;

        if sequence != 0 {
            if let Err(e) = self.write_sequence(&request.name, sequence) {
                warn!(table = %request.name, error = %e, "sequence update ignored");
            }
        }

        for trigger in &triggers {
            self.engine.execute(trigger)?;
        }

        self.check_foreign_keys(&request.name);
        self.engine.execute("COMMIT")?;
        info!(table = %request.name, "rebuild committed");
        Ok(())
    }

    /// Last sequence value of `table`, zero when there is none
    fn current_sequence(&self, table: &str) -> i64 {
        let sql = format!(
            "SELECT seq FROM sqlite_sequence WHERE name = {}",
            quote(table)
        );
        match self.engine.result(&sql) {
            Ok(value) => value.and_then(|v| v.as_integer()).unwrap_or(0),
            Err(e) => {
                debug!(table, error = %e, "no sequence to carry over");
                0
            }
        }
    }

    fn check_foreign_keys(&self, table: &str) {
        match self
            .engine
            .rows(&format!("PRAGMA foreign_key_check({})", escape_id(table)))
        {
            Ok(violations) if !violations.is_empty() => {
                warn!(table, count = violations.len(), "foreign key violations after rebuild");
            }
            Ok(_) => {}
            Err(e) => debug!(table, error = %e, "foreign key check skipped"),
        }
    }
}

/// Remove PRIMARY entries from `indexes`, returning the key clause columns
fn take_primary(indexes: &mut Vec<IndexDescriptor>) -> Option<Vec<String>> {
    let mut primary = None;
    indexes.retain(|index| {
        if index.kind != IndexKind::Primary {
            return true;
        }
        primary = Some(
            index
                .columns
                .iter()
                .enumerate()
                .map(|(i, column)| index_column(column, index.is_descending(i)))
                .collect(),
        );
        false
    });
    primary
}

fn layout(
    columns: &[ColumnChange],
    primary: Option<Vec<String>>,
    indexes: Vec<IndexDescriptor>,
    foreign_keys: Vec<ForeignKeyDescriptor>,
) -> Layout {
    let mut definitions: Vec<String> = columns
        .iter()
        .map(|c| column_definition(&c.column))
        .collect();

    let inline_key = columns.iter().any(|c| c.column.auto_increment);
    let primary = primary.or_else(|| {
        let keys: Vec<String> = columns
            .iter()
            .filter(|c| c.column.primary_key)
            .map(|c| escape_id(&c.column.name))
            .collect();
        (!inline_key && !keys.is_empty()).then_some(keys)
    });
    if let Some(primary) = primary {
        definitions.push(primary_key_clause(&primary));
    }
    definitions.extend(foreign_keys.iter().map(foreign_key_clause));

    Layout {
        definitions,
        indexes,
    }
}

fn create_table_sql(table: &str, definitions: &[String]) -> String {
    format!(
        "CREATE TABLE {} (\n  {}\n)",
        escape_id(table),
        definitions.join(",\n  ")
    )
}

fn trigger_sql(name: &str, parts: &TriggerParts, table: &str) -> String {
    let mut sql = format!(
        "CREATE TRIGGER {} {} {}",
        escape_id(name),
        parts.timing.as_str(),
        parts.event.as_str()
    );
    if !parts.columns.is_empty() {
        let columns: Vec<String> = parts.columns.iter().map(|c| escape_id(c)).collect();
        sql.push(' ');
        sql.push_str(&columns.join(", "));
    }
    sql.push_str(&format!(" ON {}\n{}", escape_id(table), parts.statement));
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TriggerEvent, TriggerTiming};

    #[test]
    fn test_layout_inline_auto_increment() {
        let mut id = ColumnDescriptor::new("id", "INTEGER");
        id.primary_key = true;
        id.auto_increment = true;
        let columns = vec![
            ColumnChange::add(id),
            ColumnChange::add(ColumnDescriptor::new("v", "TEXT")),
        ];
        let layout = layout(&columns, None, Vec::new(), Vec::new());
        assert_eq!(
            layout.definitions,
            vec![
                "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
                "\"v\" TEXT".to_string(),
            ]
        );
    }

    #[test]
    fn test_layout_trailing_primary_key() {
        let mut a = ColumnDescriptor::new("a", "TEXT");
        a.primary_key = true;
        let mut b = ColumnDescriptor::new("b", "INT");
        b.primary_key = true;
        let columns = vec![ColumnChange::add(a), ColumnChange::add(b)];
        let layout = layout(&columns, None, Vec::new(), Vec::new());
        assert_eq!(layout.definitions[2], "PRIMARY KEY (\"a\", \"b\")");
    }

    #[test]
    fn test_take_primary_keeps_secondary() {
        let mut primary = IndexDescriptor::new(IndexKind::Primary, "", vec!["a".into(), "b".into()]);
        primary.descs = vec![false, true];
        let mut indexes = vec![
            IndexDescriptor::new(IndexKind::Index, "idx", vec!["c".into()]),
            primary,
        ];
        let clause = take_primary(&mut indexes).unwrap();
        assert_eq!(clause, vec!["\"a\"".to_string(), "\"b\" DESC".to_string()]);
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, "idx");
    }

    #[test]
    fn test_trigger_sql_rebinds_table() {
        let parts = TriggerParts {
            timing: TriggerTiming::After,
            event: TriggerEvent::UpdateOf,
            columns: vec!["a".into()],
            statement: "BEGIN SELECT 1; END".into(),
        };
        assert_eq!(
            trigger_sql("tr", &parts, "t2"),
            "CREATE TRIGGER \"tr\" AFTER UPDATE OF \"a\" ON \"t2\"\nBEGIN SELECT 1; END"
        );
    }

    #[test]
    fn test_create_table_sql() {
        let definitions = vec!["\"a\" INT".to_string(), "\"b\" TEXT".to_string()];
        assert_eq!(
            create_table_sql("t", &definitions),
            "CREATE TABLE \"t\" (\n  \"a\" INT,\n  \"b\" TEXT\n)"
        );
    }
}
