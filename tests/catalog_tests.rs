//! Integration tests for catalog introspection.

mod common;

use common::recording_session;
use sqlite_dbadmin::types::{
    DefaultValue, GeneratedStorage, IndexKind, LogicalType, TableKind, TriggerEvent, TriggerTiming,
};
use sqlite_dbadmin::Engine;

#[test]
fn test_columns_round_trip() {
    let (session, _) = recording_session(
        "CREATE TABLE items (
            id INTEGER PRIMARY KEY,
            title VARCHAR(80),
            body CLOB,
            payload BLOB,
            weight DOUBLE,
            price DECIMAL(10,2)
        );",
    );
    let columns = session.columns("items").unwrap();
    let described: Vec<(&str, LogicalType)> = columns
        .iter()
        .map(|c| (c.name.as_str(), c.logical_type))
        .collect();
    assert_eq!(
        described,
        vec![
            ("id", LogicalType::Integer),
            ("title", LogicalType::Text),
            ("body", LogicalType::Text),
            ("payload", LogicalType::Blob),
            ("weight", LogicalType::Real),
            ("price", LogicalType::Numeric),
        ]
    );
}

#[test]
fn test_default_values() {
    let (session, _) = recording_session(
        "CREATE TABLE d (
            quoted TEXT DEFAULT 'it''s',
            empty TEXT DEFAULT '',
            nothing TEXT DEFAULT NULL,
            absent TEXT,
            stamp TEXT DEFAULT CURRENT_TIMESTAMP,
            computed INT DEFAULT (1 + 2)
        );",
    );
    let columns = session.columns("d").unwrap();
    assert_eq!(columns[0].default, Some(DefaultValue::Literal("it's".into())));
    assert_eq!(columns[1].default, Some(DefaultValue::Literal(String::new())));
    assert_eq!(columns[2].default, None);
    assert_eq!(columns[3].default, None);
    assert_eq!(
        columns[4].default,
        Some(DefaultValue::Expression("CURRENT_TIMESTAMP".into()))
    );
    assert_eq!(
        columns[5].default,
        Some(DefaultValue::Expression("1 + 2".into()))
    );
}

#[test]
fn test_collation_and_generated_columns() {
    let (session, _) = recording_session(
        r#"CREATE TABLE "order lines" (
            "item ""name""" TEXT COLLATE NOCASE,
            qty INT,
            price REAL,
            total REAL GENERATED ALWAYS AS (qty * price) STORED,
            label TEXT AS ('#' || qty)
        );"#,
    );
    let columns = session.columns("order lines").unwrap();
    assert_eq!(columns.len(), 5);
    assert_eq!(columns[0].name, "item \"name\"");
    assert_eq!(columns[0].collation.as_deref(), Some("NOCASE"));

    let total = columns[3].generated.as_ref().unwrap();
    assert_eq!(total.expression, "qty * price");
    assert_eq!(total.storage, GeneratedStorage::Stored);

    let label = columns[4].generated.as_ref().unwrap();
    assert_eq!(label.expression, "'#' || qty");
    assert_eq!(label.storage, GeneratedStorage::Virtual);
}

#[test]
fn test_integer_primary_key_fallback() {
    let (session, _) = recording_session("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);");
    let indexes = session.indexes("t").unwrap();
    assert_eq!(indexes.len(), 1);
    let primary = &indexes[""];
    assert_eq!(primary.kind, IndexKind::Primary);
    assert_eq!(primary.columns, vec!["id".to_string()]);
    assert_eq!(primary.descs, vec![false]);
}

#[test]
fn test_read_indexes_is_idempotent() {
    let (session, _) = recording_session(
        "CREATE TABLE t (a TEXT, b INT, c INT, PRIMARY KEY (a, b));
         CREATE UNIQUE INDEX t_c ON t (c DESC);
         CREATE INDEX t_bc ON t (b, c);",
    );
    let first = session.indexes("t").unwrap();
    let second = session.indexes("t").unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    assert_eq!(first["t_c"].kind, IndexKind::Unique);
    assert_eq!(first["t_c"].descs, vec![true]);
    assert_eq!(first["t_bc"].descs, vec![false, false]);
}

#[test]
fn test_primary_key_shadow_index_suppressed() {
    let (session, _) = recording_session("CREATE TABLE t (code TEXT PRIMARY KEY, v TEXT);");
    let indexes = session.indexes("t").unwrap();
    assert_eq!(indexes.len(), 1);
    assert!(indexes.contains_key(""));
    assert!(!indexes.keys().any(|k| k.starts_with("sqlite_autoindex")));
}

#[test]
fn test_foreign_keys_by_id() {
    let (session, _) = recording_session(
        "CREATE TABLE parent (a INT, b INT, PRIMARY KEY (a, b));
         CREATE TABLE child (
             x INT, y INT,
             FOREIGN KEY (x, y) REFERENCES parent (a, b) ON UPDATE CASCADE
         );",
    );
    let keys = session.foreign_keys("child").unwrap();
    assert_eq!(keys.len(), 1);
    let key = keys.values().next().unwrap();
    assert_eq!(key.table, "parent");
    assert_eq!(key.source, vec!["x".to_string(), "y".to_string()]);
    assert_eq!(key.target, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(key.on_update.as_deref(), Some("CASCADE"));
}

#[test]
fn test_triggers_and_descriptor() {
    let (session, _) = recording_session(
        "CREATE TABLE t (a INT, b INT);
         CREATE TABLE audit (msg TEXT);
         CREATE TRIGGER t_ins AFTER INSERT ON t BEGIN INSERT INTO audit VALUES ('ins'); END;
         CREATE TRIGGER t_upd BEFORE UPDATE OF a, b ON t FOR EACH ROW
         BEGIN INSERT INTO audit VALUES ('upd'); END;",
    );
    let triggers = session.triggers("t").unwrap();
    assert_eq!(triggers.len(), 2);
    assert_eq!(triggers["t_ins"].timing, TriggerTiming::After);
    assert_eq!(triggers["t_ins"].event, TriggerEvent::Insert);
    assert_eq!(triggers["t_upd"].event, TriggerEvent::UpdateOf);

    let full = session.trigger_descriptor("t_upd").unwrap().unwrap();
    assert_eq!(full.timing, TriggerTiming::Before);
    assert_eq!(full.columns, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(full.statement, "BEGIN INSERT INTO audit VALUES ('upd'); END");
}

#[test]
fn test_table_descriptor() {
    let (session, _) = recording_session(
        "CREATE TABLE t (id INTEGER PRIMARY KEY, n INT CHECK (n >= 0));
         INSERT INTO t (n) VALUES (1), (2), (3);
         CREATE VIEW v AS SELECT n FROM t;",
    );
    let table = session.table_descriptor("t").unwrap().unwrap();
    assert_eq!(table.kind, TableKind::Table);
    assert_eq!(table.row_count, Some(3));
    assert_eq!(table.columns.len(), 2);
    assert!(table.indexes.contains_key(""));
    assert_eq!(table.checks, vec!["n >= 0".to_string()]);

    let view = session.table_descriptor("v").unwrap().unwrap();
    assert!(view.is_view());
    assert_eq!(view.columns.len(), 1);

    assert!(session.table_descriptor("missing").unwrap().is_none());
}

#[test]
fn test_row_count_is_live() {
    let (session, _) = recording_session("CREATE TABLE t (a INT);");
    assert_eq!(session.table_list().unwrap()["t"].row_count, Some(0));
    session.engine().execute("INSERT INTO t VALUES (1)").unwrap();
    assert_eq!(session.table_list().unwrap()["t"].row_count, Some(1));
}

#[test]
fn test_introspection_executes_nothing() {
    let (session, log) = recording_session(
        "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);
         CREATE INDEX t_v ON t (v);",
    );
    session.table_descriptor("t").unwrap();
    assert!(log.executed().is_empty());
    assert!(!log.queried().is_empty());
}
