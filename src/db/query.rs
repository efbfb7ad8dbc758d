use crate::db::engine::Engine;
use crate::db::error::Result;
use crate::db::grammar::escape_id;
use crate::types::{QueryResult, Value};

/// Rows returned by [`execute_query`] when no limit is given
pub const DEFAULT_MAX_ROWS: usize = 1000;

/// Execute a SQL query and return at most `max_rows` rows
pub fn execute_query(
    engine: &dyn Engine,
    query: &str,
    max_rows: Option<usize>,
) -> Result<QueryResult> {
    engine.query_limited(query, max_rows.unwrap_or(DEFAULT_MAX_ROWS))
}

/// Get paginated rows from a table
pub fn select_rows(
    engine: &dyn Engine,
    table: &str,
    limit: usize,
    offset: usize,
) -> Result<QueryResult> {
    engine.query(&format!(
        "SELECT * FROM {} LIMIT {} OFFSET {}",
        escape_id(table),
        limit,
        offset
    ))
}

/// Insert rows, replacing any that collide on a unique key
pub fn insert_or_update(
    engine: &dyn Engine,
    table: &str,
    columns: &[String],
    rows: &[Vec<Value>],
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let columns: Vec<String> = columns.iter().map(|c| escape_id(c)).collect();
    let values: Vec<String> = rows
        .iter()
        .map(|row| {
            let literals: Vec<String> = row.iter().map(Value::to_sql_literal).collect();
            format!("({})", literals.join(", "))
        })
        .collect();
    engine.execute(&format!(
        "REPLACE INTO {} ({}) VALUES\n{}",
        escape_id(table),
        columns.join(", "),
        values.join(",\n")
    ))
}

pub fn last_auto_increment_id(engine: &dyn Engine) -> i64 {
    engine.last_insert_rowid()
}

/// The engine's query plan for `query`
pub fn explain(engine: &dyn Engine, query: &str) -> Result<QueryResult> {
    engine.query(&format!("EXPLAIN QUERY PLAN {}", query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::engine::SqliteEngine;

    fn engine_with_rows(count: i64) -> SqliteEngine {
        let engine = SqliteEngine::open_in_memory().unwrap();
        engine
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
            .unwrap();
        for i in 1..=count {
            engine
                .execute(&format!("INSERT INTO t (v) VALUES ('row {}')", i))
                .unwrap();
        }
        engine
    }

    #[test]
    fn test_execute_query_truncates() {
        let engine = engine_with_rows(5);
        let result = execute_query(&engine, "SELECT * FROM t", Some(3)).unwrap();
        assert_eq!(result.rows.len(), 3);
        assert!(result.truncated);

        let result = execute_query(&engine, "SELECT * FROM t", None).unwrap();
        assert_eq!(result.rows.len(), 5);
        assert!(!result.truncated);
    }

    #[test]
    fn test_select_rows_pages() {
        let engine = engine_with_rows(5);
        let page = select_rows(&engine, "t", 2, 2).unwrap();
        assert_eq!(page.columns, vec!["id".to_string(), "v".to_string()]);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0][0], Value::Integer(3));
    }

    #[test]
    fn test_insert_or_update_replaces() {
        let engine = engine_with_rows(2);
        let columns = vec!["id".to_string(), "v".to_string()];
        let rows = vec![
            vec![Value::Integer(1), Value::Text("it's new".into())],
            vec![Value::Integer(9), Value::Null],
        ];
        assert_eq!(insert_or_update(&engine, "t", &columns, &rows).unwrap(), 2);
        assert_eq!(last_auto_increment_id(&engine), 9);

        let value = engine.result("SELECT v FROM t WHERE id = 1").unwrap();
        assert_eq!(value, Some(Value::Text("it's new".into())));
        let count = engine.result("SELECT COUNT(*) FROM t").unwrap();
        assert_eq!(count, Some(Value::Integer(3)));
    }

    #[test]
    fn test_explain() {
        let engine = engine_with_rows(1);
        let plan = explain(&engine, "SELECT * FROM t WHERE id = 1").unwrap();
        assert!(plan.columns.contains(&"detail".to_string()));
        assert!(!plan.rows.is_empty());
    }
}
