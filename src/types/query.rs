use rusqlite::types::Value as SqliteValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Display-friendly value representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<SqliteValue> for Value {
    fn from(v: SqliteValue) -> Self {
        match v {
            SqliteValue::Null => Value::Null,
            SqliteValue::Integer(i) => Value::Integer(i),
            SqliteValue::Real(r) => Value::Real(r),
            SqliteValue::Text(t) => Value::Text(t),
            SqliteValue::Blob(b) => Value::Blob(b),
        }
    }
}

impl Value {
    /// Format value for display, truncating long text/blob
    pub fn display(&self, max_len: usize) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => {
                if r.fract() == 0.0 {
                    format!("{:.0}", r)
                } else {
                    format!("{:.6}", r)
                }
            }
            Value::Text(t) => {
                if t.chars().count() > max_len {
                    let head: String = t.chars().take(max_len.saturating_sub(3)).collect();
                    format!("{}...", head)
                } else {
                    t.clone()
                }
            }
            Value::Blob(b) => format!("<BLOB {} bytes>", b.len()),
        }
    }

    /// Text form of the value, the way the catalog pragmas report it
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null | Value::Blob(_) => None,
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(r) => Some(r.to_string()),
            Value::Text(t) => Some(t.clone()),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) => Some(*r as i64),
            Value::Text(t) => t.trim().parse().ok(),
            Value::Null | Value::Blob(_) => None,
        }
    }

    /// SQL literal for embedding the value in statement text
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => r.to_string(),
            Value::Text(t) => format!("'{}'", t.replace('\'', "''")),
            Value::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
                format!("x'{}'", hex)
            }
        }
    }
}

/// One result row, addressed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, Value>,
}

impl Row {
    pub fn new(columns: &[String], values: Vec<Value>) -> Self {
        Self {
            values: columns.iter().cloned().zip(values).collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(Value::as_text)
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_integer)
    }

    pub fn flag(&self, column: &str) -> bool {
        self.integer(column).unwrap_or(0) != 0
    }
}

/// Query execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub truncated: bool,
    pub exec_ms: u64,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>, exec_ms: u64) -> Self {
        Self {
            columns,
            rows,
            truncated: false,
            exec_ms,
        }
    }

    pub fn with_truncation(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    /// Convert into name-addressed rows
    pub fn into_rows(self) -> Vec<Row> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|values| Row::new(&columns, values))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_literal() {
        assert_eq!(Value::Text("it's".into()).to_sql_literal(), "'it''s'");
        assert_eq!(Value::Blob(vec![0, 255]).to_sql_literal(), "x'00ff'");
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
    }

    #[test]
    fn test_row_accessors() {
        let columns = vec!["name".to_string(), "pk".to_string()];
        let row = Row::new(&columns, vec![Value::Text("id".into()), Value::Integer(1)]);
        assert_eq!(row.text("name").as_deref(), Some("id"));
        assert!(row.flag("pk"));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn test_display_truncates_on_char_boundary() {
        let value = Value::Text("ééééééé".into());
        assert_eq!(value.display(5), "éé...");
    }
}
