use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("No compatible SQLite engine: {0}")]
    EngineUnavailable(String),
    /// A statement failed; `message` is the engine's own text
    #[error("{message}")]
    Statement {
        sql: String,
        code: Option<i32>,
        message: String,
    },
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid SQLite file: {0}")]
    InvalidFile(String),
    #[error("Invalid database name '{name}': use one of the extensions {extensions}")]
    InvalidName { name: String, extensions: String },
    #[error("File exists: {0}")]
    FileExists(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DriverError>;

impl DriverError {
    /// Wrap a rusqlite failure for the statement that caused it
    pub fn statement(sql: &str, error: rusqlite::Error) -> Self {
        let code = match &error {
            rusqlite::Error::SqliteFailure(err, _) => Some(err.extended_code),
            _ => None,
        };
        let message = match &error {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.clone(),
            other => other.to_string(),
        };
        DriverError::Statement {
            sql: sql.to_string(),
            code,
            message,
        }
    }
}

/// User-friendly error formatting
pub fn describe_failure(error: &DriverError) -> String {
    match error {
        DriverError::Statement {
            sql,
            code: Some(code),
            message,
        } => format_sqlite_error(*code, message, sql),
        DriverError::Statement {
            sql,
            code: None,
            message,
        } => format!("SQL error: {}\n\nQuery: {}", message, truncate_query(sql)),
        other => other.to_string(),
    }
}

fn format_sqlite_error(code: i32, message: &str, query: &str) -> String {
    let mut result = String::new();

    // Primary result code lives in the low byte of the extended code
    match code & 0xff {
        1 => {
            // SQLITE_ERROR
            if message.contains("no such table") {
                result.push_str("Table not found\n\n");
                result.push_str(&suggest_table_name(message));
            } else if message.contains("no such column") {
                result.push_str("Column not found\n\n");
                result.push_str(&suggest_column_name(message));
            } else {
                result.push_str(&format!("SQL error: {}\n", message));
            }
        }
        5 => {
            // SQLITE_BUSY
            result.push_str("Database is locked\n\n");
            result.push_str("Another process is using the database. Try again in a moment.");
        }
        19 => {
            // SQLITE_CONSTRAINT
            result.push_str(&format!("Constraint violation: {}\n", message));
        }
        _ => {
            result.push_str(&format!("SQL error (code {}): {}\n", code, message));
        }
    }

    result.push_str(&format!("\nQuery: {}", truncate_query(query)));
    result
}

fn suggest_table_name(message: &str) -> String {
    if let Some(start) = message.find(": ") {
        let table_part = &message[start + 2..];
        format!("Unknown table: {}\n\nHint: Run `tables` to list available tables", table_part)
    } else {
        "Hint: Run `tables` to list available tables".to_string()
    }
}

fn suggest_column_name(message: &str) -> String {
    if let Some(start) = message.find(": ") {
        let col_part = &message[start + 2..];
        format!("Unknown column: {}\n\nHint: Run `describe` to view the table schema", col_part)
    } else {
        "Hint: Run `describe` to view the table schema".to_string()
    }
}

fn truncate_query(query: &str) -> String {
    if query.chars().count() > 100 {
        let head: String = query.chars().take(97).collect();
        format!("{}...", head)
    } else {
        query.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_error_keeps_engine_message() {
        let error = DriverError::Statement {
            sql: "SELECT * FROM nope".into(),
            code: Some(1),
            message: "no such table: nope".into(),
        };
        assert_eq!(error.to_string(), "no such table: nope");
        let described = describe_failure(&error);
        assert!(described.starts_with("Table not found"));
        assert!(described.contains("Unknown table: nope"));
    }

    #[test]
    fn test_extended_constraint_code() {
        // SQLITE_CONSTRAINT_UNIQUE
        let error = DriverError::Statement {
            sql: "INSERT INTO t VALUES (1)".into(),
            code: Some(2067),
            message: "UNIQUE constraint failed: t.a".into(),
        };
        assert!(describe_failure(&error).starts_with("Constraint violation"));
    }

    #[test]
    fn test_truncate_long_query() {
        let query = "x".repeat(150);
        assert_eq!(truncate_query(&query).chars().count(), 100);
    }
}
