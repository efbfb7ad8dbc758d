//! The embedded engine seam.
//!
//! Everything above this module talks to SQLite through [`Engine`], which
//! only knows how to run SQL text. [`SqliteEngine`] is the rusqlite-backed
//! implementation; tests wrap it to capture the statements they care about.

use rusqlite::{Connection, OpenFlags};
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use crate::config::DriverOptions;
use crate::db::error::{DriverError, Result};
use crate::types::{QueryResult, Row, Value};

/// Oldest SQLite with `PRAGMA table_xinfo`
const MIN_VERSION_NUMBER: i32 = 3_026_000;

/// Text-level access to an embedded SQL engine
pub trait Engine {
    /// Run a statement that returns no rows, returning the affected row count
    fn execute(&self, sql: &str) -> Result<usize>;

    /// Run a statement and collect every row
    fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Run a statement reading at most `max_rows` rows. The result is
    /// marked truncated when more rows were available.
    fn query_limited(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        let mut result = self.query(sql)?;
        let truncated = result.rows.len() > max_rows;
        result.rows.truncate(max_rows);
        Ok(result.with_truncation(truncated))
    }

    fn rows(&self, sql: &str) -> Result<Vec<Row>> {
        Ok(self.query(sql)?.into_rows())
    }

    /// First column of the first row, `None` when there is no row
    fn result(&self, sql: &str) -> Result<Option<Value>> {
        Ok(self
            .query(sql)?
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next()))
    }

    /// One column of every row
    fn values(&self, sql: &str, column: usize) -> Result<Vec<Value>> {
        Ok(self
            .query(sql)?
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().nth(column))
            .collect())
    }

    /// Message of the last failed statement, cleared by the next success
    fn last_error(&self) -> Option<String>;

    fn affected_rows(&self) -> usize;

    fn last_insert_rowid(&self) -> i64;

    fn in_transaction(&self) -> bool;

    fn server_info(&self) -> String;
}

/// Engine backed by a rusqlite connection
pub struct SqliteEngine {
    conn: Connection,
    last_error: RefCell<Option<String>>,
    affected: Cell<usize>,
}

impl SqliteEngine {
    /// Open a database file
    pub fn open<P: AsRef<Path>>(path: P, options: &DriverOptions) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();

        if path_str != ":memory:" && !path.exists() {
            return Err(DriverError::NotFound(path_str));
        }

        let flags = if options.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };
        Self::open_with_flags(path, flags, options)
    }

    /// Open a database file, creating it if needed
    pub fn create<P: AsRef<Path>>(path: P, options: &DriverOptions) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        Self::open_with_flags(path.as_ref(), flags, options)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn open_with_flags(path: &Path, flags: OpenFlags, options: &DriverOptions) -> Result<Self> {
        let path_str = path.to_string_lossy().to_string();
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            if is_invalid_file(&e) {
                DriverError::InvalidFile(path_str.clone())
            } else {
                DriverError::from(e)
            }
        })?;

        conn.busy_timeout(options.busy_timeout)?;

        Self::from_connection(conn).map_err(|e| match e {
            DriverError::Statement { ref message, .. }
                if message.contains("not a database") || message.contains("file is encrypted") =>
            {
                DriverError::InvalidFile(path_str)
            }
            other => other,
        })
    }

    /// Wrap an open connection. Fails when the linked SQLite is too old.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        if rusqlite::version_number() < MIN_VERSION_NUMBER {
            return Err(DriverError::EngineUnavailable(format!(
                "SQLite {} is older than 3.26.0",
                rusqlite::version()
            )));
        }

        let engine = Self {
            conn,
            last_error: RefCell::new(None),
            affected: Cell::new(0),
        };
        engine.execute("PRAGMA foreign_keys = ON")?;
        Ok(engine)
    }

    /// Get the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Read rows until `limit` is reached; one row past it marks truncation
    fn collect(&self, sql: &str, limit: Option<usize>) -> rusqlite::Result<QueryResult> {
        let start = Instant::now();
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let column_count = columns.len();

        let mut rows = Vec::new();
        let mut truncated = false;
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            if limit.is_some_and(|limit| rows.len() >= limit) {
                truncated = true;
                break;
            }
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value: rusqlite::types::Value = row.get(i)?;
                values.push(Value::from(value));
            }
            rows.push(values);
        }
        if column_count == 0 {
            self.affected.set(self.conn.changes() as usize);
        }

        let exec_ms = start.elapsed().as_millis() as u64;
        Ok(QueryResult::new(columns, rows, exec_ms).with_truncation(truncated))
    }

    fn record<T>(&self, sql: &str, outcome: rusqlite::Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                *self.last_error.borrow_mut() = None;
                Ok(value)
            }
            Err(e) => {
                let error = DriverError::statement(sql, e);
                debug!(sql, error = %error, "statement failed");
                *self.last_error.borrow_mut() = Some(error.to_string());
                Err(error)
            }
        }
    }
}

impl Engine for SqliteEngine {
    fn execute(&self, sql: &str) -> Result<usize> {
        debug!(sql, "execute");
        let outcome = self.conn.execute(sql, []);
        let changes = self.record(sql, outcome)?;
        self.affected.set(changes);
        Ok(changes)
    }

    fn query(&self, sql: &str) -> Result<QueryResult> {
        debug!(sql, "query");
        let outcome = self.collect(sql, None);
        self.record(sql, outcome)
    }

    fn query_limited(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        debug!(sql, max_rows, "query");
        let outcome = self.collect(sql, Some(max_rows));
        self.record(sql, outcome)
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    fn affected_rows(&self) -> usize {
        self.affected.get()
    }

    fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn server_info(&self) -> String {
        rusqlite::version().to_string()
    }
}

fn is_invalid_file(error: &rusqlite::Error) -> bool {
    let text = error.to_string();
    text.contains("not a database") || text.contains("file is encrypted")
}
