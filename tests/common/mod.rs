//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use sqlite_dbadmin::db::{DriverError, Result};
use sqlite_dbadmin::types::QueryResult;
use sqlite_dbadmin::{Engine, SqliteEngine};
use std::cell::RefCell;
use std::rc::Rc;

/// Statements seen by a [`RecordingEngine`], shared so a boxed engine can
/// still be inspected.
#[derive(Clone, Default)]
pub struct StatementLog {
    executed: Rc<RefCell<Vec<String>>>,
    queried: Rc<RefCell<Vec<String>>>,
}

impl StatementLog {
    /// Statements run through `execute`, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }

    pub fn queried(&self) -> Vec<String> {
        self.queried.borrow().clone()
    }

    pub fn clear(&self) {
        self.executed.borrow_mut().clear();
        self.queried.borrow_mut().clear();
    }

    /// Executed statements starting with `prefix`
    pub fn executed_starting_with(&self, prefix: &str) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter(|sql| sql.starts_with(prefix))
            .collect()
    }
}

/// In-memory SQLite engine that records every statement
pub struct RecordingEngine {
    inner: SqliteEngine,
    log: StatementLog,
    /// Executed statements starting with this prefix fail without running
    fail_on: Option<String>,
}

impl RecordingEngine {
    /// Fresh in-memory database prepared with `setup`, with an empty log
    pub fn new(setup: &str) -> Self {
        let inner = SqliteEngine::open_in_memory().unwrap();
        inner.connection().execute_batch(setup).unwrap();
        Self {
            inner,
            log: StatementLog::default(),
            fail_on: None,
        }
    }

    pub fn failing_on(mut self, prefix: &str) -> Self {
        self.fail_on = Some(prefix.to_string());
        self
    }

    pub fn log(&self) -> StatementLog {
        self.log.clone()
    }
}

impl Engine for RecordingEngine {
    fn execute(&self, sql: &str) -> Result<usize> {
        self.log.executed.borrow_mut().push(sql.to_string());
        if self.fail_on.as_deref().is_some_and(|prefix| sql.starts_with(prefix)) {
            return Err(DriverError::Statement {
                sql: sql.to_string(),
                code: None,
                message: "injected failure".to_string(),
            });
        }
        self.inner.execute(sql)
    }

    fn query(&self, sql: &str) -> Result<QueryResult> {
        self.log.queried.borrow_mut().push(sql.to_string());
        self.inner.query(sql)
    }

    fn query_limited(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        self.log.queried.borrow_mut().push(sql.to_string());
        self.inner.query_limited(sql, max_rows)
    }

    fn last_error(&self) -> Option<String> {
        self.inner.last_error()
    }

    fn affected_rows(&self) -> usize {
        self.inner.affected_rows()
    }

    fn last_insert_rowid(&self) -> i64 {
        self.inner.last_insert_rowid()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn server_info(&self) -> String {
        self.inner.server_info()
    }
}

/// Session over a recording engine, plus the engine's log
pub fn recording_session(setup: &str) -> (sqlite_dbadmin::Session, StatementLog) {
    let engine = RecordingEngine::new(setup);
    let log = engine.log();
    (sqlite_dbadmin::Session::with_engine(Box::new(engine)), log)
}

/// Like [`recording_session`], but every executed statement starting with
/// `prefix` fails
pub fn failing_session(setup: &str, prefix: &str) -> (sqlite_dbadmin::Session, StatementLog) {
    let engine = RecordingEngine::new(setup).failing_on(prefix);
    let log = engine.log();
    (sqlite_dbadmin::Session::with_engine(Box::new(engine)), log)
}
