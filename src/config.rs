//! Driver options.

use std::path::PathBuf;
use std::time::Duration;

/// Where database files live and how connections are opened
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Directory holding the database files
    pub directory: PathBuf,
    pub read_only: bool,
    pub busy_timeout: Duration,
    /// Accepted database file extensions, without the dot
    pub extensions: Vec<String>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            read_only: false,
            busy_timeout: Duration::from_secs(5),
            extensions: vec!["db".to_string(), "sdb".to_string(), "sqlite".to_string()],
        }
    }
}

impl DriverOptions {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Default::default()
        }
    }

    /// Full path of a database file. An empty name is the in-memory database.
    pub fn filename(&self, database: &str) -> PathBuf {
        if database.is_empty() {
            return PathBuf::from(":memory:");
        }
        self.directory.join(database)
    }

    /// Extensions joined for messages, e.g. `db, sdb, sqlite`
    pub fn extension_list(&self) -> String {
        self.extensions.join(", ")
    }
}
