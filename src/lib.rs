//! SQLite driver for a database administration front end.
//!
//! [`db::catalog`] reads the schema back out of SQLite's catalog,
//! [`db::ddl`] turns desired table states into DDL, and table rebuilds
//! handle every change SQLite's `ALTER TABLE` cannot express. [`Session`]
//! ties them to one open database.

pub mod config;
pub mod db;
pub mod session;
pub mod types;

pub use config::DriverOptions;
pub use db::{
    describe_failure, CatalogReader, DdlSynthesizer, DriverError, Engine, Result, SqliteCatalog,
    SqliteEngine, SqliteSchemaEditor,
};
pub use session::Session;
