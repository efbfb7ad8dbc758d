pub mod catalog;
pub mod ddl;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod patterns;
pub mod query;
mod recreate;
pub mod server;

pub use catalog::{CatalogReader, SqliteCatalog};
pub use ddl::{DdlSynthesizer, SqliteSchemaEditor};
pub use engine::{Engine, SqliteEngine};
pub use error::{describe_failure, DriverError, Result};
