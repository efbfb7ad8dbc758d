//! Database files and engine-wide settings.
//!
//! These sit beside the catalog core: each database is a file in
//! [`DriverOptions::directory`], and sizes and counts are measured on a
//! transient connection that is closed when it goes out of scope.

use std::collections::BTreeMap;
use std::fs;
use tracing::debug;

use crate::config::DriverOptions;
use crate::db::engine::{Engine, SqliteEngine};
use crate::db::error::{DriverError, Result};
use crate::db::patterns::is_database_file;

/// PRAGMAs reported by [`variables`]
const VARIABLES: &[&str] = &[
    "auto_vacuum",
    "cache_size",
    "count_changes",
    "default_cache_size",
    "empty_result_callbacks",
    "encoding",
    "foreign_keys",
    "full_column_names",
    "fullfsync",
    "journal_mode",
    "journal_size_limit",
    "legacy_file_format",
    "locking_mode",
    "page_size",
    "max_page_count",
    "read_uncommitted",
    "recursive_triggers",
    "reverse_unordered_selects",
    "secure_delete",
    "short_column_names",
    "synchronous",
    "temp_store",
    "temp_store_directory",
    "schema_version",
    "integrity_check",
    "quick_check",
];

fn check_name(options: &DriverOptions, database: &str) -> Result<()> {
    if is_database_file(database, &options.extensions) {
        Ok(())
    } else {
        Err(DriverError::InvalidName {
            name: database.to_string(),
            extensions: options.extension_list(),
        })
    }
}

/// Database files in the configured directory, sorted by name
pub fn databases(options: &DriverOptions) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(&options.directory)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if is_database_file(&name, &options.extensions) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// File size in bytes as `page_size * page_count`
pub fn database_size(options: &DriverOptions, database: &str) -> Result<u64> {
    let engine = SqliteEngine::open(options.filename(database), options)?;
    let page_size = pragma_integer(&engine, "page_size")?;
    let page_count = pragma_integer(&engine, "page_count")?;
    Ok((page_size * page_count).max(0) as u64)
}

fn pragma_integer(engine: &dyn Engine, pragma: &str) -> Result<i64> {
    Ok(engine
        .result(&format!("PRAGMA {}", pragma))?
        .and_then(|v| v.as_integer())
        .unwrap_or(0))
}

/// Number of tables and views per database. Unreadable files count zero.
pub fn count_tables(options: &DriverOptions, databases: &[String]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for database in databases {
        let count = SqliteEngine::open(options.filename(database), options)
            .and_then(|engine| {
                engine.result("SELECT count(*) FROM sqlite_master WHERE type IN ('table', 'view')")
            })
            .map(|value| value.and_then(|v| v.as_integer()).unwrap_or(0) as u64)
            .unwrap_or_else(|e| {
                debug!(database = %database, error = %e, "table count unavailable");
                0
            });
        counts.insert(database.clone(), count);
    }
    counts
}

/// Create an empty UTF-8 database file
pub fn create_database(options: &DriverOptions, database: &str) -> Result<()> {
    let filename = options.filename(database);
    if filename.exists() {
        return Err(DriverError::FileExists(filename.to_string_lossy().to_string()));
    }
    check_name(options, database)?;

    let engine = SqliteEngine::create(&filename, options)?;
    engine.execute("PRAGMA encoding = \"UTF-8\"")?;
    // SQLite only writes the file once it holds something
    engine.execute("CREATE TABLE dbadmin_init (i)")?;
    engine.execute("DROP TABLE dbadmin_init")?;
    Ok(())
}

pub fn drop_databases(options: &DriverOptions, databases: &[String]) -> Result<()> {
    for database in databases {
        fs::remove_file(options.filename(database))?;
    }
    Ok(())
}

pub fn rename_database(options: &DriverOptions, current: &str, name: &str) -> Result<()> {
    check_name(options, name)?;
    let target = options.filename(name);
    if target.exists() {
        return Err(DriverError::FileExists(target.to_string_lossy().to_string()));
    }
    fs::rename(options.filename(current), target)?;
    Ok(())
}

/// Current value of each reported PRAGMA; `None` when the engine has none
pub fn variables(engine: &dyn Engine) -> Result<Vec<(String, Option<String>)>> {
    VARIABLES
        .iter()
        .map(|key| {
            let value = engine.result(&format!("PRAGMA {}", key))?;
            Ok((key.to_string(), value.and_then(|v| v.as_text())))
        })
        .collect()
}

/// Compile options, `KEY=value` split at the first `=`
pub fn status_variables(engine: &dyn Engine) -> Result<BTreeMap<String, String>> {
    let mut variables = BTreeMap::new();
    for option in engine.values("PRAGMA compile_options", 0)? {
        let Some(option) = option.as_text() else {
            continue;
        };
        match option.split_once('=') {
            Some((key, value)) => variables.insert(key.to_string(), value.to_string()),
            None => variables.insert(option, "true".to_string()),
        };
    }
    Ok(variables)
}

pub fn collations(engine: &dyn Engine) -> Result<Vec<String>> {
    Ok(engine
        .values("PRAGMA collation_list", 1)?
        .into_iter()
        .filter_map(|v| v.as_text())
        .collect())
}

/// Text encoding of the open database
pub fn database_collation(engine: &dyn Engine) -> Result<Option<String>> {
    Ok(engine.result("PRAGMA encoding")?.and_then(|v| v.as_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_list_size_and_drop() {
        let dir = tempdir().unwrap();
        let options = DriverOptions::new(dir.path());

        create_database(&options, "app.db").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(databases(&options).unwrap(), vec!["app.db".to_string()]);
        assert!(database_size(&options, "app.db").unwrap() > 0);

        let counts = count_tables(&options, &["app.db".to_string(), "gone.db".to_string()]);
        assert_eq!(counts["app.db"], 0);
        assert_eq!(counts["gone.db"], 0);

        drop_databases(&options, &["app.db".to_string()]).unwrap();
        assert!(databases(&options).unwrap().is_empty());
    }

    #[test]
    fn test_create_refuses_existing_and_bad_names() {
        let dir = tempdir().unwrap();
        let options = DriverOptions::new(dir.path());

        create_database(&options, "app.sqlite").unwrap();
        assert!(matches!(
            create_database(&options, "app.sqlite"),
            Err(DriverError::FileExists(_))
        ));
        assert!(matches!(
            create_database(&options, "shell.php"),
            Err(DriverError::InvalidName { .. })
        ));
        assert!(!dir.path().join("shell.php").exists());
    }

    #[test]
    fn test_rename_database() {
        let dir = tempdir().unwrap();
        let options = DriverOptions::new(dir.path());
        create_database(&options, "a.db").unwrap();
        create_database(&options, "b.db").unwrap();

        assert!(matches!(
            rename_database(&options, "a.db", "b.db"),
            Err(DriverError::FileExists(_))
        ));
        assert!(matches!(
            rename_database(&options, "a.db", "a.txt"),
            Err(DriverError::InvalidName { .. })
        ));
        rename_database(&options, "a.db", "c.db").unwrap();
        assert_eq!(
            databases(&options).unwrap(),
            vec!["b.db".to_string(), "c.db".to_string()]
        );
    }

    #[test]
    fn test_engine_settings() {
        let engine = SqliteEngine::open_in_memory().unwrap();
        assert_eq!(database_collation(&engine).unwrap().as_deref(), Some("UTF-8"));
        assert!(collations(&engine).unwrap().contains(&"NOCASE".to_string()));

        let vars = variables(&engine).unwrap();
        assert_eq!(vars.len(), VARIABLES.len());
        let foreign_keys = vars.iter().find(|(k, _)| k == "foreign_keys").unwrap();
        assert_eq!(foreign_keys.1.as_deref(), Some("1"));

        let status = status_variables(&engine).unwrap();
        assert!(!status.is_empty());
    }
}
