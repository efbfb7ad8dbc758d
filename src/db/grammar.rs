//! SQL text builders for SQLite.

use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{ColumnDescriptor, DefaultValue, ForeignKeyDescriptor, IndexKind};

/// Appended to the single integer primary key column
pub const AUTO_INCREMENT_MODIFIER: &str = " PRIMARY KEY AUTOINCREMENT";

static INDEX_NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Defaults that SQLite accepts without parentheses
static BARE_DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:e[+-]?\d+)?|0x[0-9a-f]+|x'[0-9a-f]*'|null|true|false|current_time|current_date|current_timestamp)$",
    )
    .expect("static regex must compile")
});

static BARE_COLLATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex must compile"));

pub fn escape_id(idf: &str) -> String {
    format!("\"{}\"", idf.replace('"', "\"\""))
}

/// Strip identifier quoting: `"..."`, `` `...` `` or `[...]`
pub fn unescape_id(idf: &str) -> String {
    let idf = idf.trim();
    let mut chars = idf.chars();
    match (chars.next(), chars.next_back()) {
        (Some('"'), Some('"')) if idf.len() >= 2 => idf[1..idf.len() - 1].replace("\"\"", "\""),
        (Some('`'), Some('`')) if idf.len() >= 2 => idf[1..idf.len() - 1].replace("``", "`"),
        (Some('['), Some(']')) => idf[1..idf.len() - 1].to_string(),
        _ => idf.to_string(),
    }
}

/// Quote a string literal
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn default_clause(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Literal(text) => format!(" DEFAULT {}", quote(text)),
        DefaultValue::Expression(expr) if BARE_DEFAULT_RE.is_match(expr.trim()) => {
            format!(" DEFAULT {}", expr.trim())
        }
        DefaultValue::Expression(expr) => format!(" DEFAULT ({})", expr.trim()),
    }
}

/// Column definition as it appears inside `CREATE TABLE (...)` or after `ADD`
pub fn column_definition(column: &ColumnDescriptor) -> String {
    let mut clause = escape_id(&column.name);
    if !column.declared_type.is_empty() {
        clause.push(' ');
        clause.push_str(&column.declared_type);
    }
    if let Some(collation) = &column.collation {
        clause.push_str(" COLLATE ");
        if BARE_COLLATION_RE.is_match(collation) {
            clause.push_str(collation);
        } else {
            clause.push_str(&escape_id(collation));
        }
    }
    if !column.nullable {
        clause.push_str(" NOT NULL");
    }
    if let Some(generated) = &column.generated {
        clause.push_str(&format!(
            " GENERATED ALWAYS AS ({}) {}",
            generated.expression,
            generated.storage.as_str()
        ));
    } else if let Some(default) = &column.default {
        clause.push_str(&default_clause(default));
    }
    if column.auto_increment {
        clause.push_str(AUTO_INCREMENT_MODIFIER);
    }
    clause
}

/// Index or key column with its sort order
pub fn index_column(name: &str, descending: bool) -> String {
    if descending {
        format!("{} DESC", escape_id(name))
    } else {
        escape_id(name)
    }
}

pub fn primary_key_clause(columns: &[String]) -> String {
    format!("PRIMARY KEY ({})", columns.join(", "))
}

pub fn foreign_key_clause(foreign_key: &ForeignKeyDescriptor) -> String {
    let source: Vec<String> = foreign_key.source.iter().map(|c| escape_id(c)).collect();
    let mut clause = format!(
        "FOREIGN KEY ({}) REFERENCES {}",
        source.join(", "),
        escape_id(&foreign_key.table)
    );
    if !foreign_key.target.is_empty() {
        let target: Vec<String> = foreign_key.target.iter().map(|c| escape_id(c)).collect();
        clause.push_str(&format!(" ({})", target.join(", ")));
    }
    if let Some(action) = &foreign_key.on_delete {
        clause.push_str(&format!(" ON DELETE {}", action));
    }
    if let Some(action) = &foreign_key.on_update {
        clause.push_str(&format!(" ON UPDATE {}", action));
    }
    clause
}

/// Process-unique index name for `table`
pub fn unique_index_name(table: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let seq = INDEX_NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}_{:x}{:04x}", table, millis, seq)
}

/// `columns` are already escaped and may carry ` DESC`
pub fn create_index_sql(table: &str, kind: IndexKind, name: &str, columns: &[String]) -> String {
    let name = if name.is_empty() {
        unique_index_name(table)
    } else {
        name.to_string()
    };
    let keyword = match kind {
        IndexKind::Unique => "UNIQUE INDEX",
        _ => "INDEX",
    };
    format!(
        "CREATE {} {} ON {} ({})",
        keyword,
        escape_id(&name),
        escape_id(table),
        columns.join(", ")
    )
}

pub fn truncate_table_sql(table: &str) -> String {
    format!("DELETE FROM {}", escape_id(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeneratedColumn, GeneratedStorage};

    #[test]
    fn test_escape_roundtrip() {
        assert_eq!(escape_id("a\"b"), "\"a\"\"b\"");
        assert_eq!(unescape_id("\"a\"\"b\""), "a\"b");
        assert_eq!(unescape_id("`x`"), "x");
        assert_eq!(unescape_id("[my col]"), "my col");
        assert_eq!(unescape_id("plain"), "plain");
    }

    #[test]
    fn test_default_clause() {
        assert_eq!(
            default_clause(&DefaultValue::Literal("it's".into())),
            " DEFAULT 'it''s'"
        );
        assert_eq!(default_clause(&DefaultValue::Expression("42".into())), " DEFAULT 42");
        assert_eq!(default_clause(&DefaultValue::Expression("-1.5".into())), " DEFAULT -1.5");
        assert_eq!(
            default_clause(&DefaultValue::Expression("CURRENT_TIMESTAMP".into())),
            " DEFAULT CURRENT_TIMESTAMP"
        );
        assert_eq!(
            default_clause(&DefaultValue::Expression("datetime('now')".into())),
            " DEFAULT (datetime('now'))"
        );
    }

    #[test]
    fn test_column_definition() {
        let mut column = ColumnDescriptor::new("id", "INTEGER");
        column.primary_key = true;
        column.auto_increment = true;
        assert_eq!(
            column_definition(&column),
            "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"
        );

        let mut column = ColumnDescriptor::new("name", "TEXT");
        column.nullable = false;
        column.collation = Some("NOCASE".into());
        column.default = Some(DefaultValue::Literal(String::new()));
        assert_eq!(
            column_definition(&column),
            "\"name\" TEXT COLLATE NOCASE NOT NULL DEFAULT ''"
        );
    }

    #[test]
    fn test_generated_column_skips_default() {
        let mut column = ColumnDescriptor::new("total", "REAL");
        column.default = Some(DefaultValue::Expression("0".into()));
        column.generated = Some(GeneratedColumn {
            expression: "price * qty".into(),
            storage: GeneratedStorage::Stored,
        });
        assert_eq!(
            column_definition(&column),
            "\"total\" REAL GENERATED ALWAYS AS (price * qty) STORED"
        );
    }

    #[test]
    fn test_foreign_key_clause() {
        let fk = ForeignKeyDescriptor {
            table: "users".into(),
            source: vec!["user_id".into()],
            target: vec!["id".into()],
            on_update: None,
            on_delete: Some("CASCADE".into()),
        };
        assert_eq!(
            foreign_key_clause(&fk),
            "FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_create_index_sql() {
        let columns = vec![index_column("a", false), index_column("b", true)];
        assert_eq!(
            create_index_sql("t", IndexKind::Unique, "u_ab", &columns),
            "CREATE UNIQUE INDEX \"u_ab\" ON \"t\" (\"a\", \"b\" DESC)"
        );
    }

    #[test]
    fn test_unnamed_index_gets_unique_name() {
        let columns = vec![index_column("a", false)];
        let first = create_index_sql("t", IndexKind::Index, "", &columns);
        let second = create_index_sql("t", IndexKind::Index, "", &columns);
        assert!(first.starts_with("CREATE INDEX \"t_"));
        assert_ne!(first, second);
    }
}
