use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Storage class derived from a declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Integer,
    Text,
    Blob,
    Real,
    #[default]
    Numeric,
}

impl LogicalType {
    /// Derive the logical type from a declared type string.
    ///
    /// Matching is a case-insensitive substring test, checked in the order
    /// integer, text, blob, real, with `numeric` as the fallback.
    pub fn from_declared(declared: &str) -> Self {
        let lower = declared.to_lowercase();
        if lower.contains("int") {
            LogicalType::Integer
        } else if ["char", "clob", "text"].iter().any(|s| lower.contains(s)) {
            LogicalType::Text
        } else if lower.contains("blob") {
            LogicalType::Blob
        } else if ["real", "floa", "doub"].iter().any(|s| lower.contains(s)) {
            LogicalType::Real
        } else {
            LogicalType::Numeric
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalType::Integer => "integer",
            LogicalType::Text => "text",
            LogicalType::Blob => "blob",
            LogicalType::Real => "real",
            LogicalType::Numeric => "numeric",
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column default as recovered from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum DefaultValue {
    /// A single-quoted literal, already unescaped
    Literal(String),
    /// Any other expression text, kept verbatim
    Expression(String),
}

impl DefaultValue {
    pub fn text(&self) -> &str {
        match self {
            DefaultValue::Literal(s) | DefaultValue::Expression(s) => s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GeneratedStorage {
    Stored,
    Virtual,
}

impl GeneratedStorage {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratedStorage::Stored => "STORED",
            GeneratedStorage::Virtual => "VIRTUAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedColumn {
    pub expression: String,
    pub storage: GeneratedStorage,
}

/// Information about a table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    #[serde(default)]
    pub logical_type: LogicalType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default)]
    pub collation: Option<String>,
    #[serde(default)]
    pub generated: Option<GeneratedColumn>,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDescriptor {
    /// A nullable column with no constraints
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        let declared_type = declared_type.into();
        Self {
            name: name.into(),
            logical_type: LogicalType::from_declared(&declared_type),
            declared_type,
            nullable: true,
            default: None,
            collation: None,
            generated: None,
            primary_key: false,
            auto_increment: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexKind {
    Primary,
    Unique,
    Index,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Primary => "PRIMARY",
            IndexKind::Unique => "UNIQUE",
            IndexKind::Index => "INDEX",
        }
    }
}

/// Information about an index.
///
/// The primary key is keyed by the empty name. `lengths` is always empty
/// for SQLite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub kind: IndexKind,
    pub columns: Vec<String>,
    #[serde(default)]
    pub descs: Vec<bool>,
    #[serde(default)]
    pub lengths: Vec<u32>,
}

impl IndexDescriptor {
    pub fn new(kind: IndexKind, name: impl Into<String>, columns: Vec<String>) -> Self {
        let descs = vec![false; columns.len()];
        Self {
            name: name.into(),
            kind,
            columns,
            descs,
            lengths: Vec::new(),
        }
    }

    pub fn is_descending(&self, position: usize) -> bool {
        self.descs.get(position).copied().unwrap_or(false)
    }
}

/// Information about a foreign key constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub table: String,
    pub source: Vec<String>,
    /// Empty when the key references the parent's primary key implicitly
    #[serde(default)]
    pub target: Vec<String>,
    #[serde(default)]
    pub on_update: Option<String>,
    #[serde(default)]
    pub on_delete: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

impl TriggerTiming {
    pub fn parse(text: &str) -> Option<Self> {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_uppercase().as_str() {
            "BEFORE" => Some(TriggerTiming::Before),
            "AFTER" => Some(TriggerTiming::After),
            "INSTEAD OF" => Some(TriggerTiming::InsteadOf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerEvent {
    Insert,
    Update,
    UpdateOf,
    Delete,
}

impl TriggerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerEvent::Insert => "INSERT",
            TriggerEvent::Update => "UPDATE",
            TriggerEvent::UpdateOf => "UPDATE OF",
            TriggerEvent::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    pub name: String,
    pub timing: TriggerTiming,
    pub event: TriggerEvent,
    /// Columns of an `UPDATE OF` trigger
    #[serde(default)]
    pub columns: Vec<String>,
    /// Everything after the `ON <table>` clause; empty in trigger lists
    #[serde(default)]
    pub statement: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    View,
}

/// Snapshot of a table or view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub kind: TableKind,
    pub row_count: Option<u64>,
    pub columns: Vec<ColumnDescriptor>,
    pub indexes: BTreeMap<String, IndexDescriptor>,
    pub foreign_keys: BTreeMap<i64, ForeignKeyDescriptor>,
    pub triggers: BTreeMap<String, TriggerDescriptor>,
    pub checks: Vec<String>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_view(&self) -> bool {
        self.kind == TableKind::View
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_type_priority() {
        let cases = [
            ("INTEGER", LogicalType::Integer),
            ("bigint", LogicalType::Integer),
            ("VARCHAR(255)", LogicalType::Text),
            ("CLOB", LogicalType::Text),
            ("text", LogicalType::Text),
            ("BLOB", LogicalType::Blob),
            ("REAL", LogicalType::Real),
            ("Float", LogicalType::Real),
            ("DOUBLE PRECISION", LogicalType::Real),
            ("DECIMAL(10,5)", LogicalType::Numeric),
            ("", LogicalType::Numeric),
            ("BOOLEAN", LogicalType::Numeric),
        ];
        for (declared, expected) in cases {
            assert_eq!(LogicalType::from_declared(declared), expected, "{declared}");
        }
    }

    #[test]
    fn test_logical_type_earlier_rule_wins() {
        // "int" beats "char" and "text"
        assert_eq!(LogicalType::from_declared("CHARINT"), LogicalType::Integer);
        // "char" beats "blob"
        assert_eq!(LogicalType::from_declared("blobchar"), LogicalType::Text);
        // "blob" beats "real"
        assert_eq!(LogicalType::from_declared("realblob"), LogicalType::Blob);
        // "point" contains "int"
        assert_eq!(LogicalType::from_declared("FLOATING POINT"), LogicalType::Integer);
    }

    #[test]
    fn test_trigger_timing_parse() {
        assert_eq!(TriggerTiming::parse("before"), Some(TriggerTiming::Before));
        assert_eq!(TriggerTiming::parse("INSTEAD   OF"), Some(TriggerTiming::InsteadOf));
        assert_eq!(TriggerTiming::parse("DURING"), None);
    }

    #[test]
    fn test_column_descriptor_deserialize_defaults() {
        let column: ColumnDescriptor =
            serde_json::from_str(r#"{"name": "d", "declared_type": "TEXT"}"#).unwrap();
        assert!(column.nullable);
        assert!(column.default.is_none());
        assert!(!column.primary_key);
    }
}
