use serde::{Deserialize, Serialize};

use crate::types::{ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor};

/// One column of a desired table layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnChange {
    /// Name of the existing column this one replaces, `None` for a new column
    #[serde(default)]
    pub original: Option<String>,
    pub column: ColumnDescriptor,
}

impl ColumnChange {
    /// Keep an existing column, possibly with a new definition or name
    pub fn keep(original: impl Into<String>, column: ColumnDescriptor) -> Self {
        Self {
            original: Some(original.into()),
            column,
        }
    }

    pub fn add(column: ColumnDescriptor) -> Self {
        Self {
            original: None,
            column,
        }
    }
}

/// Desired state of a table.
///
/// `columns` is the complete column list in its final order. Existing
/// columns that no entry refers to through `original` are dropped.
/// `foreign_keys` are added on top of the keys the table already has.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableChange {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnChange>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    /// Explicit start value for the sequence table
    #[serde(default)]
    pub auto_increment: Option<i64>,
}

impl TableChange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn column(mut self, change: ColumnChange) -> Self {
        self.columns.push(change);
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKeyDescriptor) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn auto_increment(mut self, value: i64) -> Self {
        self.auto_increment = Some(value);
        self
    }
}

/// Input of a table rebuild.
///
/// An empty column list keeps the existing columns as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildRequest {
    pub name: String,
    pub columns: Vec<ColumnChange>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    pub auto_increment: Option<i64>,
    pub add_indexes: Vec<IndexDescriptor>,
    pub drop_indexes: Vec<IndexDescriptor>,
}

impl From<&TableChange> for RebuildRequest {
    fn from(change: &TableChange) -> Self {
        Self {
            name: change.name.clone(),
            columns: change.columns.clone(),
            foreign_keys: change.foreign_keys.clone(),
            auto_increment: change.auto_increment,
            add_indexes: Vec::new(),
            drop_indexes: Vec::new(),
        }
    }
}
