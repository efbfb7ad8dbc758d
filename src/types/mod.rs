pub mod change;
pub mod query;
pub mod table;

pub use change::{ColumnChange, RebuildRequest, TableChange};
pub use query::{QueryResult, Row, Value};
pub use table::{
    ColumnDescriptor, DefaultValue, ForeignKeyDescriptor, GeneratedColumn, GeneratedStorage,
    IndexDescriptor, IndexKind, LogicalType, TableDescriptor, TableKind, TriggerDescriptor,
    TriggerEvent, TriggerTiming,
};
