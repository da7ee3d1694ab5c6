//! Models for datasets, storage tables and inspected table metadata

pub mod dataset;
pub mod metadata;
pub mod storage;

pub use dataset::{DatasetSchema, FieldDefinition, TableDefinition};
pub use metadata::{ColumnMetadata, ForeignKeyMetadata, TableMetadata};
pub use storage::{StorageColumnDefinition, StorageTableDefinition};

/// A row of data keyed on field or column name
pub type Row = serde_json::Map<String, serde_json::Value>;
