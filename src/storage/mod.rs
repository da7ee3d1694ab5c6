//! Storage collaborator abstraction
//!
//! The mapping engine never talks to a database itself. It consumes two
//! collaborators:
//! - [`StorageInspector`]: reports table names and column/constraint metadata
//!   (used by reflection)
//! - [`StorageWriter`]: creates tables and inserts row batches (used by the
//!   dataset loader)
//!
//! [`memory::InMemoryStorage`] implements both and is used for tests and dry
//! runs.

use async_trait::async_trait;

use crate::models::{Row, StorageTableDefinition, TableMetadata};

pub mod memory;

pub use memory::InMemoryStorage;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Table already exists: {0}")]
    TableExists(String),
    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },
    #[error("Column '{column}' in table '{table}' cannot be null")]
    NullViolation { table: String, column: String },
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// Trait for storage inspection collaborators
#[async_trait(?Send)]
pub trait StorageInspector: Send + Sync {
    /// List the names of all tables in storage
    async fn table_names(&self) -> Result<Vec<String>, StorageError>;

    /// Describe one table: columns, primary key and foreign keys
    async fn inspect_table(&self, name: &str) -> Result<TableMetadata, StorageError>;
}

/// Trait for storage mutation collaborators
#[async_trait(?Send)]
pub trait StorageWriter: Send + Sync {
    /// Create a table from its materialized definition
    async fn create_table(&self, table: &StorageTableDefinition) -> Result<(), StorageError>;

    /// Insert one batch of rows, returning the number of rows written
    ///
    /// Rows are keyed on storage column names.
    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<usize, StorageError>;
}
