//! In-memory storage
//!
//! Implements [`StorageInspector`] and [`StorageWriter`] over a map of tables
//! held behind a lock. Tables can be created from materialized definitions or
//! registered directly from metadata (to stage reflection input).

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use super::{StorageError, StorageInspector, StorageWriter};
use crate::models::{Row, StorageTableDefinition, TableMetadata};

#[derive(Debug, Clone)]
struct StoredTable {
    metadata: TableMetadata,
    rows: Vec<Row>,
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: RwLock<BTreeMap<String, StoredTable>>,
}

impl InMemoryStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table from its metadata, replacing any table of that name
    pub fn register_table(&self, metadata: TableMetadata) -> Result<(), StorageError> {
        let mut tables = self.write_lock()?;
        tables.insert(
            metadata.name.clone(),
            StoredTable {
                metadata,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Get a copy of every row stored in a table
    pub fn rows(&self, table: &str) -> Result<Vec<Row>, StorageError> {
        let tables = self.read_lock()?;
        tables
            .get(table)
            .map(|stored| stored.rows.clone())
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))
    }

    /// Number of rows stored in a table
    pub fn row_count(&self, table: &str) -> Result<usize, StorageError> {
        let tables = self.read_lock()?;
        tables
            .get(table)
            .map(|stored| stored.rows.len())
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))
    }

    fn read_lock(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, StoredTable>>, StorageError> {
        self.tables
            .read()
            .map_err(|e| StorageError::BackendError(format!("Lock poisoned: {e}")))
    }

    fn write_lock(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, StoredTable>>, StorageError> {
        self.tables
            .write()
            .map_err(|e| StorageError::BackendError(format!("Lock poisoned: {e}")))
    }
}

#[async_trait(?Send)]
impl StorageInspector for InMemoryStorage {
    async fn table_names(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read_lock()?.keys().cloned().collect())
    }

    async fn inspect_table(&self, name: &str) -> Result<TableMetadata, StorageError> {
        self.read_lock()?
            .get(name)
            .map(|stored| stored.metadata.clone())
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }
}

#[async_trait(?Send)]
impl StorageWriter for InMemoryStorage {
    async fn create_table(&self, table: &StorageTableDefinition) -> Result<(), StorageError> {
        let mut tables = self.write_lock()?;
        if tables.contains_key(&table.name) {
            return Err(StorageError::TableExists(table.name.clone()));
        }
        debug!(table = %table.name, columns = table.columns.len(), "Creating table");
        tables.insert(
            table.name.clone(),
            StoredTable {
                metadata: TableMetadata::from(table),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<usize, StorageError> {
        let mut tables = self.write_lock()?;
        let stored = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;

        // Validate the whole batch before writing any of it
        for row in rows {
            for key in row.keys() {
                if stored.metadata.column(key).is_none() {
                    return Err(StorageError::UnknownColumn {
                        table: table.to_string(),
                        column: key.clone(),
                    });
                }
            }
            for column in stored.metadata.columns.iter().filter(|c| !c.nullable) {
                if row.get(&column.name).is_none_or(|v| v.is_null()) {
                    return Err(StorageError::NullViolation {
                        table: table.to_string(),
                        column: column.name.clone(),
                    });
                }
            }
        }

        stored.rows.extend(rows.iter().cloned());
        Ok(rows.len())
    }
}
