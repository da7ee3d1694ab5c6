//! Dataset loading
//!
//! Creates the materialized tables of a dataset in storage and bulk loads
//! rows into them in batches.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::SchemaConfig;
use crate::error::SchemaResult;
use crate::materialize::TableMaterializer;
use crate::models::{DatasetSchema, Row, StorageTableDefinition};
use crate::rows::RowTransformer;
use crate::storage::StorageWriter;

/// Outcome of loading one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStats {
    /// Storage table name
    pub table: String,
    pub rows: usize,
    pub batches: usize,
}

/// Loads datasets through a storage writer
pub struct DatasetLoader<'a> {
    writer: &'a dyn StorageWriter,
    config: SchemaConfig,
    materializer: TableMaterializer,
    transformer: RowTransformer,
}

impl<'a> DatasetLoader<'a> {
    pub fn new(writer: &'a dyn StorageWriter, config: SchemaConfig) -> Self {
        Self {
            writer,
            materializer: TableMaterializer::new(config.clone()),
            transformer: RowTransformer::new(config.clone()),
            config,
        }
    }

    /// Create every table of the dataset, referenced tables first
    pub async fn create_tables(&self, dataset: &DatasetSchema) -> SchemaResult<Vec<StorageTableDefinition>> {
        let tables = self.materializer.materialize_all(dataset)?;
        for table in &tables {
            self.writer.create_table(table).await?;
            debug!(dataset = %dataset.id, table = %table.name, "Created table");
        }
        info!(dataset = %dataset.id, tables = tables.len(), "Created dataset tables");
        Ok(tables)
    }

    /// Transform and insert rows into one table
    ///
    /// All rows are transformed before the first batch is written, so a
    /// malformed row leaves the table untouched.
    pub async fn load_table(
        &self,
        dataset: &DatasetSchema,
        table_id: &str,
        rows: Vec<Row>,
    ) -> SchemaResult<LoadStats> {
        let table = dataset.get_table(table_id)?;
        let storage = self.materializer.materialize(dataset, table_id)?;
        let loaded = self.transformer.load_rows(table, rows, dataset.srid())?;

        let mut stats = LoadStats {
            table: storage.name.clone(),
            rows: 0,
            batches: 0,
        };

        for batch in loaded.chunks(self.config.batch_size.max(1)) {
            let written = self.writer.insert_rows(&storage.name, batch).await?;
            stats.rows += written;
            stats.batches += 1;
            debug!(table = %storage.name, batch = stats.batches, rows = written, "Inserted batch");
        }

        info!(table = %storage.name, rows = stats.rows, batches = stats.batches, "Loaded table");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::models::{FieldDefinition, TableDefinition};
    use crate::storage::InMemoryStorage;
    use crate::typemap::{GeometryKind, SchemaType};
    use serde_json::json;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn dataset() -> DatasetSchema {
        DatasetSchema::new("afval").with_table(
            TableDefinition::new("containers")
                .with_field(FieldDefinition::schema_meta())
                .with_field(FieldDefinition::new("id", SchemaType::Integer).required())
                .with_field(FieldDefinition::new("geometry", SchemaType::Geometry(GeometryKind::Point))),
        )
    }

    fn rows(count: usize) -> Vec<Row> {
        (0..count)
            .map(|i| {
                json!({"id": i, "geometry": {"type": "Point", "coordinates": [i, i]}})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_load_in_batches() {
        let storage = InMemoryStorage::new();
        let loader = DatasetLoader::new(&storage, SchemaConfig::default().with_batch_size(2));
        let dataset = dataset();

        let stats = block_on(async {
            loader.create_tables(&dataset).await.unwrap();
            loader.load_table(&dataset, "containers", rows(5)).await.unwrap()
        });

        assert_eq!(
            stats,
            LoadStats {
                table: "afval_containers".to_string(),
                rows: 5,
                batches: 3
            }
        );
        assert_eq!(storage.row_count("afval_containers").unwrap(), 5);
    }

    #[test]
    fn test_bad_row_writes_nothing() {
        let storage = InMemoryStorage::new();
        let loader = DatasetLoader::new(&storage, SchemaConfig::default().with_batch_size(1));
        let dataset = dataset();

        let mut input = rows(3);
        input[2].remove("geometry");

        let result = block_on(async {
            loader.create_tables(&dataset).await.unwrap();
            loader.load_table(&dataset, "containers", input).await
        });

        assert!(matches!(result, Err(SchemaError::MissingGeometry { row: 2, .. })));
        assert_eq!(storage.row_count("afval_containers").unwrap(), 0);
    }
}
