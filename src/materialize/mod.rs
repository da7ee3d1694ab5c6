//! Table materialization
//!
//! Derives storage table definitions from dataset tables:
//! - the table is named `{dataset}_{table}` in storage form
//! - every field becomes one column in storage form, relation columns get
//!   the relation suffix (`_id`) and reference the target table
//! - the `schema` meta field is not materialized
//! - the identifier field becomes the primary key
//! - geometry columns use the dataset's spatial reference

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, warn};

use crate::config::{NamingPolicy, SchemaConfig};
use crate::error::SchemaResult;
use crate::models::storage::storage_table_name;
use crate::models::{DatasetSchema, FieldDefinition, StorageColumnDefinition, StorageTableDefinition};
use crate::naming::{RELATION_SEPARATOR, to_storage_form};

/// Derives storage tables from dataset schemas
#[derive(Debug, Clone, Default)]
pub struct TableMaterializer {
    config: SchemaConfig,
}

impl TableMaterializer {
    pub fn new(config: SchemaConfig) -> Self {
        Self { config }
    }

    /// Materialize one table of a dataset
    ///
    /// # Errors
    ///
    /// [`SchemaError::TableNotFound`](crate::error::SchemaError::TableNotFound)
    /// when the dataset has no such table.
    ///
    /// # Example
    ///
    /// ```rust
    /// use schema_tools::materialize::TableMaterializer;
    /// use schema_tools::models::{DatasetSchema, FieldDefinition, TableDefinition};
    /// use schema_tools::typemap::{GeometryKind, SchemaType};
    ///
    /// let dataset = DatasetSchema::new("gebieden").with_crs("EPSG:4326").with_table(
    ///     TableDefinition::new("buurten")
    ///         .with_field(FieldDefinition::new("id", SchemaType::string()).required())
    ///         .with_field(FieldDefinition::new("geometrie", SchemaType::Geometry(GeometryKind::Polygon))),
    /// );
    ///
    /// let table = TableMaterializer::default().materialize(&dataset, "buurten").unwrap();
    /// assert_eq!(table.name, "gebieden_buurten");
    /// assert_eq!(table.columns[1].storage_type.to_string(), "geometry(POLYGON,4326)");
    /// ```
    pub fn materialize(
        &self,
        dataset: &DatasetSchema,
        table_id: &str,
    ) -> SchemaResult<StorageTableDefinition> {
        let table = dataset.get_table(table_id)?;
        let srid = dataset.srid();
        let identifier = table.identifier_field();

        let mut columns = Vec::with_capacity(table.fields.len());
        for field in &table.fields {
            if field.is_schema_meta() {
                continue;
            }

            let name = column_name(field, &self.config.naming)?;
            let references = match &field.relation {
                Some(target) => Some(self.relation_table_name(&dataset.id, target)?),
                None => None,
            };

            let mut column = StorageColumnDefinition::new(name, field.schema_type.to_storage_type(srid))
                .nullable(field.nullable)
                .primary_key(field.id == identifier);
            column.references = references;
            columns.push(column);
        }

        let name = storage_table_name(&dataset.id, &table.id)?;
        debug!(table = %name, columns = columns.len(), srid, "Materialized table");
        Ok(StorageTableDefinition { name, columns })
    }

    /// Materialize every table, referenced tables before referencing ones
    ///
    /// Relations outside the dataset and self references do not constrain
    /// the order. When the relations form a cycle the declaration order is
    /// kept.
    pub fn materialize_all(&self, dataset: &DatasetSchema) -> SchemaResult<Vec<StorageTableDefinition>> {
        let tables = dataset
            .tables
            .iter()
            .map(|table| self.materialize(dataset, &table.id))
            .collect::<SchemaResult<Vec<_>>>()?;

        let mut graph = DiGraph::<usize, ()>::new();
        let nodes: Vec<NodeIndex> = (0..tables.len()).map(|i| graph.add_node(i)).collect();
        let by_name: HashMap<&str, NodeIndex> = tables
            .iter()
            .zip(&nodes)
            .map(|(table, node)| (table.name.as_str(), *node))
            .collect();

        for (table, node) in tables.iter().zip(&nodes) {
            for referenced in table.referenced_tables() {
                match by_name.get(referenced) {
                    Some(target) if target != node => {
                        graph.update_edge(*target, *node, ());
                    }
                    _ => {}
                }
            }
        }

        let order: Vec<usize> = match toposort(&graph, None) {
            Ok(sorted) => sorted.into_iter().map(|node| graph[node]).collect(),
            Err(cycle) => {
                warn!(
                    dataset = %dataset.id,
                    table = %tables[graph[cycle.node_id()]].name,
                    "Relations form a cycle, keeping declaration order"
                );
                (0..tables.len()).collect()
            }
        };

        let mut slots: Vec<Option<StorageTableDefinition>> = tables.into_iter().map(Some).collect();
        Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }

    /// Storage name of a relation target, `dataset:table` or a bare table of
    /// the same dataset
    fn relation_table_name(&self, dataset_id: &str, target: &str) -> SchemaResult<String> {
        match target.split_once(RELATION_SEPARATOR) {
            Some((target_dataset, target_table)) => {
                storage_table_name(&to_storage_form(target_dataset)?, target_table)
            }
            None => storage_table_name(dataset_id, target),
        }
    }
}

/// Storage column name of a field: the pinned column name when there is
/// one, else the storage form plus the relation suffix for relation fields
pub fn column_name(field: &FieldDefinition, naming: &NamingPolicy) -> SchemaResult<String> {
    if let Some(column) = &field.column {
        return Ok(column.clone());
    }
    let mut name = to_storage_form(&field.id)?;
    if field.relation.is_some() {
        name.push_str(naming.relation_suffix());
    }
    Ok(name)
}

/// Materialize a table with the default configuration
pub fn materialize(dataset: &DatasetSchema, table_id: &str) -> SchemaResult<StorageTableDefinition> {
    TableMaterializer::default().materialize(dataset, table_id)
}

/// Materialize every table with the default configuration
pub fn materialize_all(dataset: &DatasetSchema) -> SchemaResult<Vec<StorageTableDefinition>> {
    TableMaterializer::default().materialize_all(dataset)
}
