//! Schema reflection
//!
//! Synthesizes a dataset schema from the column and constraint metadata of
//! existing storage tables.
//!
//! For every table:
//! - composite primary or foreign keys are rejected, a missing primary key too
//! - internal columns (by default those starting with `_`) are skipped
//! - the identifier column (`id`) becomes the identifier field
//! - single-column foreign keys become relation fields, `dataset:table`
//! - column types resolve through the type map
//! - non-nullable columns are required
//! - a column whose name the naming rules do not reproduce is pinned on its
//!   field, so materializing the result gives back the same column names
//!
//! Every table starts with the `schema` meta field.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::SchemaConfig;
use crate::error::{KeyKind, SchemaError, SchemaResult};
use crate::materialize::column_name;
use crate::models::dataset::DEFAULT_IDENTIFIER;
use crate::models::{DatasetSchema, FieldDefinition, TableDefinition, TableMetadata};
use crate::naming::RELATION_SEPARATOR;
use crate::storage::StorageInspector;
use crate::typemap::storage_type_to_schema_type;

/// Reflects storage tables into dataset schemas
#[derive(Debug, Clone, Default)]
pub struct SchemaReflector {
    config: SchemaConfig,
}

impl SchemaReflector {
    pub fn new(config: SchemaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }

    /// Reflect a set of tables into one dataset
    ///
    /// # Arguments
    ///
    /// * `tables` - Metadata of the tables, in output order
    /// * `dataset_id` - Identifier (and title) of the dataset
    /// * `prefix` - Optional prefix stripped from storage table names
    ///
    /// # Example
    ///
    /// ```rust
    /// use schema_tools::models::{ColumnMetadata, TableMetadata};
    /// use schema_tools::reflect::SchemaReflector;
    ///
    /// let panden = TableMetadata::new("bag_panden")
    ///     .with_column(ColumnMetadata::new("id", "VARCHAR").nullable(false))
    ///     .with_column(ColumnMetadata::new("bouwjaar", "INTEGER"))
    ///     .with_primary_key(["id"]);
    ///
    /// let dataset = SchemaReflector::default()
    ///     .reflect_tables(&[panden], "bag", Some("bag_"))
    ///     .unwrap();
    /// assert_eq!(dataset.tables[0].id, "panden");
    /// assert_eq!(dataset.tables[0].required(), vec!["schema", "id"]);
    /// ```
    pub fn reflect_tables(
        &self,
        tables: &[TableMetadata],
        dataset_id: &str,
        prefix: Option<&str>,
    ) -> SchemaResult<DatasetSchema> {
        let mut dataset = DatasetSchema::new(dataset_id).with_crs(self.config.default_crs.clone());
        dataset.version = self.config.dataset_version.clone();
        dataset.status = Some("beschikbaar".to_string());

        for table in tables {
            dataset.tables.push(self.reflect_table(table, prefix)?);
        }

        info!(
            dataset = %dataset_id,
            tables = dataset.tables.len(),
            "Reflected dataset schema"
        );
        Ok(dataset)
    }

    /// Reflect one table
    pub fn reflect_table(
        &self,
        table: &TableMetadata,
        prefix: Option<&str>,
    ) -> SchemaResult<TableDefinition> {
        let primary_key = match table.primary_key.as_slice() {
            [] => {
                return Err(SchemaError::MissingPrimaryKey {
                    table: table.name.clone(),
                });
            }
            [column] => column.as_str(),
            columns => {
                return Err(SchemaError::CompositeKeyUnsupported {
                    table: table.name.clone(),
                    kind: KeyKind::PrimaryKey,
                    columns: columns.to_vec(),
                });
            }
        };

        let mut relations = HashMap::new();
        for foreign_key in &table.foreign_keys {
            let column = match foreign_key.constrained_columns.as_slice() {
                [column] => column,
                columns => {
                    return Err(SchemaError::CompositeKeyUnsupported {
                        table: table.name.clone(),
                        kind: KeyKind::ForeignKey,
                        columns: columns.to_vec(),
                    });
                }
            };
            if !self.config.is_internal_column(column) {
                relations.insert(
                    column.as_str(),
                    relation_target(&foreign_key.referred_table),
                );
            }
        }

        let table_id = prefix
            .and_then(|prefix| table.name.strip_prefix(prefix))
            .filter(|stripped| !stripped.is_empty())
            .unwrap_or(&table.name);

        let mut definition = TableDefinition::new(table_id).with_field(FieldDefinition::schema_meta());
        let mut identifier = None;

        for column in &table.columns {
            if self.config.is_internal_column(&column.name) {
                debug!(table = %table.name, column = %column.name, "Skipping internal column");
                continue;
            }

            let schema_type = storage_type_to_schema_type(&column.type_class, column.sub_type())
                .map_err(|e| e.in_field(&table.name, &column.name))?;

            let mut field = if column.name == self.config.identifier_column {
                // The identifier field is required whatever storage says
                let id = self.config.naming.field_name(&column.name, false)?;
                FieldDefinition::new(id, schema_type).required()
            } else {
                let relation = relations.get(column.name.as_str());
                let id = self
                    .config
                    .naming
                    .field_name(&column.name, relation.is_some())?;
                let mut field = FieldDefinition::new(id, schema_type);
                field.nullable = column.nullable;
                if let Some(target) = relation {
                    field = field.with_relation(target.clone());
                }
                field
            };

            if column.name == primary_key {
                field.nullable = false;
                identifier = Some(field.id.clone());
            }

            // Columns the naming rules cannot reproduce keep their name
            if column_name(&field, &self.config.naming)? != column.name {
                field.column = Some(column.name.clone());
            }
            definition.fields.push(field);
        }

        // A primary key under another name than the identifier column
        // becomes the identifier field
        let identifier = identifier.unwrap_or_else(|| self.config.identifier_column.clone());
        if identifier != DEFAULT_IDENTIFIER {
            definition.identifier = Some(identifier.clone());
        }
        if definition.field(&identifier).is_some() {
            definition.display = Some(identifier);
        }

        debug!(
            table = %table.name,
            fields = definition.fields.len(),
            relations = relations.len(),
            "Reflected table"
        );
        Ok(definition)
    }

    /// Reflect tables reported by a storage inspector
    ///
    /// With a prefix only tables whose name starts with it are reflected.
    pub async fn reflect_from(
        &self,
        inspector: &dyn StorageInspector,
        dataset_id: &str,
        prefix: Option<&str>,
    ) -> SchemaResult<DatasetSchema> {
        let mut tables = Vec::new();
        for name in inspector.table_names().await? {
            if prefix.is_some_and(|prefix| !name.starts_with(prefix)) {
                continue;
            }
            tables.push(inspector.inspect_table(&name).await?);
        }
        self.reflect_tables(&tables, dataset_id, prefix)
    }
}

/// Reflect tables with the default configuration
pub fn reflect_tables(
    tables: &[TableMetadata],
    dataset_id: &str,
    prefix: Option<&str>,
) -> SchemaResult<DatasetSchema> {
    SchemaReflector::default().reflect_tables(tables, dataset_id, prefix)
}

/// `gebieden_buurten` → `gebieden:buurten`
fn relation_target(referred_table: &str) -> String {
    referred_table.replacen('_', &RELATION_SEPARATOR.to_string(), 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnMetadata;
    use crate::typemap::{GeometryKind, SchemaType};

    fn buurten() -> TableMetadata {
        TableMetadata::new("gebieden_buurten")
            .with_column(ColumnMetadata::new("id", "VARCHAR").nullable(false))
            .with_column(ColumnMetadata::new("naam", "VARCHAR").nullable(false))
            .with_column(ColumnMetadata::new("_private", "INTEGER").nullable(false))
            .with_column(ColumnMetadata::new("ligt_in_wijk_id", "VARCHAR"))
            .with_column(ColumnMetadata::new("geometrie", "GEOMETRY").with_geometry_type("MULTIPOLYGON"))
            .with_primary_key(["id"])
            .with_foreign_key(["ligt_in_wijk_id"], "gebieden_wijken")
    }

    #[test]
    fn test_reflect_table() {
        let table = SchemaReflector::default()
            .reflect_table(&buurten(), Some("gebieden_"))
            .unwrap();

        assert_eq!(table.id, "buurten");
        assert_eq!(table.required(), vec!["schema", "id", "naam"]);
        assert_eq!(table.display.as_deref(), Some("id"));
        assert!(table.identifier.is_none());
        assert!(table.field("_private").is_none());

        let relation = table.field("ligtInWijk").unwrap();
        assert_eq!(relation.relation.as_deref(), Some("gebieden:wijken"));
        assert!(relation.nullable);

        assert_eq!(
            table.field("geometrie").unwrap().schema_type,
            SchemaType::Geometry(GeometryKind::MultiPolygon)
        );
    }

    #[test]
    fn test_composite_keys_rejected() {
        let composite_pk = TableMetadata::new("t")
            .with_column(ColumnMetadata::new("a", "INTEGER"))
            .with_column(ColumnMetadata::new("b", "INTEGER"))
            .with_primary_key(["a", "b"]);
        assert!(matches!(
            reflect_tables(&[composite_pk], "ds", None),
            Err(SchemaError::CompositeKeyUnsupported {
                kind: KeyKind::PrimaryKey,
                ..
            })
        ));

        let composite_fk = buurten().with_foreign_key(["naam", "ligt_in_wijk_id"], "gebieden_wijken");
        assert!(matches!(
            reflect_tables(&[composite_fk], "gebieden", None),
            Err(SchemaError::CompositeKeyUnsupported {
                kind: KeyKind::ForeignKey,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_primary_key() {
        let table = TableMetadata::new("t").with_column(ColumnMetadata::new("id", "INTEGER"));
        assert!(matches!(
            reflect_tables(&[table], "ds", None),
            Err(SchemaError::MissingPrimaryKey { .. })
        ));
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let table = buurten().with_column(ColumnMetadata::new("duur", "INTERVAL"));
        let err = reflect_tables(&[table], "gebieden", None).unwrap_err();
        assert!(err.to_string().contains("at field 'duur' of table 'gebieden_buurten'"));
    }

    #[test]
    fn test_internal_foreign_key_is_not_a_relation() {
        let table = buurten()
            .with_column(ColumnMetadata::new("_source_id", "INTEGER"))
            .with_foreign_key(["_source_id"], "meta_sources");
        let table = SchemaReflector::default().reflect_table(&table, None).unwrap();
        assert!(table.fields.iter().all(|f| f.relation.as_deref() != Some("meta:sources")));
    }

    #[test]
    fn test_primary_key_under_other_name() {
        let table = TableMetadata::new("meldingen_statistieken")
            .with_column(ColumnMetadata::new("volg_nummer", "BIGINT"))
            .with_column(ColumnMetadata::new("buurt", "VARCHAR"))
            .with_primary_key(["volg_nummer"]);
        let table = SchemaReflector::default().reflect_table(&table, None).unwrap();
        assert_eq!(table.identifier.as_deref(), Some("volgNummer"));
        assert_eq!(table.display.as_deref(), Some("volgNummer"));
    }

    #[test]
    fn test_unconventional_column_names_are_pinned() {
        let table = buurten()
            .with_column(ColumnMetadata::new("wijk", "VARCHAR"))
            .with_foreign_key(["wijk"], "gebieden_wijken")
            .with_column(ColumnMetadata::new("Omschrijving", "TEXT"));
        let table = SchemaReflector::default().reflect_table(&table, None).unwrap();

        let wijk = table.field("wijk").unwrap();
        assert_eq!(wijk.relation.as_deref(), Some("gebieden:wijken"));
        assert_eq!(wijk.column.as_deref(), Some("wijk"));
        assert_eq!(table.field("omschrijving").unwrap().column.as_deref(), Some("Omschrijving"));

        // Conventional names need no pin
        assert!(table.field("ligtInWijk").unwrap().column.is_none());
        assert!(table.field("id").unwrap().column.is_none());
    }

    #[test]
    fn test_dataset_header() {
        let dataset = reflect_tables(&[buurten()], "gebieden", None).unwrap();
        assert_eq!(dataset.id, "gebieden");
        assert_eq!(dataset.title, "gebieden");
        assert_eq!(dataset.version, "0.0.1");
        assert_eq!(dataset.crs.as_deref(), Some("EPSG:28992"));
        assert_eq!(dataset.tables[0].id, "gebieden_buurten");
    }
}
