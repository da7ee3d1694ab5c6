//! Table metadata as reported by a storage inspection collaborator

use serde::{Deserialize, Serialize};

use super::storage::StorageTableDefinition;

/// Column, primary key and foreign key metadata of one storage table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    /// Storage table name
    pub name: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnMetadata>,
    /// Columns of the primary key constraint
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyMetadata>,
}

/// One storage column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub name: String,
    /// Type class, e.g. `VARCHAR`, `ARRAY` or `GEOMETRY`
    pub type_class: String,
    /// Shape of a `GEOMETRY` column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_type: Option<String>,
    /// Item type class of an `ARRAY` column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

/// One foreign key constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyMetadata {
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_foreign_key<I, S>(mut self, columns: I, referred_table: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.foreign_keys.push(ForeignKeyMetadata {
            constrained_columns: columns.into_iter().map(Into::into).collect(),
            referred_table: referred_table.into(),
        });
        self
    }

    /// Find a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }
}

impl ColumnMetadata {
    /// A nullable column of the given type class
    pub fn new(name: impl Into<String>, type_class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_class: type_class.into(),
            geometry_type: None,
            item_type: None,
            nullable: true,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_geometry_type(mut self, geometry_type: impl Into<String>) -> Self {
        self.geometry_type = Some(geometry_type.into());
        self
    }

    pub fn with_item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    /// The sub-type to resolve next to the type class
    pub fn sub_type(&self) -> Option<&str> {
        self.geometry_type.as_deref().or(self.item_type.as_deref())
    }
}

impl From<&StorageTableDefinition> for TableMetadata {
    /// Describe a materialized table the way an inspector would
    fn from(table: &StorageTableDefinition) -> Self {
        let mut metadata = TableMetadata::new(table.name.clone());

        for column in &table.columns {
            let mut described = ColumnMetadata::new(column.name.clone(), column.storage_type.type_class())
                .nullable(column.nullable);
            if let Some(sub_type) = column.storage_type.sub_type() {
                described = if column.storage_type.is_geometry() {
                    described.with_geometry_type(sub_type)
                } else {
                    described.with_item_type(sub_type)
                };
            }
            metadata.columns.push(described);

            if column.primary_key {
                metadata.primary_key.push(column.name.clone());
            }
            if let Some(referred_table) = &column.references {
                metadata.foreign_keys.push(ForeignKeyMetadata {
                    constrained_columns: vec![column.name.clone()],
                    referred_table: referred_table.clone(),
                });
            }
        }

        metadata
    }
}
