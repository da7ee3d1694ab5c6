//! Schema Tools - JSON-Schema dataset documents and relational storage
//!
//! Provides:
//! - Identifier normalization between display form (camelCase) and storage
//!   form (snake_case)
//! - A bidirectional type map between schema field types and storage types
//! - Reflection of storage tables into dataset schemas
//! - Materialization of dataset tables into storage table definitions
//! - Row transformation for loading and exporting data, geometries as EWKT
//! - Storage collaborator traits and an in-memory implementation
//!
//! # Example
//!
//! ```rust
//! use schema_tools::{DatasetSchema, materialize};
//!
//! let dataset = DatasetSchema::from_json(r#"{
//!     "type": "dataset",
//!     "id": "gebieden",
//!     "crs": "EPSG:28992",
//!     "tables": [{
//!         "id": "buurten",
//!         "type": "table",
//!         "schema": {
//!             "required": ["id"],
//!             "properties": {
//!                 "id": {"type": "string"},
//!                 "ligtInWijk": {"type": "string", "relation": "gebieden:wijken"}
//!             }
//!         }
//!     }]
//! }"#).unwrap();
//!
//! let table = materialize(&dataset, "buurten").unwrap();
//! assert_eq!(table.name, "gebieden_buurten");
//! assert_eq!(table.columns[1].name, "ligt_in_wijk_id");
//! ```

pub mod config;
pub mod error;
pub mod geometry;
pub mod load;
pub mod materialize;
pub mod models;
pub mod naming;
pub mod reflect;
pub mod rows;
pub mod storage;
pub mod typemap;

// Re-export commonly used types
pub use config::{NamingPolicy, SchemaConfig};
pub use error::{KeyKind, SchemaError, SchemaResult};
pub use geometry::{Geometry, GeometryError};
pub use load::{DatasetLoader, LoadStats};
pub use materialize::{TableMaterializer, materialize, materialize_all};
pub use models::{
    ColumnMetadata, DatasetSchema, FieldDefinition, ForeignKeyMetadata, Row, StorageColumnDefinition,
    StorageTableDefinition, TableDefinition, TableMetadata,
};
pub use naming::{RELATION_SEPARATOR, to_display_form, to_storage_form};
pub use reflect::{SchemaReflector, reflect_tables};
pub use rows::{RowTransformer, export_row, load_rows};
pub use storage::{InMemoryStorage, StorageError, StorageInspector, StorageWriter};
pub use typemap::{
    DEFAULT_SRID, GeometryKind, SchemaType, StorageType, schema_type_to_storage_type,
    storage_type_to_schema_type,
};
