//! Configuration for reflection, materialization and loading

use serde::{Deserialize, Serialize};

use crate::error::SchemaResult;
use crate::naming::to_display_form;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaConfig {
    /// Coordinate reference system written into reflected datasets
    pub default_crs: String,
    /// Version written into reflected datasets
    pub dataset_version: String,
    /// Columns starting with this prefix are internal and never reflected
    pub internal_column_prefix: String,
    /// Storage column that holds the row identifier
    pub identifier_column: String,
    /// Number of rows per insert batch
    pub batch_size: usize,
    /// How reflected column names become field identifiers
    pub naming: NamingPolicy,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            default_crs: "EPSG:28992".to_string(),
            dataset_version: "0.0.1".to_string(),
            internal_column_prefix: "_".to_string(),
            identifier_column: "id".to_string(),
            batch_size: 100,
            naming: NamingPolicy::default(),
        }
    }
}

impl SchemaConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default coordinate reference system
    pub fn with_default_crs(mut self, crs: impl Into<String>) -> Self {
        self.default_crs = crs.into();
        self
    }

    /// Set the dataset version for reflected datasets
    pub fn with_dataset_version(mut self, version: impl Into<String>) -> Self {
        self.dataset_version = version.into();
        self
    }

    /// Set the internal column prefix
    pub fn with_internal_column_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.internal_column_prefix = prefix.into();
        self
    }

    /// Set the identifier column name
    pub fn with_identifier_column(mut self, column: impl Into<String>) -> Self {
        self.identifier_column = column.into();
        self
    }

    /// Set the insert batch size (at least 1)
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the naming policy
    pub fn with_naming(mut self, naming: NamingPolicy) -> Self {
        self.naming = naming;
        self
    }

    /// Whether a storage column is internal
    pub fn is_internal_column(&self, column: &str) -> bool {
        !self.internal_column_prefix.is_empty() && column.starts_with(&self.internal_column_prefix)
    }

    /// Parse a config from TOML text
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(content: &str) -> SchemaResult<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| crate::error::SchemaError::Config(e.to_string()))?;
        config.batch_size = config.batch_size.max(1);
        Ok(config)
    }

    /// Load a config from a TOML file
    #[cfg(feature = "config-file")]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::SchemaError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }
}

/// Naming convention applied to reflected column names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NamingPolicy {
    /// Strip the relation suffix from relation columns (`buurt_id` → `buurt`)
    pub strip_relation_id_suffix: bool,
    /// Suffix carried by relation columns in storage
    pub relation_id_suffix: String,
    /// Turn underscores into spaces before converting to display form
    pub underscores_to_spaces: bool,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            strip_relation_id_suffix: true,
            relation_id_suffix: "_id".to_string(),
            underscores_to_spaces: true,
        }
    }
}

impl NamingPolicy {
    /// A policy that keeps column names as they are before normalization
    pub fn verbatim() -> Self {
        Self {
            strip_relation_id_suffix: false,
            relation_id_suffix: "_id".to_string(),
            underscores_to_spaces: false,
        }
    }

    /// Field identifier (display form) for a storage column
    pub fn field_name(&self, column: &str, is_relation: bool) -> SchemaResult<String> {
        let mut name = column;
        if is_relation
            && self.strip_relation_id_suffix
            && let Some(stripped) = column.strip_suffix(self.relation_id_suffix.as_str())
            && !stripped.is_empty()
        {
            name = stripped;
        }

        if self.underscores_to_spaces {
            to_display_form(&name.replace('_', " "))
        } else {
            to_display_form(name)
        }
    }

    /// Storage column name suffix for a relation field
    pub fn relation_suffix(&self) -> &str {
        if self.strip_relation_id_suffix {
            &self.relation_id_suffix
        } else {
            ""
        }
    }
}
