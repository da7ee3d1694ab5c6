//! Error types for schema reflection, materialization and row loading

use thiserror::Error;

use crate::storage::StorageError;

/// Errors raised by the mapping engine
///
/// Every variant carries enough context (table and field identifiers) to
/// diagnose the failure. None of them are retried internally.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// An identifier to normalize was empty
    #[error("Identifier cannot be an empty string")]
    EmptyIdentifier,

    /// A type token or storage type class is not in the type map
    #[error("Unknown type '{type_name}'{}", context_suffix(.table, .field))]
    UnknownType {
        type_name: String,
        table: Option<String>,
        field: Option<String>,
    },

    /// A primary key or foreign key spans more than one column
    #[error("Composite {kind} on table '{table}' is not supported: {columns:?}")]
    CompositeKeyUnsupported {
        table: String,
        kind: KeyKind,
        columns: Vec<String>,
    },

    /// A table has no primary key
    #[error("Table '{table}' has no primary key")]
    MissingPrimaryKey { table: String },

    /// The requested table does not exist in the dataset
    #[error("Table '{table}' does not exist in dataset '{dataset}', available are: {available:?}")]
    TableNotFound {
        dataset: String,
        table: String,
        available: Vec<String>,
    },

    /// A row to load has no geometry while the table has a geometry column
    #[error("Row {row} for table '{table}' is missing geometry field '{field}'")]
    MissingGeometry {
        table: String,
        field: String,
        row: usize,
    },

    /// A geometry value could not be encoded
    #[error("Invalid geometry in field '{field}' of table '{table}': {reason}")]
    InvalidGeometry {
        table: String,
        field: String,
        reason: String,
    },

    /// A row value could not be parsed for its column type
    #[error("Invalid value in field '{field}' of table '{table}': {reason}")]
    InvalidValue {
        table: String,
        field: String,
        reason: String,
    },

    /// The dataset document is malformed
    #[error("Invalid dataset document: {0}")]
    InvalidDocument(String),

    /// Configuration could not be read
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Storage collaborator failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Which kind of key constraint was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    PrimaryKey,
    ForeignKey,
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyKind::PrimaryKey => write!(f, "primary key"),
            KeyKind::ForeignKey => write!(f, "foreign key"),
        }
    }
}

fn context_suffix(table: &Option<String>, field: &Option<String>) -> String {
    match (table, field) {
        (Some(table), Some(field)) => format!(" at field '{field}' of table '{table}'"),
        (Some(table), None) => format!(" in table '{table}'"),
        (None, Some(field)) => format!(" at field '{field}'"),
        (None, None) => String::new(),
    }
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

impl SchemaError {
    /// Build an `UnknownType` error without table/field context
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        SchemaError::UnknownType {
            type_name: type_name.into(),
            table: None,
            field: None,
        }
    }

    /// Attach table and field context to an `UnknownType` error
    ///
    /// Other variants are returned unchanged.
    pub fn in_field(self, table: &str, field: &str) -> Self {
        match self {
            SchemaError::UnknownType { type_name, .. } => SchemaError::UnknownType {
                type_name,
                table: Some(table.to_string()),
                field: Some(field.to_string()),
            },
            other => other,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            SchemaError::UnknownType { type_name, .. } => {
                format!(
                    "{self}\n\nHint: '{type_name}' has no entry in the type map. \
                    Supported storage types include VARCHAR, TEXT, INTEGER, SMALLINT, NUMERIC, \
                    BOOLEAN, DATE, TIMESTAMP, ARRAY and the PostGIS geometry types."
                )
            }
            SchemaError::CompositeKeyUnsupported { table, .. } => {
                format!(
                    "{self}\n\nHint: Add a single-column surrogate key to '{table}' before reflecting it."
                )
            }
            SchemaError::MissingPrimaryKey { table } => {
                format!("{self}\n\nHint: Reflection needs a primary key on '{table}'.")
            }
            SchemaError::TableNotFound { available, .. } => {
                format!(
                    "{self}\n\nHint: Use one of the table ids: {}.",
                    available.join(", ")
                )
            }
            SchemaError::MissingGeometry { field, .. } => {
                format!("{self}\n\nHint: Every row needs a '{field}' value holding a geometry.")
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchemaError::unknown_type("INTERVAL");
        assert_eq!(err.to_string(), "Unknown type 'INTERVAL'");

        let err = SchemaError::unknown_type("INTERVAL").in_field("buurten", "duur");
        assert!(err.to_string().contains("at field 'duur' of table 'buurten'"));

        let err = SchemaError::CompositeKeyUnsupported {
            table: "panden".to_string(),
            kind: KeyKind::PrimaryKey,
            columns: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().contains("Composite primary key"));
    }

    #[test]
    fn test_in_field_keeps_other_variants() {
        let err = SchemaError::MissingPrimaryKey {
            table: "t".to_string(),
        }
        .in_field("t", "f");
        assert!(matches!(err, SchemaError::MissingPrimaryKey { .. }));
    }

    #[test]
    fn test_user_message_hints() {
        let err = SchemaError::TableNotFound {
            dataset: "gebieden".to_string(),
            table: "wijken".to_string(),
            available: vec!["buurten".to_string(), "stadsdelen".to_string()],
        };
        let msg = err.user_message();
        assert!(msg.contains("Hint"));
        assert!(msg.contains("buurten, stadsdelen"));
    }
}
