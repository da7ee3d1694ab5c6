//! Storage table definitions produced by materialization
//!
//! # Security
//!
//! Identifiers in generated DDL are quoted and escaped by doubling internal
//! quote characters.

use crate::error::SchemaResult;
use crate::naming::to_storage_form;
use crate::typemap::StorageType;

/// A relational table derived from a dataset table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTableDefinition {
    /// Storage name, `{dataset}_{table}`
    pub name: String,
    pub columns: Vec<StorageColumnDefinition>,
}

/// One relational column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageColumnDefinition {
    pub name: String,
    pub storage_type: StorageType,
    pub nullable: bool,
    pub primary_key: bool,
    /// Storage name of the referenced table for relation columns
    pub references: Option<String>,
}

impl StorageColumnDefinition {
    /// A nullable, non-key column
    pub fn new(name: impl Into<String>, storage_type: StorageType) -> Self {
        Self {
            name: name.into(),
            storage_type,
            nullable: true,
            primary_key: false,
            references: None,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Mark as primary key; primary key columns are never nullable
    pub fn primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        if primary_key {
            self.nullable = false;
        }
        self
    }

    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.references = Some(table.into());
        self
    }
}

impl StorageTableDefinition {
    /// Find a column by storage name
    pub fn column(&self, name: &str) -> Option<&StorageColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The primary key column, if any
    pub fn primary_key_column(&self) -> Option<&StorageColumnDefinition> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Storage names of the tables this table references
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().filter_map(|c| c.references.as_deref())
    }

    /// Render a CREATE TABLE statement
    ///
    /// # Arguments
    ///
    /// * `dialect` - Optional SQL dialect ("postgres", "mysql", "sqlserver");
    ///   standard SQL quoting when absent
    ///
    /// # Example
    ///
    /// ```rust
    /// use schema_tools::models::{StorageColumnDefinition, StorageTableDefinition};
    /// use schema_tools::typemap::StorageType;
    ///
    /// let table = StorageTableDefinition {
    ///     name: "gebieden_buurten".to_string(),
    ///     columns: vec![StorageColumnDefinition::new("id", StorageType::Varchar).primary_key(true)],
    /// };
    ///
    /// let sql = table.to_create_sql(Some("postgres"));
    /// assert_eq!(sql, "CREATE TABLE \"gebieden_buurten\" (\n  \"id\" VARCHAR NOT NULL PRIMARY KEY\n);\n");
    /// ```
    pub fn to_create_sql(&self, dialect: Option<&str>) -> String {
        let dialect = dialect.unwrap_or("standard");
        let mut sql = format!("CREATE TABLE {} (\n", quote_identifier(&self.name, dialect));

        let mut column_defs = Vec::new();
        for column in &self.columns {
            let mut col_def = format!("  {} {}", quote_identifier(&column.name, dialect), column.storage_type);

            if !column.nullable {
                col_def.push_str(" NOT NULL");
            }

            if column.primary_key {
                col_def.push_str(" PRIMARY KEY");
            }

            if let Some(referenced) = &column.references {
                col_def.push_str(&format!(" REFERENCES {}", quote_identifier(referenced, dialect)));
            }

            column_defs.push(col_def);
        }

        sql.push_str(&column_defs.join(",\n"));
        sql.push_str("\n);\n");
        sql
    }
}

/// Storage name of a dataset table: `{dataset}_{table}` with `-` turned into `_`
pub fn storage_table_name(dataset_id: &str, table_id: &str) -> SchemaResult<String> {
    Ok(format!("{dataset_id}_{}", to_storage_form(table_id)?).replace('-', "_"))
}

/// Quote and escape an identifier for a SQL dialect
///
/// - **PostgreSQL**: double quotes
/// - **MySQL**: backticks
/// - **SQL Server**: brackets
/// - **Standard SQL**: double quotes
pub fn quote_identifier(identifier: &str, dialect: &str) -> String {
    match dialect {
        "mysql" => format!("`{}`", identifier.replace('`', "``")),
        "sqlserver" | "mssql" => format!("[{}]", identifier.replace(']', "]]")),
        _ => format!("\"{}\"", identifier.replace('"', "\"\"")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemap::GeometryKind;

    fn buurten() -> StorageTableDefinition {
        StorageTableDefinition {
            name: "gebieden_buurten".to_string(),
            columns: vec![
                StorageColumnDefinition::new("id", StorageType::Varchar).primary_key(true),
                StorageColumnDefinition::new(
                    "geometrie",
                    StorageType::Geometry {
                        kind: GeometryKind::MultiPolygon,
                        srid: 28992,
                    },
                )
                .nullable(false),
                StorageColumnDefinition::new("ligt_in_wijk_id", StorageType::Varchar)
                    .references("gebieden_wijken"),
            ],
        }
    }

    #[test]
    fn test_create_sql_postgres() {
        let sql = buurten().to_create_sql(Some("postgres"));
        assert!(sql.starts_with("CREATE TABLE \"gebieden_buurten\" (\n"));
        assert!(sql.contains("  \"id\" VARCHAR NOT NULL PRIMARY KEY,\n"));
        assert!(sql.contains("  \"geometrie\" geometry(MULTIPOLYGON,28992) NOT NULL,\n"));
        assert!(sql.contains("  \"ligt_in_wijk_id\" VARCHAR REFERENCES \"gebieden_wijken\"\n"));
        assert!(sql.ends_with(");\n"));
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(quote_identifier("a\"b", "postgres"), "\"a\"\"b\"");
        assert_eq!(quote_identifier("a`b", "mysql"), "`a``b`");
        assert_eq!(quote_identifier("a]b", "sqlserver"), "[a]]b]");
    }

    #[test]
    fn test_storage_table_name() {
        assert_eq!(storage_table_name("gebieden", "buurten").unwrap(), "gebieden_buurten");
        assert_eq!(
            storage_table_name("hoofdroutes", "uRoutes").unwrap(),
            "hoofdroutes_u_routes"
        );
        assert_eq!(storage_table_name("bag-2", "panden").unwrap(), "bag_2_panden");
    }

    #[test]
    fn test_primary_key_is_not_nullable() {
        let column = StorageColumnDefinition::new("id", StorageType::Integer).primary_key(true);
        assert!(!column.nullable);
        assert_eq!(buurten().primary_key_column().unwrap().name, "id");
        assert_eq!(buurten().referenced_tables().collect::<Vec<_>>(), vec!["gebieden_wijken"]);
    }
}
