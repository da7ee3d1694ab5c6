//! Dataset schema documents
//!
//! A dataset document is JSON (or YAML) of the shape
//!
//! ```json
//! {
//!   "type": "dataset",
//!   "id": "gebieden",
//!   "title": "gebieden",
//!   "version": "0.0.1",
//!   "crs": "EPSG:28992",
//!   "tables": [
//!     {
//!       "id": "buurten",
//!       "type": "table",
//!       "schema": {
//!         "$schema": "http://json-schema.org/draft-07/schema#",
//!         "type": "object",
//!         "additionalProperties": false,
//!         "required": ["schema", "id"],
//!         "display": "id",
//!         "properties": { "...": {} }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Property order is preserved in both directions.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::error::{SchemaError, SchemaResult};
use crate::naming::to_storage_form;
use crate::typemap::{DEFAULT_SRID, MetaRef, SchemaType};

const JSON_SCHEMA_DRAFT: &str = "http://json-schema.org/draft-07/schema#";

/// Default identifier field of a table
pub const DEFAULT_IDENTIFIER: &str = "id";

static CRS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]+:(\d+)$").expect("Invalid CRS regex"));

/// A dataset: an ordered set of tables
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSchema {
    pub id: String,
    pub title: String,
    pub version: String,
    /// Coordinate reference system, e.g. `EPSG:28992`
    pub crs: Option<String>,
    pub status: Option<String>,
    pub tables: Vec<TableDefinition>,
}

/// A table: an ordered set of fields
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub id: String,
    pub fields: Vec<FieldDefinition>,
    pub display: Option<String>,
    /// Identifier field when it is not [`DEFAULT_IDENTIFIER`]
    pub identifier: Option<String>,
    pub description: Option<String>,
}

/// A field of a table
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// Display form identifier
    pub id: String,
    pub schema_type: SchemaType,
    /// Relation target, `dataset:table`
    pub relation: Option<String>,
    pub nullable: bool,
    pub description: Option<String>,
    /// Storage column name, when it is not the one derived from `id`
    pub column: Option<String>,
}

impl FieldDefinition {
    /// A nullable field without relation
    pub fn new(id: impl Into<String>, schema_type: SchemaType) -> Self {
        Self {
            id: id.into(),
            schema_type,
            relation: None,
            nullable: true,
            description: None,
            column: None,
        }
    }

    /// The `schema` field that leads every table
    pub fn schema_meta() -> Self {
        Self::new("schema", SchemaType::Meta(MetaRef::Schema)).required()
    }

    /// Mark as non-nullable
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_relation(mut self, target: impl Into<String>) -> Self {
        self.relation = Some(target.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Pin the storage column name
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Whether this is the `schema` meta field
    pub fn is_schema_meta(&self) -> bool {
        self.schema_type == SchemaType::Meta(MetaRef::Schema)
    }

    fn to_property(&self) -> Value {
        let mut property = self.schema_type.to_property();
        if let Value::Object(map) = &mut property {
            if let Some(relation) = &self.relation {
                map.insert("relation".to_string(), json!(relation));
            }
            if let Some(description) = &self.description {
                map.insert("description".to_string(), json!(description));
            }
            if let Some(column) = &self.column {
                map.insert("columnName".to_string(), json!(column));
            }
        }
        property
    }

    fn from_property(id: &str, property: &Value, nullable: bool) -> SchemaResult<Self> {
        let schema_type = SchemaType::from_property(property)?;
        Ok(Self {
            id: id.to_string(),
            schema_type,
            relation: property
                .get("relation")
                .and_then(Value::as_str)
                .map(String::from),
            nullable,
            description: property
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
            column: property
                .get("columnName")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }
}

impl TableDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Vec::new(),
            display: None,
            identifier: None,
            description: None,
        }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Find a field by its identifier
    pub fn field(&self, id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Identifiers of the non-nullable fields, in field order
    pub fn required(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| !f.nullable)
            .map(|f| f.id.as_str())
            .collect()
    }

    /// Identifier of the field that becomes the primary key
    pub fn identifier_field(&self) -> &str {
        self.identifier.as_deref().unwrap_or(DEFAULT_IDENTIFIER)
    }

    /// The geometry field rows must carry
    ///
    /// A field named `geometry` wins, otherwise the first geometry field.
    pub fn primary_geometry_field(&self) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| f.id == "geometry" && f.schema_type.is_geometry())
            .or_else(|| self.fields.iter().find(|f| f.schema_type.is_geometry()))
    }

    /// Render as a table document
    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            properties.insert(field.id.clone(), field.to_property());
        }

        let mut schema = Map::new();
        schema.insert("$schema".to_string(), json!(JSON_SCHEMA_DRAFT));
        schema.insert("type".to_string(), json!("object"));
        schema.insert("additionalProperties".to_string(), json!(false));
        if let Some(identifier) = &self.identifier {
            schema.insert("identifier".to_string(), json!(identifier));
        }
        schema.insert("required".to_string(), json!(self.required()));
        if let Some(display) = &self.display {
            schema.insert("display".to_string(), json!(display));
        }
        schema.insert("properties".to_string(), Value::Object(properties));

        let mut table = Map::new();
        table.insert("id".to_string(), json!(self.id));
        table.insert("type".to_string(), json!("table"));
        if let Some(description) = &self.description {
            table.insert("description".to_string(), json!(description));
        }
        table.insert("schema".to_string(), Value::Object(schema));
        Value::Object(table)
    }

    /// Parse and validate a table document
    pub fn from_json(value: &Value) -> SchemaResult<Self> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SchemaError::InvalidDocument("Table is missing an 'id'".to_string()))?;

        let schema = value.get("schema").ok_or_else(|| {
            SchemaError::InvalidDocument(format!("Table '{id}' is missing its 'schema'"))
        })?;
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                SchemaError::InvalidDocument(format!("Table '{id}' has no 'properties' object"))
            })?;

        let required: Vec<&str> = match schema.get("required") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| {
                        SchemaError::InvalidDocument(format!(
                            "Table '{id}' has a non-string entry in 'required'"
                        ))
                    })
                })
                .collect::<SchemaResult<_>>()?,
            Some(_) => {
                return Err(SchemaError::InvalidDocument(format!(
                    "Table '{id}' has a 'required' that is not a list"
                )));
            }
        };

        if let Some(missing) = required.iter().find(|name| !properties.contains_key(**name)) {
            return Err(SchemaError::InvalidDocument(format!(
                "Table '{id}' requires '{missing}' which is not a property"
            )));
        }

        let mut fields = Vec::with_capacity(properties.len());
        for (name, property) in properties {
            let nullable = !required.contains(&name.as_str());
            let field = FieldDefinition::from_property(name, property, nullable)
                .map_err(|e| e.in_field(id, name))?;
            fields.push(field);
        }

        let display = schema.get("display").and_then(Value::as_str).map(String::from);
        let identifier = schema.get("identifier").and_then(Value::as_str).map(String::from);

        for (key, name) in [("display", &display), ("identifier", &identifier)] {
            if let Some(name) = name
                && !properties.contains_key(name)
            {
                return Err(SchemaError::InvalidDocument(format!(
                    "Table '{id}' has {key} '{name}' which is not a property"
                )));
            }
        }

        Ok(Self {
            id: id.to_string(),
            fields,
            display,
            identifier,
            description: value.get("description").and_then(Value::as_str).map(String::from),
        })
    }
}

impl DatasetSchema {
    /// An empty dataset with title `id`, version `0.0.1` and no crs
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            version: "0.0.1".to_string(),
            crs: None,
            status: None,
            tables: Vec::new(),
        }
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn with_table(mut self, table: TableDefinition) -> Self {
        self.tables.push(table);
        self
    }

    /// Find a table by identifier
    ///
    /// Falls back to comparing storage forms, so `uRoutes` also finds
    /// `u_routes`.
    pub fn get_table(&self, table_id: &str) -> SchemaResult<&TableDefinition> {
        if let Some(table) = self.tables.iter().find(|t| t.id == table_id) {
            return Ok(table);
        }

        let wanted = to_storage_form(table_id)?;
        for table in &self.tables {
            if to_storage_form(&table.id)? == wanted {
                return Ok(table);
            }
        }

        Err(SchemaError::TableNotFound {
            dataset: self.id.clone(),
            table: table_id.to_string(),
            available: self.tables.iter().map(|t| t.id.clone()).collect(),
        })
    }

    /// Numeric spatial reference of the dataset crs, or [`DEFAULT_SRID`]
    pub fn srid(&self) -> u32 {
        self.declared_srid().unwrap_or(DEFAULT_SRID)
    }

    /// Numeric spatial reference of the dataset crs, when declared
    pub fn declared_srid(&self) -> Option<u32> {
        self.crs
            .as_deref()
            .and_then(|crs| CRS_REGEX.captures(crs))
            .and_then(|captures| captures[1].parse().ok())
    }

    /// Check the document level invariants
    pub fn validate(&self) -> SchemaResult<()> {
        let storage_id = self.id.replace('-', "_");
        if storage_id.is_empty()
            || !storage_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(SchemaError::InvalidDocument(format!(
                "Dataset id '{}' is not a valid storage identifier",
                self.id
            )));
        }

        if let Some(crs) = &self.crs
            && !CRS_REGEX.is_match(crs)
        {
            return Err(SchemaError::InvalidDocument(format!(
                "Dataset crs '{crs}' is not of the form AUTHORITY:CODE"
            )));
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.id.as_str()) {
                return Err(SchemaError::InvalidDocument(format!(
                    "Dataset '{}' declares table '{}' twice",
                    self.id, table.id
                )));
            }
            let primary_keys = table
                .fields
                .iter()
                .filter(|f| f.id == table.identifier_field())
                .count();
            if primary_keys > 1 {
                return Err(SchemaError::InvalidDocument(format!(
                    "Table '{}' declares its identifier field twice",
                    table.id
                )));
            }
        }

        Ok(())
    }

    /// Render as a dataset document
    pub fn to_json(&self) -> Value {
        let mut dataset = Map::new();
        dataset.insert("type".to_string(), json!("dataset"));
        dataset.insert("id".to_string(), json!(self.id));
        dataset.insert("title".to_string(), json!(self.title));
        if let Some(status) = &self.status {
            dataset.insert("status".to_string(), json!(status));
        }
        dataset.insert("version".to_string(), json!(self.version));
        if let Some(crs) = &self.crs {
            dataset.insert("crs".to_string(), json!(crs));
        }
        dataset.insert(
            "tables".to_string(),
            Value::Array(self.tables.iter().map(TableDefinition::to_json).collect()),
        );
        Value::Object(dataset)
    }

    /// Render as pretty-printed JSON text
    pub fn to_json_string(&self) -> SchemaResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    /// Parse and validate a dataset document
    pub fn from_value(value: &Value) -> SchemaResult<Self> {
        match value.get("type").and_then(Value::as_str) {
            Some("dataset") => {}
            other => {
                return Err(SchemaError::InvalidDocument(format!(
                    "Expected type 'dataset', found {other:?}"
                )));
            }
        }

        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaError::InvalidDocument("Dataset is missing an 'id'".to_string()))?;

        let tables = value
            .get("tables")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                SchemaError::InvalidDocument(format!("Dataset '{id}' has no 'tables' list"))
            })?
            .iter()
            .map(TableDefinition::from_json)
            .collect::<SchemaResult<Vec<_>>>()?;

        let text = |key: &str| value.get(key).and_then(Value::as_str).map(String::from);

        let dataset = Self {
            id: id.to_string(),
            title: text("title").unwrap_or_else(|| id.to_string()),
            version: text("version").unwrap_or_else(|| "0.0.1".to_string()),
            crs: text("crs"),
            status: text("status"),
            tables,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Parse and validate a JSON dataset document
    pub fn from_json(content: &str) -> SchemaResult<Self> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_value(&value)
    }

    /// Parse and validate a YAML dataset document
    pub fn from_yaml_str(content: &str) -> SchemaResult<Self> {
        let value: Value = serde_yaml::from_str(content)?;
        Self::from_value(&value)
    }
}
