//! Row transformation
//!
//! Load direction (`load_rows`): rows keyed on field identifiers become rows
//! keyed on storage column names. Geometries (GeoJSON objects, WKT or EWKT
//! text) are encoded as EWKT in the target spatial reference, nested objects
//! as JSON text, and date/time strings are checked.
//!
//! Export direction (`export_row`): rows read back from storage are keyed on
//! field identifiers again, and geometry and nested-object columns are
//! decoded. Export never fails: values without a decoder, or that do not
//! decode, are passed through unchanged.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use tracing::debug;

use crate::config::SchemaConfig;
use crate::error::{SchemaError, SchemaResult};
use crate::geometry::Geometry;
use crate::materialize::column_name;
use crate::models::{FieldDefinition, Row, TableDefinition};
use crate::naming::{to_display_form, to_storage_form};
use crate::typemap::{SchemaType, StringFormat};

/// Converts rows between their dataset and storage shapes
#[derive(Debug, Clone, Default)]
pub struct RowTransformer {
    config: SchemaConfig,
}

/// Fields of one table, addressable by identifier or column name
struct FieldIndex<'a> {
    fields: Vec<(&'a FieldDefinition, String)>,
    by_key: HashMap<String, usize>,
}

impl<'a> FieldIndex<'a> {
    fn new(table: &'a TableDefinition, config: &SchemaConfig) -> SchemaResult<Self> {
        let mut fields = Vec::with_capacity(table.fields.len());
        let mut by_key = HashMap::new();

        for field in table.fields.iter().filter(|f| !f.is_schema_meta()) {
            let column = column_name(field, &config.naming)?;
            let index = fields.len();
            by_key.insert(field.id.clone(), index);
            by_key.insert(to_storage_form(&field.id)?, index);
            by_key.insert(column.clone(), index);
            fields.push((field, column));
        }

        Ok(Self { fields, by_key })
    }

    fn get(&self, key: &str) -> Option<&(&'a FieldDefinition, String)> {
        self.by_key.get(key).map(|&index| &self.fields[index])
    }
}

impl RowTransformer {
    pub fn new(config: SchemaConfig) -> Self {
        Self { config }
    }

    /// Prepare rows for insertion into the materialized table
    ///
    /// Keys may be field identifiers or their storage form. Keys that are
    /// not fields of the table are dropped.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::MissingGeometry`] when the table has a geometry field
    ///   and a row has no value for it
    /// - [`SchemaError::InvalidGeometry`] for geometries that cannot be read
    /// - [`SchemaError::InvalidValue`] for malformed dates and times
    ///
    /// # Example
    ///
    /// ```rust
    /// use schema_tools::models::{FieldDefinition, TableDefinition};
    /// use schema_tools::rows::RowTransformer;
    /// use schema_tools::typemap::{GeometryKind, SchemaType};
    /// use serde_json::json;
    ///
    /// let table = TableDefinition::new("lichtmasten")
    ///     .with_field(FieldDefinition::new("id", SchemaType::Integer).required())
    ///     .with_field(FieldDefinition::new("geometry", SchemaType::Geometry(GeometryKind::Point)));
    ///
    /// let row = json!({"id": 1, "geometry": {"type": "Point", "coordinates": [1, 2]}});
    /// let rows = RowTransformer::default()
    ///     .load_rows(&table, vec![row.as_object().unwrap().clone()], 28992)
    ///     .unwrap();
    /// assert_eq!(rows[0]["geometry"], json!("SRID=28992;POINT (1 2)"));
    /// ```
    pub fn load_rows(
        &self,
        table: &TableDefinition,
        rows: impl IntoIterator<Item = Row>,
        srid: u32,
    ) -> SchemaResult<Vec<Row>> {
        let index = FieldIndex::new(table, &self.config)?;
        let geometry_field = table.primary_geometry_field();

        let mut loaded = Vec::new();
        for (row_number, row) in rows.into_iter().enumerate() {
            if let Some(geometry) = geometry_field {
                let present = row.iter().any(|(key, value)| {
                    !value.is_null()
                        && index
                            .get(key)
                            .is_some_and(|(field, _)| field.id == geometry.id)
                });
                if !present {
                    return Err(SchemaError::MissingGeometry {
                        table: table.id.clone(),
                        field: geometry.id.clone(),
                        row: row_number,
                    });
                }
            }

            let mut out = Row::new();
            for (key, value) in row {
                let Some((field, column)) = index.get(&key) else {
                    debug!(table = %table.id, key = %key, "Dropping key that is not a field");
                    continue;
                };
                let encoded = encode_value(table, field, value, srid)?;
                out.insert(column.clone(), encoded);
            }
            loaded.push(out);
        }

        Ok(loaded)
    }

    /// Convert a stored row back to its dataset shape
    pub fn export_row(&self, table: &TableDefinition, row: Row) -> Row {
        // Without an index keys are still converted, only decoding is skipped
        let index = FieldIndex::new(table, &self.config).ok();

        let mut out = Row::new();
        for (key, value) in row {
            let field = index.as_ref().and_then(|index| index.get(&key)).map(|(field, _)| *field);
            match field {
                Some(field) => {
                    out.insert(field.id.clone(), decode_value(field, value));
                }
                None => {
                    let display = to_display_form(&key).unwrap_or_else(|_| key.clone());
                    out.insert(display, value);
                }
            }
        }
        out
    }
}

/// Load rows with the default configuration
pub fn load_rows(
    table: &TableDefinition,
    rows: impl IntoIterator<Item = Row>,
    srid: u32,
) -> SchemaResult<Vec<Row>> {
    RowTransformer::default().load_rows(table, rows, srid)
}

/// Export a row with the default configuration
pub fn export_row(table: &TableDefinition, row: Row) -> Row {
    RowTransformer::default().export_row(table, row)
}

fn encode_value(
    table: &TableDefinition,
    field: &FieldDefinition,
    value: Value,
    srid: u32,
) -> SchemaResult<Value> {
    if value.is_null() {
        return Ok(value);
    }

    match &field.schema_type {
        SchemaType::Geometry(_) => encode_geometry(table, field, &value, srid).map(Value::String),
        SchemaType::Object => match value {
            Value::String(_) => Ok(value),
            other => Ok(Value::String(other.to_string())),
        },
        SchemaType::String {
            format: Some(format),
        } => {
            check_temporal(*format, &value).map_err(|reason| SchemaError::InvalidValue {
                table: table.id.clone(),
                field: field.id.clone(),
                reason,
            })?;
            Ok(value)
        }
        _ => Ok(value),
    }
}

fn encode_geometry(
    table: &TableDefinition,
    field: &FieldDefinition,
    value: &Value,
    srid: u32,
) -> SchemaResult<String> {
    let invalid = |reason: String| SchemaError::InvalidGeometry {
        table: table.id.clone(),
        field: field.id.clone(),
        reason,
    };

    let geometry = match value {
        Value::Object(_) => Geometry::from_geojson(value).map_err(|e| invalid(e.to_string()))?,
        Value::String(text) => {
            let (declared, geometry) = Geometry::parse_ewkt(text).map_err(|e| invalid(e.to_string()))?;
            if let Some(declared) = declared
                && declared != srid
            {
                return Err(invalid(format!(
                    "value is in SRID {declared}, the column expects SRID {srid}"
                )));
            }
            geometry
        }
        other => return Err(invalid(format!("expected GeoJSON or WKT, found {other}"))),
    };

    Ok(geometry.to_ewkt(srid))
}

fn check_temporal(format: StringFormat, value: &Value) -> Result<(), String> {
    let Some(text) = value.as_str() else {
        return Err(format!("expected a {} string, found {value}", format.as_str()));
    };

    let valid = match format {
        StringFormat::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok(),
        StringFormat::DateTime => {
            DateTime::parse_from_rfc3339(text).is_ok()
                || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
                || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        }
        StringFormat::Time => {
            NaiveTime::parse_from_str(text, "%H:%M:%S%.f").is_ok()
                || NaiveTime::parse_from_str(text, "%H:%M").is_ok()
        }
    };

    if valid {
        Ok(())
    } else {
        Err(format!("'{text}' is not a valid {}", format.as_str()))
    }
}

fn decode_value(field: &FieldDefinition, value: Value) -> Value {
    let Value::String(text) = &value else {
        return value;
    };
    if text.is_empty() {
        return value;
    }

    match &field.schema_type {
        SchemaType::Object => serde_json::from_str(text).unwrap_or(value),
        SchemaType::Geometry(_) => {
            if let Ok(decoded @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
                return decoded;
            }
            match Geometry::parse_wkt(text) {
                Ok(geometry) => geometry.to_geojson(),
                Err(_) => value,
            }
        }
        _ => value,
    }
}
