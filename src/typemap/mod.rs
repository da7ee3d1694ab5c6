//! Type map between dataset schema field types and storage column types
//!
//! Schema types are the JSON-Schema facing side (`{"type": "string",
//! "format": "date"}`, `{"$ref": "https://geojson.org/schema/Point.json"}`).
//! Storage types are the relational side (`DATE`, `geometry(POINT,28992)`).
//!
//! The forward direction is a total function over [`SchemaType`]. The reverse
//! direction is a static table keyed on the storage type class reported by
//! an inspection collaborator.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};

use crate::error::{SchemaError, SchemaResult};

/// Spatial reference used when neither the dataset nor the caller sets one
pub const DEFAULT_SRID: u32 = 28992;

/// Base URL of the definitions in the dataset meta-schema
pub const SCHEMA_DEFINITIONS_URL: &str = "https://schemas.data.amsterdam.nl/schema@v1.1.1#/definitions";

const GEOJSON_SCHEMA_URL: &str = "https://geojson.org/schema";

static GEOJSON_REF_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://geojson\.org/schema/([A-Za-z]+)\.json$").expect("Invalid geojson ref regex")
});

static META_REF_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://\S+/schema@v[0-9][0-9.]*#/definitions/([A-Za-z]+)$")
        .expect("Invalid meta ref regex")
});

/// Storage type classes may carry parameters: `VARCHAR(255)`, `NUMERIC(10, 2)`
static TYPE_CLASS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z ]*?)\s*(?:\(.*\))?\s*$").expect("Invalid type class regex")
});

/// Reverse lookup, keyed on upper-cased storage type class
static STORAGE_TO_SCHEMA: Lazy<HashMap<&'static str, SchemaType>> = Lazy::new(|| {
    let string = SchemaType::String { format: None };
    let mut map = HashMap::new();
    map.insert("DATE", SchemaType::String { format: Some(StringFormat::Date) });
    map.insert("TIMESTAMP", SchemaType::String { format: Some(StringFormat::DateTime) });
    map.insert("DATETIME", SchemaType::String { format: Some(StringFormat::DateTime) });
    map.insert("TIME", SchemaType::String { format: Some(StringFormat::Time) });
    map.insert("VARCHAR", string.clone());
    map.insert("CHARACTER VARYING", string.clone());
    map.insert("STRING", string.clone());
    map.insert("TEXT", string.clone());
    map.insert("INTEGER", SchemaType::Integer);
    map.insert("INT", SchemaType::Integer);
    map.insert("SMALLINT", SchemaType::Integer);
    map.insert("BIGINT", SchemaType::Integer);
    map.insert("NUMERIC", SchemaType::Number);
    map.insert("DECIMAL", SchemaType::Number);
    map.insert("FLOAT", SchemaType::Number);
    map.insert("DOUBLE PRECISION", SchemaType::Number);
    map.insert("BOOLEAN", SchemaType::Boolean);
    for kind in GeometryKind::ALL {
        map.insert(kind.sql_name(), SchemaType::Geometry(kind));
    }
    map
});

/// Geometry sub-types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    /// Any shape
    Geometry,
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryKind {
    pub const ALL: [GeometryKind; 8] = [
        GeometryKind::Geometry,
        GeometryKind::Point,
        GeometryKind::MultiPoint,
        GeometryKind::LineString,
        GeometryKind::MultiLineString,
        GeometryKind::Polygon,
        GeometryKind::MultiPolygon,
        GeometryKind::GeometryCollection,
    ];

    /// Storage (PostGIS) name: `MULTIPOLYGON`
    pub fn sql_name(&self) -> &'static str {
        match self {
            GeometryKind::Geometry => "GEOMETRY",
            GeometryKind::Point => "POINT",
            GeometryKind::MultiPoint => "MULTIPOINT",
            GeometryKind::LineString => "LINESTRING",
            GeometryKind::MultiLineString => "MULTILINESTRING",
            GeometryKind::Polygon => "POLYGON",
            GeometryKind::MultiPolygon => "MULTIPOLYGON",
            GeometryKind::GeometryCollection => "GEOMETRYCOLLECTION",
        }
    }

    /// GeoJSON name: `MultiPolygon`
    pub fn geojson_name(&self) -> &'static str {
        match self {
            GeometryKind::Geometry => "Geometry",
            GeometryKind::Point => "Point",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::LineString => "LineString",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPolygon => "MultiPolygon",
            GeometryKind::GeometryCollection => "GeometryCollection",
        }
    }

    /// GeoJSON schema URL used as `$ref` in dataset documents
    pub fn schema_ref(&self) -> String {
        format!("{GEOJSON_SCHEMA_URL}/{}.json", self.geojson_name())
    }

    /// Case-insensitive lookup of a storage name
    pub fn from_sql_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|kind| kind.sql_name() == upper)
    }

    /// Exact lookup of a GeoJSON name
    pub fn from_geojson_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.geojson_name() == name)
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.geojson_name())
    }
}

/// Format refinements of the string type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringFormat {
    Date,
    DateTime,
    Time,
}

impl StringFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            StringFormat::Date => "date",
            StringFormat::DateTime => "date-time",
            StringFormat::Time => "time",
        }
    }

    pub fn parse(format: &str) -> Option<Self> {
        match format {
            "date" => Some(StringFormat::Date),
            "date-time" => Some(StringFormat::DateTime),
            "time" => Some(StringFormat::Time),
            _ => None,
        }
    }
}

/// References into the dataset meta-schema definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaRef {
    Id,
    Class,
    Dataset,
    /// The `schema` field every table starts with
    Schema,
}

impl MetaRef {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaRef::Id => "id",
            MetaRef::Class => "class",
            MetaRef::Dataset => "dataset",
            MetaRef::Schema => "schema",
        }
    }

    pub fn parse(definition: &str) -> Option<Self> {
        match definition {
            "id" => Some(MetaRef::Id),
            "class" => Some(MetaRef::Class),
            "dataset" => Some(MetaRef::Dataset),
            "schema" => Some(MetaRef::Schema),
            _ => None,
        }
    }

    pub fn schema_ref(&self) -> String {
        format!("{SCHEMA_DEFINITIONS_URL}/{}", self.as_str())
    }
}

/// Field type as it appears in a dataset schema document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemaType {
    String { format: Option<StringFormat> },
    Integer,
    Number,
    Boolean,
    /// Nested object, stored as JSON text
    Object,
    Array { items: Box<SchemaType> },
    Geometry(GeometryKind),
    Meta(MetaRef),
}

impl SchemaType {
    /// Plain string type
    pub fn string() -> Self {
        SchemaType::String { format: None }
    }

    /// Array of the given item type
    pub fn array(items: SchemaType) -> Self {
        SchemaType::Array {
            items: Box::new(items),
        }
    }

    /// Whether values of this type are geometries
    pub fn is_geometry(&self) -> bool {
        matches!(self, SchemaType::Geometry(_))
    }

    /// Parse a JSON-Schema property
    ///
    /// Unknown string formats fall back to a plain string. Keys that do not
    /// describe the type (`description`, `relation`, `title`) are ignored.
    pub fn from_property(property: &Value) -> SchemaResult<Self> {
        if let Some(reference) = property.get("$ref").and_then(Value::as_str) {
            return Self::from_token(reference);
        }

        let type_name = property
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaError::unknown_type(property.to_string()))?;

        match type_name {
            "string" => Ok(SchemaType::String {
                format: property
                    .get("format")
                    .and_then(Value::as_str)
                    .and_then(StringFormat::parse),
            }),
            "array" => {
                let items = match property.get("items") {
                    Some(items) => Self::from_property(items)?,
                    None => Self::string(),
                };
                Ok(Self::array(items))
            }
            other => Self::from_token(other),
        }
    }

    /// Parse a single type token
    ///
    /// Accepted tokens are the JSON-Schema primitive names, the string
    /// formats (`date`, `date-time`, `time`), GeoJSON schema URLs or bare
    /// GeoJSON names (`Point`), and meta-schema definition URLs.
    pub fn from_token(token: &str) -> SchemaResult<Self> {
        match token {
            "string" => return Ok(Self::string()),
            "integer" => return Ok(SchemaType::Integer),
            "number" => return Ok(SchemaType::Number),
            "boolean" => return Ok(SchemaType::Boolean),
            "object" => return Ok(SchemaType::Object),
            "array" => return Ok(Self::array(Self::string())),
            _ => {}
        }

        if let Some(format) = StringFormat::parse(token) {
            return Ok(SchemaType::String {
                format: Some(format),
            });
        }

        if let Some(kind) = GeometryKind::from_geojson_name(token) {
            return Ok(SchemaType::Geometry(kind));
        }

        if let Some(captures) = GEOJSON_REF_REGEX.captures(token)
            && let Some(kind) = GeometryKind::from_geojson_name(&captures[1])
        {
            return Ok(SchemaType::Geometry(kind));
        }

        if let Some(captures) = META_REF_REGEX.captures(token)
            && let Some(meta) = MetaRef::parse(&captures[1])
        {
            return Ok(SchemaType::Meta(meta));
        }

        Err(SchemaError::unknown_type(token))
    }

    /// Render as a JSON-Schema property
    pub fn to_property(&self) -> Value {
        match self {
            SchemaType::String { format: None } => json!({"type": "string"}),
            SchemaType::String {
                format: Some(format),
            } => json!({"type": "string", "format": format.as_str()}),
            SchemaType::Integer => json!({"type": "integer"}),
            SchemaType::Number => json!({"type": "number"}),
            SchemaType::Boolean => json!({"type": "boolean"}),
            SchemaType::Object => json!({"type": "object"}),
            SchemaType::Array { items } => json!({"type": "array", "items": items.to_property()}),
            SchemaType::Geometry(kind) => json!({"$ref": kind.schema_ref()}),
            SchemaType::Meta(meta) => json!({"$ref": meta.schema_ref()}),
        }
    }

    /// Storage type for this schema type, with geometries in the given SRID
    pub fn to_storage_type(&self, srid: u32) -> StorageType {
        match self {
            SchemaType::String { format: None } => StorageType::Varchar,
            SchemaType::String {
                format: Some(StringFormat::Date),
            } => StorageType::Date,
            SchemaType::String {
                format: Some(StringFormat::DateTime),
            } => StorageType::Timestamp,
            SchemaType::String {
                format: Some(StringFormat::Time),
            } => StorageType::Time,
            SchemaType::Integer => StorageType::Integer,
            SchemaType::Number => StorageType::Numeric,
            SchemaType::Boolean => StorageType::Boolean,
            SchemaType::Object => StorageType::Text,
            SchemaType::Array { items } => StorageType::Array(Box::new(items.to_storage_type(srid))),
            SchemaType::Geometry(kind) => StorageType::Geometry { kind: *kind, srid },
            SchemaType::Meta(_) => StorageType::Varchar,
        }
    }
}

/// Column type in relational storage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageType {
    Varchar,
    Text,
    Integer,
    SmallInt,
    BigInt,
    Numeric,
    Float,
    Boolean,
    Date,
    Time,
    Timestamp,
    Array(Box<StorageType>),
    Geometry { kind: GeometryKind, srid: u32 },
}

impl StorageType {
    /// Type class as reported by an inspection collaborator
    pub fn type_class(&self) -> &'static str {
        match self {
            StorageType::Varchar => "VARCHAR",
            StorageType::Text => "TEXT",
            StorageType::Integer => "INTEGER",
            StorageType::SmallInt => "SMALLINT",
            StorageType::BigInt => "BIGINT",
            StorageType::Numeric => "NUMERIC",
            StorageType::Float => "FLOAT",
            StorageType::Boolean => "BOOLEAN",
            StorageType::Date => "DATE",
            StorageType::Time => "TIME",
            StorageType::Timestamp => "TIMESTAMP",
            StorageType::Array(_) => "ARRAY",
            StorageType::Geometry { .. } => "GEOMETRY",
        }
    }

    /// Sub-type reported next to the type class: the item type class of an
    /// array, the shape of a geometry
    pub fn sub_type(&self) -> Option<&'static str> {
        match self {
            StorageType::Array(items) => Some(items.type_class()),
            StorageType::Geometry { kind, .. } => Some(kind.sql_name()),
            _ => None,
        }
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self, StorageType::Geometry { .. })
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Array(items) => write!(f, "{items}[]"),
            StorageType::Geometry { kind, srid } => write!(f, "geometry({},{srid})", kind.sql_name()),
            other => write!(f, "{}", other.type_class()),
        }
    }
}

/// Storage type for a schema type token, geometries in [`DEFAULT_SRID`]
///
/// # Example
///
/// ```rust
/// use schema_tools::typemap::{schema_type_to_storage_type, StorageType};
///
/// assert_eq!(schema_type_to_storage_type("date").unwrap(), StorageType::Date);
/// assert_eq!(
///     schema_type_to_storage_type("https://geojson.org/schema/Point.json").unwrap().to_string(),
///     "geometry(POINT,28992)"
/// );
/// assert!(schema_type_to_storage_type("interval").is_err());
/// ```
pub fn schema_type_to_storage_type(token: &str) -> SchemaResult<StorageType> {
    Ok(SchemaType::from_token(token)?.to_storage_type(DEFAULT_SRID))
}

/// Schema type for a storage type class
///
/// `sub_type` is the item type class for `ARRAY` columns (strings when
/// absent) and the shape for `GEOMETRY` columns. A shape without an entry
/// in the map resolves to the generic geometry.
pub fn storage_type_to_schema_type(
    type_class: &str,
    sub_type: Option<&str>,
) -> SchemaResult<SchemaType> {
    let class = normalize_type_class(type_class);

    if class == "ARRAY" {
        let items = match sub_type {
            Some(item_class) => storage_type_to_schema_type(item_class, None)?,
            None => SchemaType::string(),
        };
        return Ok(SchemaType::array(items));
    }

    let schema_type = STORAGE_TO_SCHEMA
        .get(class.as_str())
        .cloned()
        .ok_or_else(|| SchemaError::unknown_type(type_class))?;

    if schema_type == SchemaType::Geometry(GeometryKind::Geometry)
        && let Some(shape) = sub_type
    {
        return Ok(SchemaType::Geometry(
            GeometryKind::from_sql_name(shape).unwrap_or(GeometryKind::Geometry),
        ));
    }

    Ok(schema_type)
}

fn normalize_type_class(type_class: &str) -> String {
    let base = TYPE_CLASS_REGEX
        .captures(type_class)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
        .unwrap_or(type_class);
    base.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_primitives() {
        assert_eq!(schema_type_to_storage_type("string").unwrap(), StorageType::Varchar);
        assert_eq!(schema_type_to_storage_type("integer").unwrap(), StorageType::Integer);
        assert_eq!(schema_type_to_storage_type("number").unwrap(), StorageType::Numeric);
        assert_eq!(schema_type_to_storage_type("boolean").unwrap(), StorageType::Boolean);
        assert_eq!(schema_type_to_storage_type("object").unwrap(), StorageType::Text);
        assert_eq!(schema_type_to_storage_type("date-time").unwrap(), StorageType::Timestamp);
        assert_eq!(schema_type_to_storage_type("time").unwrap(), StorageType::Time);
        assert_eq!(
            schema_type_to_storage_type("array").unwrap().to_string(),
            "VARCHAR[]"
        );
    }

    #[test]
    fn test_forward_refs() {
        assert_eq!(
            schema_type_to_storage_type("https://geojson.org/schema/MultiPolygon.json").unwrap(),
            StorageType::Geometry {
                kind: GeometryKind::MultiPolygon,
                srid: DEFAULT_SRID
            }
        );
        assert_eq!(
            schema_type_to_storage_type(&MetaRef::Id.schema_ref()).unwrap(),
            StorageType::Varchar
        );
        assert!(matches!(
            schema_type_to_storage_type("https://geojson.org/schema/Circle.json"),
            Err(SchemaError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_reverse_lookup() {
        assert_eq!(
            storage_type_to_schema_type("date", None).unwrap(),
            SchemaType::String {
                format: Some(StringFormat::Date)
            }
        );
        assert_eq!(storage_type_to_schema_type("SMALLINT", None).unwrap(), SchemaType::Integer);
        assert_eq!(storage_type_to_schema_type("TEXT", None).unwrap(), SchemaType::string());
        assert_eq!(
            storage_type_to_schema_type("VARCHAR(255)", None).unwrap(),
            SchemaType::string()
        );
        assert_eq!(
            storage_type_to_schema_type("numeric(10, 2)", None).unwrap(),
            SchemaType::Number
        );
        assert!(matches!(
            storage_type_to_schema_type("INTERVAL", None),
            Err(SchemaError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_reverse_arrays() {
        assert_eq!(
            storage_type_to_schema_type("ARRAY", None).unwrap(),
            SchemaType::array(SchemaType::string())
        );
        assert_eq!(
            storage_type_to_schema_type("ARRAY", Some("INTEGER")).unwrap(),
            SchemaType::array(SchemaType::Integer)
        );
        assert!(storage_type_to_schema_type("ARRAY", Some("INTERVAL")).is_err());
    }

    #[test]
    fn test_reverse_geometry_sub_types() {
        assert_eq!(
            storage_type_to_schema_type("GEOMETRY", Some("POINT")).unwrap(),
            SchemaType::Geometry(GeometryKind::Point)
        );
        assert_eq!(
            storage_type_to_schema_type("Geometry", Some("CURVEPOLYGON")).unwrap(),
            SchemaType::Geometry(GeometryKind::Geometry)
        );
        assert_eq!(
            storage_type_to_schema_type("MULTIPOLYGON", None).unwrap(),
            SchemaType::Geometry(GeometryKind::MultiPolygon)
        );
    }

    #[test]
    fn test_property_round_trip() {
        let types = [
            SchemaType::string(),
            SchemaType::String {
                format: Some(StringFormat::Date),
            },
            SchemaType::Integer,
            SchemaType::Object,
            SchemaType::array(SchemaType::Number),
            SchemaType::Geometry(GeometryKind::Polygon),
            SchemaType::Meta(MetaRef::Schema),
        ];
        for schema_type in types {
            let property = schema_type.to_property();
            assert_eq!(SchemaType::from_property(&property).unwrap(), schema_type);
        }
    }

    #[test]
    fn test_from_property_edge_cases() {
        let uri = json!({"type": "string", "format": "uri"});
        assert_eq!(SchemaType::from_property(&uri).unwrap(), SchemaType::string());

        let relation = json!({"type": "string", "relation": "gebieden:buurten"});
        assert_eq!(SchemaType::from_property(&relation).unwrap(), SchemaType::string());

        assert!(SchemaType::from_property(&json!({"description": "x"})).is_err());
    }

    #[test]
    fn test_storage_type_display() {
        assert_eq!(StorageType::Date.to_string(), "DATE");
        assert_eq!(
            StorageType::Geometry {
                kind: GeometryKind::Point,
                srid: 4326
            }
            .to_string(),
            "geometry(POINT,4326)"
        );
        assert_eq!(
            StorageType::Array(Box::new(StorageType::Integer)).to_string(),
            "INTEGER[]"
        );
    }
}
