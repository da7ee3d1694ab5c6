//! Geometry values
//!
//! Geometries enter the engine as GeoJSON objects or as (E)WKT text and
//! leave it towards storage as EWKT: `SRID=28992;POINT (1 2)`. GeoJSON is
//! read with the `geojson` crate and WKT with the `wkt` crate; this module
//! adds the `SRID=` prefix handling, a nesting limit applied before either
//! reader runs, and the WKT writer (the [`fmt::Display`] impl).

use std::fmt;

use geojson::Value as Shape;
use serde_json::Value;
use wkt::Wkt;
use wkt::types::{Coord, LineString, Polygon};

use crate::typemap::GeometryKind;

/// A coordinate tuple: x, y and optionally z and m
pub type Position = geojson::Position;

/// Deepest accepted nesting of parentheses (WKT) or arrays and objects
/// (GeoJSON)
pub const MAX_NESTING: usize = 128;

/// Errors raised while reading or checking geometries
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("WKT parse error: {0}")]
    Parse(String),
    #[error("Geometry is nested deeper than {limit} levels")]
    NestingTooDeep { limit: usize },
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("Invalid GeoJSON: {0}")]
    InvalidGeoJson(String),
}

/// A geometry value, held in its GeoJSON shape
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    shape: Shape,
}

impl From<Shape> for Geometry {
    fn from(shape: Shape) -> Self {
        Self { shape }
    }
}

impl Geometry {
    /// The GeoJSON shape of this value
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The GeoJSON sub-type of this value
    pub fn kind(&self) -> GeometryKind {
        match &self.shape {
            Shape::Point(_) => GeometryKind::Point,
            Shape::MultiPoint(_) => GeometryKind::MultiPoint,
            Shape::LineString(_) => GeometryKind::LineString,
            Shape::MultiLineString(_) => GeometryKind::MultiLineString,
            Shape::Polygon(_) => GeometryKind::Polygon,
            Shape::MultiPolygon(_) => GeometryKind::MultiPolygon,
            Shape::GeometryCollection(_) => GeometryKind::GeometryCollection,
        }
    }

    /// Read a GeoJSON geometry object and check its coordinates
    pub fn from_geojson(value: &Value) -> Result<Self, GeometryError> {
        if json_nesting_exceeds(value, MAX_NESTING) {
            return Err(GeometryError::NestingTooDeep { limit: MAX_NESTING });
        }
        let geometry: geojson::Geometry = serde_json::from_value(value.clone())
            .map_err(|e| GeometryError::InvalidGeoJson(e.to_string()))?;
        let geometry = Self::from(geometry.value);
        geometry.validate()?;
        Ok(geometry)
    }

    /// Render as a GeoJSON object
    pub fn to_geojson(&self) -> Value {
        serde_json::to_value(geojson::Geometry::new(self.shape.clone())).unwrap_or(Value::Null)
    }

    /// Read WKT or EWKT text, returning the SRID when one is given
    ///
    /// # Example
    ///
    /// ```rust
    /// use schema_tools::geometry::Geometry;
    ///
    /// let (srid, point) = Geometry::parse_ewkt("SRID=28992;POINT (1 2)").unwrap();
    /// assert_eq!(srid, Some(28992));
    /// assert_eq!(point.to_string(), "POINT (1 2)");
    /// ```
    pub fn parse_ewkt(text: &str) -> Result<(Option<u32>, Self), GeometryError> {
        let trimmed = text.trim();
        let (srid, body) = match trimmed.split_once(';') {
            Some((prefix, rest)) if prefix.trim().to_ascii_uppercase().starts_with("SRID=") => {
                let code = prefix.trim()[5..].trim();
                let srid = code
                    .parse::<u32>()
                    .map_err(|_| GeometryError::Parse(format!("invalid SRID '{code}'")))?;
                (Some(srid), rest.trim())
            }
            _ => (None, trimmed),
        };

        if wkt_nesting_exceeds(body, MAX_NESTING) {
            return Err(GeometryError::NestingTooDeep { limit: MAX_NESTING });
        }
        let parsed: Wkt<f64> = body
            .parse()
            .map_err(|e: &str| GeometryError::Parse(e.to_string()))?;

        let geometry = Self::from(shape_of(&parsed));
        geometry.validate()?;
        Ok((srid, geometry))
    }

    /// Read WKT text, ignoring any SRID prefix
    pub fn parse_wkt(text: &str) -> Result<Self, GeometryError> {
        Self::parse_ewkt(text).map(|(_, geometry)| geometry)
    }

    /// Render as EWKT in the given spatial reference
    pub fn to_ewkt(&self, srid: u32) -> String {
        format!("SRID={srid};{self}")
    }

    /// Check that every position has two to four finite coordinates, all
    /// of the same dimension
    pub fn validate(&self) -> Result<(), GeometryError> {
        let mut dimension = None;
        check_shape(&self.shape, &mut dimension)
    }

    fn dimension(&self) -> usize {
        first_position(&self.shape).map_or(2, Vec::len)
    }
}

fn check_shape(shape: &Shape, dimension: &mut Option<usize>) -> Result<(), GeometryError> {
    let mut check = |position: &Position| -> Result<(), GeometryError> {
        if !(2..=4).contains(&position.len()) {
            return Err(GeometryError::InvalidCoordinates(format!(
                "position has {} coordinates",
                position.len()
            )));
        }
        if position.iter().any(|c| !c.is_finite()) {
            return Err(GeometryError::InvalidCoordinates(
                "position is not finite".to_string(),
            ));
        }
        match *dimension {
            Some(expected) if expected != position.len() => Err(GeometryError::InvalidCoordinates(
                format!("mixed {expected} and {} dimensional positions", position.len()),
            )),
            _ => {
                *dimension = Some(position.len());
                Ok(())
            }
        }
    };

    match shape {
        Shape::Point(position) if position.is_empty() => Ok(()),
        Shape::Point(position) => check(position),
        Shape::MultiPoint(positions) | Shape::LineString(positions) => {
            positions.iter().try_for_each(check)
        }
        Shape::MultiLineString(lines) | Shape::Polygon(lines) => {
            lines.iter().flatten().try_for_each(check)
        }
        Shape::MultiPolygon(polygons) => polygons.iter().flatten().flatten().try_for_each(check),
        Shape::GeometryCollection(geometries) => geometries
            .iter()
            .try_for_each(|geometry| check_shape(&geometry.value, &mut None)),
    }
}

fn first_position(shape: &Shape) -> Option<&Position> {
    match shape {
        Shape::Point(position) => Some(position).filter(|p| !p.is_empty()),
        Shape::MultiPoint(positions) | Shape::LineString(positions) => positions.first(),
        Shape::MultiLineString(lines) | Shape::Polygon(lines) => lines.iter().flatten().next(),
        Shape::MultiPolygon(polygons) => polygons.iter().flatten().flatten().next(),
        Shape::GeometryCollection(_) => None,
    }
}

/// Whether a JSON value nests arrays and objects deeper than `limit`
fn json_nesting_exceeds(value: &Value, limit: usize) -> bool {
    let mut stack = vec![(value, 0usize)];
    while let Some((value, depth)) = stack.pop() {
        if depth > limit {
            return true;
        }
        match value {
            Value::Array(items) => stack.extend(items.iter().map(|item| (item, depth + 1))),
            Value::Object(map) => stack.extend(map.values().map(|item| (item, depth + 1))),
            _ => {}
        }
    }
    false
}

/// Whether WKT text nests parentheses deeper than `limit`
fn wkt_nesting_exceeds(text: &str, limit: usize) -> bool {
    let mut depth = 0usize;
    for byte in text.bytes() {
        match byte {
            b'(' => {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}

// M values are kept only next to a Z value, GeoJSON has no slot for a
// measure on its own
fn position(coord: &Coord<f64>) -> Position {
    let mut position = vec![coord.x, coord.y];
    if let Some(z) = coord.z {
        position.push(z);
        if let Some(m) = coord.m {
            position.push(m);
        }
    }
    position
}

fn line(line: &LineString<f64>) -> Vec<Position> {
    line.0.iter().map(position).collect()
}

fn rings(polygon: &Polygon<f64>) -> Vec<Vec<Position>> {
    polygon.0.iter().map(line).collect()
}

fn shape_of(parsed: &Wkt<f64>) -> Shape {
    match parsed {
        Wkt::Point(point) => Shape::Point(point.0.as_ref().map(position).unwrap_or_default()),
        Wkt::LineString(linestring) => Shape::LineString(line(linestring)),
        Wkt::Polygon(polygon) => Shape::Polygon(rings(polygon)),
        Wkt::MultiPoint(points) => Shape::MultiPoint(
            points
                .0
                .iter()
                .filter_map(|point| point.0.as_ref().map(position))
                .collect(),
        ),
        Wkt::MultiLineString(lines) => Shape::MultiLineString(lines.0.iter().map(line).collect()),
        Wkt::MultiPolygon(polygons) => Shape::MultiPolygon(polygons.0.iter().map(rings).collect()),
        Wkt::GeometryCollection(collection) => Shape::GeometryCollection(
            collection
                .0
                .iter()
                .map(|member| geojson::Geometry::new(shape_of(member)))
                .collect(),
        ),
    }
}

fn write_position(f: &mut fmt::Formatter<'_>, position: &Position) -> fmt::Result {
    for (i, coordinate) in position.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{coordinate}")?;
    }
    Ok(())
}

fn write_list<T>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    mut write_item: impl FnMut(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write_item(f, item)?;
    }
    write!(f, ")")
}

fn write_positions(f: &mut fmt::Formatter<'_>, positions: &[Position]) -> fmt::Result {
    write_list(f, positions, write_position)
}

impl fmt::Display for Geometry {
    /// Well-known text, e.g. `MULTIPOINT ((1 2), (3 4))` or `POINT Z (1 2 3)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.kind().sql_name();
        let empty = match &self.shape {
            Shape::Point(position) => position.is_empty(),
            Shape::MultiPoint(positions) | Shape::LineString(positions) => positions.is_empty(),
            Shape::MultiLineString(lines) | Shape::Polygon(lines) => lines.is_empty(),
            Shape::MultiPolygon(polygons) => polygons.is_empty(),
            Shape::GeometryCollection(geometries) => geometries.is_empty(),
        };
        if empty {
            return write!(f, "{tag} EMPTY");
        }

        match self.dimension() {
            3 => write!(f, "{tag} Z ")?,
            4 => write!(f, "{tag} ZM ")?,
            _ => write!(f, "{tag} ")?,
        }
        match &self.shape {
            Shape::Point(position) => {
                write!(f, "(")?;
                write_position(f, position)?;
                write!(f, ")")
            }
            Shape::LineString(positions) => write_positions(f, positions),
            Shape::MultiPoint(positions) => write_list(f, positions, |f, position| {
                write!(f, "(")?;
                write_position(f, position)?;
                write!(f, ")")
            }),
            Shape::MultiLineString(lines) | Shape::Polygon(lines) => {
                write_list(f, lines, |f, ring| write_positions(f, ring))
            }
            Shape::MultiPolygon(polygons) => write_list(f, polygons, |f, polygon| {
                write_list(f, polygon, |f, ring| write_positions(f, ring))
            }),
            Shape::GeometryCollection(geometries) => write_list(f, geometries, |f, geometry| {
                write!(f, "{}", Geometry::from(geometry.value.clone()))
            }),
        }
    }
}
