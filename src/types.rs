//! Logical column types and runtime values.
//!
//! This module also re-exports the spatial value types from the
//! `geoscan-types` crate for convenience.
use geo::Geometry;
use std::cmp::Ordering;
use std::fmt;

pub use geoscan_types::bbox::BoundingBox2D;
pub use geoscan_types::entry::{Entry, RowId};

/// Logical type of a column, expression or function argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogicalType {
    Boolean,
    BigInt,
    Double,
    Varchar,
    Geometry,
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalType::Boolean => "BOOLEAN",
            LogicalType::BigInt => "BIGINT",
            LogicalType::Double => "DOUBLE",
            LogicalType::Varchar => "VARCHAR",
            LogicalType::Geometry => "GEOMETRY",
        };
        f.write_str(name)
    }
}

/// A single runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    BigInt(i64),
    Double(f64),
    Varchar(String),
    Geometry(Geometry<f64>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Type of the value; `None` for an untyped NULL.
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(LogicalType::Boolean),
            Value::BigInt(_) => Some(LogicalType::BigInt),
            Value::Double(_) => Some(LogicalType::Double),
            Value::Varchar(_) => Some(LogicalType::Varchar),
            Value::Geometry(_) => Some(LogicalType::Geometry),
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry<f64>> {
        match self {
            Value::Geometry(geometry) => Some(geometry),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// SQL-style comparison. Returns `None` when either side is NULL or the
    /// values are not comparable. Integers and doubles compare numerically.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::BigInt(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::BigInt(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Varchar(a), Value::Varchar(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::BigInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(value.to_string())
    }
}

impl From<Geometry<f64>> for Value {
    fn from(value: Geometry<f64>) -> Self {
        Value::Geometry(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::BigInt(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::Varchar(s) => write!(f, "'{}'", s),
            Value::Geometry(geometry) => {
                let kind = geometry_kind(geometry);
                match BoundingBox2D::from_geometry(geometry) {
                    Some(bbox) => write!(f, "{} {}", kind, bbox),
                    None => write!(f, "{} EMPTY", kind),
                }
            }
        }
    }
}

/// Upper-case geometry kind name, e.g. `POLYGON`.
pub fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "POINT",
        Geometry::Line(_) => "LINE",
        Geometry::LineString(_) => "LINESTRING",
        Geometry::Polygon(_) => "POLYGON",
        Geometry::MultiPoint(_) => "MULTIPOINT",
        Geometry::MultiLineString(_) => "MULTILINESTRING",
        Geometry::MultiPolygon(_) => "MULTIPOLYGON",
        Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
        Geometry::Rect(_) => "RECT",
        Geometry::Triangle(_) => "TRIANGLE",
    }
}
