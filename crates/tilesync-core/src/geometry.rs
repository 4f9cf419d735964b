//! Bounding boxes and the few geometry checks the seeder needs.
//!
//! No spatial computation happens here beyond padding and union of
//! axis-aligned boxes; real geometry work stays in the database.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Padding applied around cluster extents unless configured otherwise.
pub const DEFAULT_PADDING: f64 = 50_000.0;

#[derive(Debug, Error, PartialEq)]
#[error("invalid bounding box `{0}`")]
pub struct BBoxParseError(pub String);

/// Axis-aligned bounding box, serialized as `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self {
            min_x: v[0],
            min_y: v[1],
            max_x: v[2],
            max_y: v[3],
        }
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.min_x, b.min_y, b.max_x, b.max_y]
    }
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Grow the box symmetrically by `padding` map units on every side.
    pub fn padded(&self, padding: f64) -> Self {
        Self {
            min_x: self.min_x - padding,
            min_y: self.min_y - padding,
            max_x: self.max_x + padding,
            max_y: self.max_y + padding,
        }
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BBox) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Parse PostGIS `box2d` text output: `BOX(minx miny,maxx maxy)`.
    pub fn parse_box2d(s: &str) -> Result<Self, BBoxParseError> {
        let err = || BBoxParseError(s.to_string());
        let inner = s
            .trim()
            .strip_prefix("BOX(")
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(err)?;
        let (min, max) = inner.split_once(',').ok_or_else(err)?;
        let point = |p: &str| -> Result<(f64, f64), BBoxParseError> {
            let mut it = p.split_whitespace().map(str::parse::<f64>);
            match (it.next(), it.next(), it.next()) {
                (Some(Ok(x)), Some(Ok(y)), None) => Ok((x, y)),
                _ => Err(err()),
            }
        };
        let (min_x, min_y) = point(min)?;
        let (max_x, max_y) = point(max)?;
        Ok(Self::new(min_x, min_y, max_x, max_y))
    }
}

/// Whether a GeoJSON value carries no coordinates at all.
///
/// `null`, geometries with missing or empty `coordinates`, and empty
/// feature or geometry collections are all empty.
pub fn geojson_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(obj) => match obj.get("type").and_then(Value::as_str) {
            Some("FeatureCollection") => obj
                .get("features")
                .and_then(Value::as_array)
                .is_none_or(|fs| fs.iter().all(geojson_is_empty)),
            Some("Feature") => obj.get("geometry").is_none_or(geojson_is_empty),
            Some("GeometryCollection") => obj
                .get("geometries")
                .and_then(Value::as_array)
                .is_none_or(|gs| gs.iter().all(geojson_is_empty)),
            _ => obj.get("coordinates").is_none_or(coordinates_empty),
        },
        _ => true,
    }
}

fn coordinates_empty(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty() || items.iter().all(|item| match item {
            Value::Array(_) => coordinates_empty(item),
            Value::Number(_) => false,
            _ => true,
        }),
        _ => true,
    }
}
