use geo::{BoundingRect, Coord, MultiPoint, Point};
use serde_json::{json, Map, Value};
use thiserror::Error;

pub type Geometry = Map<String, Value>;

/// Checked in order; the first one found in an address wins.
pub const STREET_TYPES: [&str; 8] = [
    " Ave", " Rd", " St", " Pl", " Blvd", " Dr", " Pkwy", " Ln",
];

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("unsupported geometry type: {0:?}")]
    Unsupported(String),
    #[error("geometry has no outer ring points")]
    Empty,
    #[error("malformed coordinates: {0}")]
    Malformed(String),
}

/// Envelope of every outer ring point of a `MultiPolygon`, as a two point `MultiPoint`
/// (`[[min_lon, min_lat], [max_lon, max_lat]]`). Holes are ignored.
pub fn bounding_box(geometry: &Geometry) -> Result<Geometry, GeometryError> {
    let kind = geometry
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if kind != "MultiPolygon" {
        return Err(GeometryError::Unsupported(kind.to_string()));
    }

    let polygons: Vec<Vec<Vec<Vec<f64>>>> = match geometry.get("coordinates") {
        Some(x) => serde_json::from_value(x.clone())
            .map_err(|e| GeometryError::Malformed(e.to_string()))?,
        None => Vec::new(),
    };

    let mut points = Vec::new();
    for polygon in &polygons {
        let Some(outer) = polygon.first() else {
            continue;
        };
        for position in outer {
            points.push(Point::from(coord(position)?));
        }
    }

    let rect = MultiPoint::new(points)
        .bounding_rect()
        .ok_or(GeometryError::Empty)?;
    let (min, max) = (rect.min(), rect.max());

    Ok(as_map(json!({
        "type": "MultiPoint",
        "coordinates": [[min.x, min.y], [max.x, max.y]],
    })))
}

pub fn point_geometry(point: Point) -> Geometry {
    as_map(json!({
        "type": "Point",
        "coordinates": [point.x(), point.y()],
    }))
}

fn coord(position: &[f64]) -> Result<Coord, GeometryError> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(GeometryError::Malformed(format!(
            "position with {} values",
            position.len()
        ))),
    }
}

fn as_map(value: Value) -> Geometry {
    match value {
        Value::Object(x) => x,
        _ => Map::new(),
    }
}

/// Everything after the last occurrence of the first street type found in the
/// period-stripped address, or an empty string.
pub fn address_suffix(address: &str, street_types: &[&str]) -> String {
    let address = address.replace('.', "");
    for street_type in street_types {
        if let Some((_, suffix)) = address.rsplit_once(street_type) {
            return suffix.to_string();
        }
    }
    String::new()
}
