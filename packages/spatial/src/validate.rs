//! Geometry validation.
//!
//! A pure check run on every source feature before it may take part in
//! any spatial predicate. Rejections carry a human-readable reason for
//! the run summary.

use geo::{Area, MultiPolygon, Validation};

/// Why a geometry was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidGeometry {
    /// Human-readable reason, surfaced in run summaries.
    pub reason: String,
}

impl InvalidGeometry {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for InvalidGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Validates a raw `GeoJSON` geometry object.
///
/// Rejects geometry that is missing, structurally malformed (no type or
/// coordinate tree), not polygonal, has unclosed or too-short rings,
/// non-finite coordinates, zero area, or fails the `geo` validity
/// predicate (self-intersecting rings, holes outside shells, overlapping
/// members).
///
/// Ring closure is checked on the raw coordinates because converting to
/// `geo` types closes rings silently.
///
/// # Errors
///
/// Returns [`InvalidGeometry`] describing the first problem found.
pub fn validate(geometry: Option<&serde_json::Value>) -> Result<MultiPolygon<f64>, InvalidGeometry> {
    let value = match geometry {
        None | Some(serde_json::Value::Null) => {
            return Err(InvalidGeometry::new("missing geometry"));
        }
        Some(value) => value,
    };

    if !value.is_object() {
        return Err(InvalidGeometry::new("malformed geometry: not an object"));
    }
    if value.get("type").and_then(serde_json::Value::as_str).is_none() {
        return Err(InvalidGeometry::new("malformed geometry: missing type"));
    }
    if value.get("coordinates").is_none_or(serde_json::Value::is_null) {
        return Err(InvalidGeometry::new(
            "malformed geometry: missing coordinates",
        ));
    }

    let geometry = geojson::Geometry::from_json_value(value.clone())
        .map_err(|e| InvalidGeometry::new(format!("malformed geometry: {e}")))?;

    let rings: Vec<&geojson::LineStringType> = match &geometry.value {
        geojson::Value::Polygon(polygon) => polygon.iter().collect(),
        geojson::Value::MultiPolygon(polygons) => polygons.iter().flatten().collect(),
        other => {
            return Err(InvalidGeometry::new(format!(
                "unsupported geometry type: {}",
                crate::value_type_name(other)
            )));
        }
    };

    if rings.is_empty() {
        return Err(InvalidGeometry::new("empty geometry: no rings"));
    }
    for (i, ring) in rings.iter().enumerate() {
        check_ring(ring).map_err(|reason| InvalidGeometry::new(format!("ring {i}: {reason}")))?;
    }

    let geo_geom: geo::Geometry<f64> = geometry
        .try_into()
        .map_err(|e| InvalidGeometry::new(format!("malformed geometry: {e}")))?;
    let multi = crate::into_multipolygon(geo_geom)
        .ok_or_else(|| InvalidGeometry::new("unsupported geometry type"))?;

    if multi.unsigned_area() <= 0.0 {
        return Err(InvalidGeometry::new("zero-area geometry"));
    }

    multi
        .check_validation()
        .map_err(|e| InvalidGeometry::new(format!("invalid topology: {e}")))?;

    Ok(multi)
}

fn check_ring(ring: &[geojson::Position]) -> Result<(), String> {
    if ring.len() < 4 {
        return Err(format!("has {} positions, at least 4 required", ring.len()));
    }
    for position in ring {
        if position.len() < 2 {
            return Err("position with fewer than 2 ordinates".to_string());
        }
        if !position.iter().all(|v| v.is_finite()) {
            return Err("non-finite coordinate".to_string());
        }
    }
    let (Some(first), Some(last)) = (ring.first(), ring.last()) else {
        return Err("empty ring".to_string());
    };
    #[allow(clippy::float_cmp)]
    let closed = first[0] == last[0] && first[1] == last[1];
    if !closed {
        return Err("ring is not closed".to_string());
    }
    Ok(())
}
