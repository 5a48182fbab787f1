#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial building blocks for hierarchy reconciliation.
//!
//! - [`validate`] rejects missing, malformed, and topologically invalid
//!   polygon geometry before it reaches any spatial predicate.
//! - [`index`] holds the active parent polygons of one level in an
//!   R-tree so matching never degrades to a pairwise scan.
//! - [`matcher`] resolves a child polygon to a single parent through the
//!   intersection, centroid-containment, and nearest tiers.

pub mod index;
pub mod matcher;
pub mod validate;

use geo::MultiPolygon;
use geojson::GeoJson;
use rstar::AABB;
use thiserror::Error;

pub use index::{IndexedParent, SpatialIndex};
pub use matcher::{ParentMatch, match_parent};
pub use validate::{InvalidGeometry, validate};

/// Errors raised while decoding stored geometry.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// The text is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The geometry is not a polygon or multi-polygon.
    #[error("Unsupported geometry type: {geometry_type}")]
    UnsupportedType {
        /// The offending `GeoJSON` type name.
        geometry_type: String,
    },
}

/// Parses a stored `GeoJSON` geometry string into a [`MultiPolygon`].
///
/// Polygons are promoted to single-member multi-polygons.
///
/// # Errors
///
/// Returns [`SpatialError`] if the text is not `GeoJSON` or is not
/// polygonal.
pub fn parse_multipolygon(geojson_str: &str) -> Result<MultiPolygon<f64>, SpatialError> {
    let geojson: GeoJson = geojson_str.parse()?;
    let geometry = match geojson {
        GeoJson::Geometry(geometry) => geometry,
        GeoJson::Feature(feature) => feature.geometry.ok_or_else(|| SpatialError::UnsupportedType {
            geometry_type: "null".to_string(),
        })?,
        GeoJson::FeatureCollection(_) => {
            return Err(SpatialError::UnsupportedType {
                geometry_type: "FeatureCollection".to_string(),
            });
        }
    };
    let type_name = value_type_name(&geometry.value).to_string();
    let geo_geom: geo::Geometry<f64> = geometry.try_into()?;
    into_multipolygon(geo_geom).ok_or(SpatialError::UnsupportedType {
        geometry_type: type_name,
    })
}

/// `GeoJSON` type name of a geometry value.
#[must_use]
pub const fn value_type_name(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Narrows a geometry to a [`MultiPolygon`], or `None` if it is not
/// polygonal.
#[must_use]
pub fn into_multipolygon(geometry: geo::Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
#[must_use]
pub fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    use geo::BoundingRect;

    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
pub(crate) mod fixtures {
    use geo::{MultiPolygon, Polygon, polygon};

    /// Axis-aligned rectangle as a single-member multi-polygon.
    pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![rect_polygon(min_x, min_y, max_x, max_y)])
    }

    pub fn rect_polygon(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
        polygon![
            (x: min_x, y: min_y),
            (x: max_x, y: min_y),
            (x: max_x, y: max_y),
            (x: min_x, y: max_y),
            (x: min_x, y: min_y),
        ]
    }
}
