//! Tiered parent matching.
//!
//! Tiers run in a fixed order and each is only consulted when the one
//! before it produced no candidate:
//!
//! 1. [`Tier::Intersection`]: largest exact intersection area.
//! 2. [`Tier::Centroid`]: parent containing the child's centroid.
//! 3. [`Tier::Nearest`]: parent closest to the child's centroid.
//!
//! Every tier breaks ties by lowest parent id.

use geo::{Area, BooleanOps, Centroid, MultiPolygon};
use geo_hierarchy_models::Tier;

use crate::SpatialIndex;

/// Relative tolerance under which two intersection areas are considered
/// equal.
const AREA_TIE_EPSILON: f64 = 1e-9;

/// Absolute tolerance under which two nearest-tier distances are
/// considered equal.
const DISTANCE_TIE_EPSILON: f64 = 1e-12;

/// A resolved parent and the tier that resolved it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParentMatch {
    /// Chosen parent id.
    pub parent_id: i64,
    /// Tier that produced the match.
    pub tier: Tier,
    /// Intersection area for [`Tier::Intersection`], centroid distance for
    /// [`Tier::Nearest`], `0.0` for [`Tier::Centroid`].
    pub score: f64,
}

/// Resolves `child` to a single parent in `index`.
///
/// Returns `None` only when every tier is exhausted, which in practice
/// means the index is empty or the child has no centroid.
#[must_use]
pub fn match_parent(child: &MultiPolygon<f64>, index: &SpatialIndex) -> Option<ParentMatch> {
    if let Some(found) = match_by_intersection(child, index) {
        return Some(found);
    }

    let centroid = child.centroid()?;

    if let Some(parent) = index.query_containing(&centroid).first() {
        return Some(ParentMatch {
            parent_id: parent.id,
            tier: Tier::Centroid,
            score: 0.0,
        });
    }

    index
        .query_nearest(&centroid, DISTANCE_TIE_EPSILON)
        .map(|(parent, distance)| ParentMatch {
            parent_id: parent.id,
            tier: Tier::Nearest,
            score: distance,
        })
}

fn match_by_intersection(child: &MultiPolygon<f64>, index: &SpatialIndex) -> Option<ParentMatch> {
    let mut best: Option<(i64, f64)> = None;

    // Candidates arrive in ascending id order, so a tie keeps the
    // incumbent (lower id).
    for candidate in index.query_intersecting(child) {
        let area = child.intersection(&candidate.geometry).unsigned_area();
        if area <= 0.0 {
            continue;
        }

        match best {
            None => best = Some((candidate.id, area)),
            Some((best_id, best_area)) => {
                let tolerance = AREA_TIE_EPSILON * best_area.max(area);
                if area > best_area + tolerance
                    || ((area - best_area).abs() <= tolerance && candidate.id < best_id)
                {
                    best = Some((candidate.id, area));
                }
            }
        }
    }

    best.map(|(parent_id, area)| ParentMatch {
        parent_id,
        tier: Tier::Intersection,
        score: area,
    })
}
