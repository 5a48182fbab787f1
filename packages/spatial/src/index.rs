//! R-tree index over the active parent polygons of one level.
//!
//! Every query is pre-filtered by bounding box before the exact `geo`
//! predicate runs, so thousands of candidates stay cheap. Query results
//! are returned in ascending parent-id order.

use geo::{Contains, Distance, Euclidean, Intersects, MultiPolygon, Point};
use rstar::{AABB, Envelope, PointDistance, RTree, RTreeObject};

/// A parent polygon stored in the R-tree.
#[derive(Debug, Clone)]
pub struct IndexedParent {
    /// Parent unit id.
    pub id: i64,
    /// Parent boundary.
    pub geometry: MultiPolygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl IndexedParent {
    /// Exact planar distance from `point` to this parent's boundary, or
    /// `0.0` if the parent contains it.
    #[must_use]
    pub fn distance_to(&self, point: &Point<f64>) -> f64 {
        if self.geometry.contains(point) {
            return 0.0;
        }
        self.geometry
            .0
            .iter()
            .map(|polygon| Euclidean.distance(point, polygon))
            .fold(f64::INFINITY, f64::min)
    }
}

impl RTreeObject for IndexedParent {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for IndexedParent {
    /// Squared distance to the bounding box. A lower bound on the squared
    /// distance to the polygon itself.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        Envelope::distance_2(&self.envelope, point)
    }
}

/// Spatial index of candidate parents for one level pass.
pub struct SpatialIndex {
    tree: RTree<IndexedParent>,
}

impl SpatialIndex {
    /// Builds the index by bulk-loading `(parent id, geometry)` pairs.
    #[must_use]
    pub fn build(candidates: impl IntoIterator<Item = (i64, MultiPolygon<f64>)>) -> Self {
        let entries: Vec<IndexedParent> = candidates
            .into_iter()
            .map(|(id, geometry)| IndexedParent {
                id,
                envelope: crate::compute_envelope(&geometry),
                geometry,
            })
            .collect();

        log::debug!("Indexing {} parent polygons", entries.len());

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed parents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no parents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Parents whose geometry intersects `geometry`.
    #[must_use]
    pub fn query_intersecting(&self, geometry: &MultiPolygon<f64>) -> Vec<&IndexedParent> {
        let envelope = crate::compute_envelope(geometry);
        let mut hits: Vec<&IndexedParent> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|entry| entry.geometry.intersects(geometry))
            .collect();
        hits.sort_by_key(|entry| entry.id);
        hits
    }

    /// Parents whose geometry strictly contains `point`.
    #[must_use]
    pub fn query_containing(&self, point: &Point<f64>) -> Vec<&IndexedParent> {
        let envelope = AABB::from_point([point.x(), point.y()]);
        let mut hits: Vec<&IndexedParent> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|entry| entry.geometry.contains(point))
            .collect();
        hits.sort_by_key(|entry| entry.id);
        hits
    }

    /// The parent whose geometry is closest to `point`, with its distance.
    ///
    /// Walks candidates in bounding-box distance order and stops once the
    /// box distance exceeds the best exact distance found. Parents within
    /// `tie_tolerance` of the best distance tie, and the lowest id wins.
    #[must_use]
    pub fn query_nearest(
        &self,
        point: &Point<f64>,
        tie_tolerance: f64,
    ) -> Option<(&IndexedParent, f64)> {
        let mut best: Option<(&IndexedParent, f64)> = None;

        for (entry, box_distance_2) in self
            .tree
            .nearest_neighbor_iter_with_distance_2(&[point.x(), point.y()])
        {
            if let Some((_, best_distance)) = best
                && box_distance_2.sqrt() > best_distance + tie_tolerance
            {
                break;
            }

            let distance = entry.distance_to(point);
            best = match best {
                None => Some((entry, distance)),
                Some((current, current_distance)) => {
                    if distance < current_distance - tie_tolerance
                        || (distance <= current_distance + tie_tolerance && entry.id < current.id)
                    {
                        Some((entry, distance))
                    } else {
                        Some((current, current_distance))
                    }
                }
            };
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::rect;

    fn three_strips() -> SpatialIndex {
        SpatialIndex::build([
            (1, rect(0.0, 0.0, 10.0, 10.0)),
            (2, rect(10.0, 0.0, 20.0, 10.0)),
            (3, rect(20.0, 0.0, 30.0, 10.0)),
        ])
    }

    #[test]
    fn reports_size() {
        let index = three_strips();
        assert_eq!(index.len(), 3);
        assert!(!index.is_empty());
        assert!(SpatialIndex::build([]).is_empty());
    }

    #[test]
    fn intersecting_excludes_bbox_only_hits() {
        let index = SpatialIndex::build([
            (5, rect(0.0, 0.0, 10.0, 10.0)),
            (4, rect(8.0, 8.0, 9.0, 9.0)),
        ]);
        let hits = index.query_intersecting(&rect(7.0, 7.0, 12.0, 12.0));
        let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![4, 5]);

        let far = index.query_intersecting(&rect(50.0, 50.0, 51.0, 51.0));
        assert!(far.is_empty());
    }

    #[test]
    fn containing_finds_enclosing_parent() {
        let index = three_strips();
        let hits = index.query_containing(&Point::new(15.0, 5.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
        assert!(index.query_containing(&Point::new(15.0, 50.0)).is_empty());
    }

    #[test]
    fn nearest_uses_exact_distance() {
        let index = three_strips();
        let (nearest, distance) = index.query_nearest(&Point::new(33.0, 5.0), 0.0).unwrap();
        assert_eq!(nearest.id, 3);
        assert!((distance - 3.0).abs() < 1e-9);
    }

    #[test]
    fn nearest_breaks_ties_by_lowest_id() {
        let index = SpatialIndex::build([
            (9, rect(0.0, 0.0, 1.0, 1.0)),
            (2, rect(3.0, 0.0, 4.0, 1.0)),
        ]);
        let (nearest, _) = index.query_nearest(&Point::new(2.0, 0.5), 1e-12).unwrap();
        assert_eq!(nearest.id, 2);
    }

    #[test]
    fn nearest_on_empty_index_is_none() {
        assert!(SpatialIndex::build([]).query_nearest(&Point::new(0.0, 0.0), 0.0).is_none());
    }
}
