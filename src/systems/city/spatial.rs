// read-only R-tree over the road network, built once per generation pass
use bevy::math::DVec2;
use rstar::primitives::{GeomWithData, Line};
use rstar::{AABB, RTree};

use crate::systems::geometry::Envelope;
use crate::systems::geometry::utils::{envelope, polygon_to_segment_distance};

use super::{LineSegment, RoadType};

pub type RoadEntry = GeomWithData<Line<[f64; 2]>, RoadType>;

pub struct RoadIndex {
    tree: RTree<RoadEntry>,
}

impl RoadIndex {
    pub fn build(roads: &[LineSegment]) -> Self {
        let entries = roads
            .iter()
            .map(|road| {
                let (a, b) = (road.start(), road.end());
                GeomWithData::new(Line::new([a.x, a.y], [b.x, b.y]), road.road_type())
            })
            .collect();

        Self { tree: RTree::bulk_load(entries) }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Roads whose envelope intersects `window` grown by `buffer` on every side.
    pub fn query(&self, window: &Envelope, buffer: f64) -> impl Iterator<Item = &RoadEntry> {
        let grown = window.expanded(buffer);
        let aabb = AABB::from_corners([grown.min.x, grown.min.y], [grown.max.x, grown.max.y]);
        self.tree.locate_in_envelope_intersecting(&aabb)
    }

    /// Minimum distance from `polygon` to any road and to any primary road, considering only
    /// roads near the polygon's envelope.
    ///
    /// # Returns
    /// `(min_any, min_primary)`, each `f64::INFINITY` when no such road is in range.
    pub fn nearest_distances(&self, polygon: &[DVec2], buffer: f64) -> (f64, f64) {
        let Some(env) = envelope(polygon) else {
            return (f64::INFINITY, f64::INFINITY);
        };

        let mut min_any = f64::INFINITY;
        let mut min_primary = f64::INFINITY;

        for entry in self.query(&env, buffer) {
            let line = entry.geom();
            let from = DVec2::from_array(line.from);
            let to = DVec2::from_array(line.to);
            let dist = polygon_to_segment_distance(polygon, from, to);

            min_any = min_any.min(dist);
            if entry.data == RoadType::Primary {
                min_primary = min_primary.min(dist);
            }
        }

        (min_any, min_primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square_at(x: f64, y: f64) -> Vec<DVec2> {
        Envelope { min: DVec2::new(x, y), max: DVec2::new(x + 1.0, y + 1.0) }.to_polygon()
    }

    fn index() -> RoadIndex {
        RoadIndex::build(&[
            LineSegment::new(0.0, -0.5, 10.0, -0.5, RoadType::Secondary),
            LineSegment::new(-2.0, 0.0, -2.0, 10.0, RoadType::Primary),
            LineSegment::new(50.0, 50.0, 60.0, 50.0, RoadType::Primary),
        ])
    }

    #[test]
    fn query_respects_buffer() {
        let idx = index();
        assert_eq!(idx.len(), 3);
        let window = Envelope { min: DVec2::new(0.0, 0.0), max: DVec2::new(1.0, 1.0) };
        assert_eq!(idx.query(&window, 0.0).count(), 0);
        assert_eq!(idx.query(&window, 0.6).count(), 1);
        assert_eq!(idx.query(&window, 2.5).count(), 2);
    }

    #[test]
    fn nearest_distances_split_by_road_type() {
        let idx = index();
        let (any, primary) = idx.nearest_distances(&unit_square_at(0.0, 0.0), 3.0);
        assert!((any - 0.5).abs() < 1e-12);
        assert!((primary - 2.0).abs() < 1e-12);
    }

    #[test]
    fn nothing_in_range_is_infinite() {
        let idx = index();
        let (any, primary) = idx.nearest_distances(&unit_square_at(20.0, 20.0), 0.01);
        assert_eq!(any, f64::INFINITY);
        assert_eq!(primary, f64::INFINITY);
    }

    #[test]
    fn road_through_parcel_is_zero_distance() {
        let idx = RoadIndex::build(&[LineSegment::new(0.5, -1.0, 0.5, 2.0, RoadType::Primary)]);
        assert_eq!(idx.nearest_distances(&unit_square_at(0.0, 0.0), 0.01), (0.0, 0.0));
    }
}
