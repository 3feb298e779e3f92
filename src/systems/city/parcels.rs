use bevy::log::debug;
use bevy::math::DVec2;

use crate::config::*;
use crate::systems::geometry::utils::{envelope, intersect_polygons, polygon_area};
use crate::systems::geometry::{Envelope, Polygon};

use super::phase::{Parceled, Roads};
use super::polygonize::polygonize;
use super::{CityDataModel, LineSegment, Parcel};

/// How a block is cut into parcels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdivisionStrategy {
    /// Recursive halving along the longer envelope axis.
    RecursiveObb,
    /// Irregular blocks have no subdivision algorithm yet, the block is its own parcel.
    Passthrough,
}

impl SubdivisionStrategy {
    /// Picks a strategy by the block's regularity.
    ///
    /// A block is regular when its envelope aspect ratio lies strictly inside
    /// `(REGULAR_ASPECT_MIN, REGULAR_ASPECT_MAX)` and it has at most `REGULAR_MAX_VERTICES` vertices.
    pub fn for_block(block: &[DVec2]) -> Self {
        let Some(env) = envelope(block) else {
            return Self::Passthrough;
        };
        if env.height() <= 0.0 {
            return Self::Passthrough;
        }

        let aspect = env.width() / env.height();
        let regular = aspect > REGULAR_ASPECT_MIN && aspect < REGULAR_ASPECT_MAX && block.len() <= REGULAR_MAX_VERTICES;

        if regular { Self::RecursiveObb } else { Self::Passthrough }
    }

    pub fn subdivide(self, block: &Polygon) -> Vec<Polygon> {
        match self {
            Self::RecursiveObb => {
                let mut plots = Vec::new();
                subdivide_to_plots(block, 0, &mut plots);
                plots
            }
            Self::Passthrough => vec![block.clone()],
        }
    }
}

/// Recursively halves a polygon along the longer axis of its envelope
///
/// Recursion stops and the polygon is emitted whole once its area is at most `PARCEL_MIN_AREA`
/// (within `AREA_TOLERANCE`, relative) or `depth` exceeds `PARCEL_MAX_DEPTH`. Halves whose intersection with the polygon is empty or
/// falls apart into several pieces are dropped.
pub fn subdivide_to_plots(polygon: &Polygon, depth: usize, plots: &mut Vec<Polygon>) {
    // constrain depth
    if depth > PARCEL_MAX_DEPTH {
        plots.push(polygon.clone());
        return;
    }

    // exit if too small
    if polygon_area(polygon).abs() <= PARCEL_MIN_AREA * (1.0 + AREA_TOLERANCE) {
        plots.push(polygon.clone());
        return;
    }

    let Some(env) = envelope(polygon) else {
        return;
    };

    for half in split_envelope(&env) {
        let mut parts = intersect_polygons(polygon, &half);
        if parts.len() == 1 {
            if let Some(part) = parts.pop() {
                subdivide_to_plots(&part, depth + 1, plots);
            }
        }
    }
}

/// Cut an envelope in two at the midpoint of its longer axis
///
/// # Returns
/// The two half-rectangles, counter-clockwise
fn split_envelope(env: &Envelope) -> [Polygon; 2] {
    let mid = env.center();

    let (first, second) = if env.width() > env.height() {
        (
            Envelope { min: env.min, max: DVec2::new(mid.x, env.max.y) },
            Envelope { min: DVec2::new(mid.x, env.min.y), max: env.max },
        )
    } else {
        (
            Envelope { min: env.min, max: DVec2::new(env.max.x, mid.y) },
            Envelope { min: DVec2::new(env.min.x, mid.y), max: env.max },
        )
    };

    [first.to_polygon(), second.to_polygon()]
}

/// Polygonizes the roads into blocks and subdivides every block.
///
/// # Returns
/// The flattened leaf parcels, none of them classified yet. Empty for an empty or
/// degenerate network.
pub fn parcels_from_roads(roads: &[LineSegment]) -> Vec<Parcel> {
    let blocks = polygonize(roads);

    let parcels: Vec<Parcel> = blocks
        .iter()
        .flat_map(|block| SubdivisionStrategy::for_block(block).subdivide(block))
        .map(Parcel::new)
        .collect();

    debug!("{} blocks subdivided into {} parcels", blocks.len(), parcels.len());
    parcels
}

/// Parcel stage: replaces the model's parcels with the subdivided blocks of its road network.
pub fn generate_parcels(model: CityDataModel<Roads>) -> CityDataModel<Parceled> {
    let parcels = parcels_from_roads(model.road_network());
    model.with_parcels(parcels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::city::RoadType;

    fn rect_roads_at(lon: f64, lat: f64, w: f64, h: f64) -> Vec<LineSegment> {
        let (x2, y2) = (lon + w, lat + h);
        vec![
            LineSegment::new(lon, lat, x2, lat, RoadType::Secondary),
            LineSegment::new(x2, lat, x2, y2, RoadType::Secondary),
            LineSegment::new(x2, y2, lon, y2, RoadType::Secondary),
            LineSegment::new(lon, y2, lon, lat, RoadType::Secondary),
        ]
    }

    fn rect_roads(w: f64, h: f64) -> Vec<LineSegment> {
        rect_roads_at(0.0, 0.0, w, h)
    }

    fn total_area(parcels: &[Parcel]) -> f64 {
        parcels.iter().map(|p| polygon_area(&p.shape).abs()).sum()
    }

    // boolean ops through geo drift by a few ulps per cut
    fn assert_area(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-6 * expected.abs(),
            "area {actual} differs from {expected}"
        );
    }

    #[test]
    fn block_at_threshold_area_is_one_parcel() {
        let model = generate_parcels(CityDataModel::new(rect_roads(0.01, 0.01)));
        assert_eq!(model.parcels().len(), 1);
        assert!(model.parcels()[0].land_use.is_none());
        assert_area(total_area(model.parcels()), 0.0001);
    }

    #[test]
    fn threshold_block_away_from_the_origin_is_one_parcel() {
        for (lon, lat) in [(2.30, 48.82), (0.01, 0.01), (-74.01, 40.70), (139.69, 35.68)] {
            let parcels = parcels_from_roads(&rect_roads_at(lon, lat, 0.01, 0.01));
            assert_eq!(parcels.len(), 1, "block at ({lon}, {lat}) was split");
            assert_area(total_area(&parcels), 0.0001);
        }
    }

    #[test]
    fn larger_regular_block_is_split_and_keeps_its_area() {
        let parcels = parcels_from_roads(&rect_roads(0.04, 0.04));
        assert!(parcels.len() > 1);
        assert_area(total_area(&parcels), 0.0016);
        for parcel in &parcels {
            assert!(polygon_area(&parcel.shape).abs() <= PARCEL_MIN_AREA * (1.0 + 1e-6));
        }
    }

    #[test]
    fn elongated_block_passes_through() {
        let parcels = parcels_from_roads(&rect_roads(0.3, 0.01));
        assert_eq!(parcels.len(), 1);
        assert_area(total_area(&parcels), 0.003);
    }

    #[test]
    fn strategy_follows_regularity() {
        let square = Envelope { min: DVec2::ZERO, max: DVec2::ONE }.to_polygon();
        assert_eq!(SubdivisionStrategy::for_block(&square), SubdivisionStrategy::RecursiveObb);

        let wide = Envelope { min: DVec2::ZERO, max: DVec2::new(2.0, 1.0) }.to_polygon();
        assert_eq!(SubdivisionStrategy::for_block(&wide), SubdivisionStrategy::Passthrough);

        // regular aspect but too many vertices
        let heptagon: Polygon = (0..7)
            .map(|i| {
                let a = i as f64 / 7.0 * std::f64::consts::TAU;
                DVec2::new(a.cos(), a.sin())
            })
            .collect();
        assert_eq!(SubdivisionStrategy::for_block(&heptagon), SubdivisionStrategy::Passthrough);
    }

    #[test]
    fn recursion_depth_is_bounded() {
        // huge block, the area test alone would never stop it
        let block = Envelope { min: DVec2::ZERO, max: DVec2::splat(100.0) }.to_polygon();
        let mut plots = Vec::new();
        subdivide_to_plots(&block, 0, &mut plots);

        // depths 0..=4 split, depth 5 emits: 2^5 leaves
        assert_eq!(plots.len(), 1 << (PARCEL_MAX_DEPTH + 1));
        let area: f64 = plots.iter().map(|p| polygon_area(p).abs()).sum();
        assert_area(area, 10_000.0);
    }

    #[test]
    fn regenerating_keeps_total_area() {
        let mut roads = rect_roads(0.05, 0.04);
        roads.push(LineSegment::new(0.02, 0.0, 0.02, 0.04, RoadType::Primary));

        let first = generate_parcels(CityDataModel::new(roads));
        let first_area = total_area(first.parcels());
        let second = generate_parcels(first.into_roads());

        // same roads, same cuts
        assert!((first_area - total_area(second.parcels())).abs() <= 1e-12 * first_area);
        assert_area(first_area, 0.002);
    }

    #[test]
    fn open_or_empty_networks_give_no_parcels() {
        assert!(parcels_from_roads(&[]).is_empty());
        let dangling = vec![
            LineSegment::new(0.0, 0.0, 1.0, 0.0, RoadType::Secondary),
            LineSegment::new(1.0, 0.0, 1.0, 1.0, RoadType::Secondary),
        ];
        assert!(parcels_from_roads(&dangling).is_empty());
    }
}
