// land-use classification: distance-weighted scores and a weighted random draw per parcel
use bevy::log::debug;
use bevy::math::DVec2;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::config::*;
use crate::systems::geometry::utils::{envelope, polygon_centroid};

use super::phase::{Classified, Parceled};
use super::spatial::RoadIndex;
use super::{CityDataModel, LandUse, LineSegment, Parcel, compute_pool};

/// Per-parcel random streams.
///
/// Each parcel gets its own generator keyed by its index, so classification gives the same
/// answer no matter how parcels are spread across worker threads.
pub trait RandomSource: Sync {
    type Rng: Rng;

    fn rng_for(&self, index: usize) -> Self::Rng;
}

/// Seeds parcel `i` with `seed + i`.
#[derive(Debug, Clone, Copy)]
pub struct SeededRandom(pub u64);

impl RandomSource for SeededRandom {
    type Rng = StdRng;

    fn rng_for(&self, index: usize) -> StdRng {
        StdRng::seed_from_u64(self.0.wrapping_add(index as u64))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandUseWeights {
    pub commercial: f64,
    pub residential: f64,
    pub industrial: f64,
    pub park: f64,
}

impl LandUseWeights {
    pub fn get(&self, land_use: LandUse) -> f64 {
        match land_use {
            LandUse::Commercial => self.commercial,
            LandUse::Residential => self.residential,
            LandUse::Industrial => self.industrial,
            LandUse::Park => self.park,
        }
    }

    pub fn total(&self) -> f64 {
        LandUse::ALL.iter().map(|&l| self.get(l)).sum()
    }
}

/// Center and radius of the road network, the reference frame for every parcel's score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkContext {
    pub centroid: DVec2,
    pub max_dist: f64,
}

impl NetworkContext {
    pub fn from_roads(roads: &[LineSegment]) -> Option<Self> {
        let points: Vec<DVec2> = roads.iter().flat_map(|r| [r.start(), r.end()]).collect();
        let env = envelope(&points)?;

        let centroid = env.center();
        let mut max_dist = centroid.distance(env.min);
        // near-point network
        if max_dist <= f64::EPSILON {
            max_dist = MIN_NETWORK_RADIUS;
        }

        Some(Self { centroid, max_dist })
    }
}

/// Scores the four land uses for one parcel
///
/// `min_road` and `min_primary` are the distances to the nearest road of any type and to the
/// nearest primary road; `f64::INFINITY` means none nearby.
///
/// # Returns
/// The weights, each floored at `MIN_LAND_USE_WEIGHT`
pub fn compute_weights(dist_to_center: f64, min_road: f64, min_primary: f64, max_dist: f64) -> LandUseWeights {
    let mut commercial = 0.0;
    if min_primary <= COMMERCIAL_PRIMARY_DIST {
        commercial += COMMERCIAL_PRIMARY_BONUS;
    }
    commercial +=
        (COMMERCIAL_CENTER_WEIGHT * (1.0 - dist_to_center / (max_dist * COMMERCIAL_CENTER_RADIUS))).max(0.0);

    let mut residential = RESIDENTIAL_BASE;
    if dist_to_center > max_dist * RESIDENTIAL_RING_INNER && dist_to_center < max_dist * RESIDENTIAL_RING_OUTER {
        residential += RESIDENTIAL_RING_BONUS;
    }
    if min_road <= RESIDENTIAL_ROAD_DIST {
        residential += RESIDENTIAL_ROAD_BONUS;
    }

    let mut industrial = 0.0;
    if min_primary <= INDUSTRIAL_PRIMARY_DIST {
        industrial += INDUSTRIAL_PRIMARY_BONUS;
    }
    industrial += (INDUSTRIAL_EDGE_WEIGHT * (dist_to_center / (max_dist * INDUSTRIAL_EDGE_RADIUS) - 1.0)).max(0.0);

    let park = PARK_BASE + (1.0 - residential / PARK_RESIDENTIAL_SCALE) * PARK_RESIDENTIAL_WEIGHT;

    LandUseWeights {
        commercial: commercial.max(MIN_LAND_USE_WEIGHT),
        residential: residential.max(MIN_LAND_USE_WEIGHT),
        industrial: industrial.max(MIN_LAND_USE_WEIGHT),
        park: park.max(MIN_LAND_USE_WEIGHT),
    }
}

/// Walks the categories in enumeration order, subtracting each weight from `draw` until the
/// draw falls inside a category's span.
pub fn select_from_draw(weights: &LandUseWeights, draw: f64) -> LandUse {
    if weights.total() <= 0.0 {
        return LandUse::Park;
    }

    let mut remaining = draw;
    for land_use in LandUse::ALL {
        let weight = weights.get(land_use);
        if remaining < weight {
            return land_use;
        }
        remaining -= weight;
    }

    // draw at the very top of the range after rounding
    LandUse::Park
}

/// Draws uniformly in `[0, total)` and picks the matching land use.
pub fn select_land_use<R: Rng>(weights: &LandUseWeights, rng: &mut R) -> LandUse {
    let total = weights.total();
    if total <= 0.0 {
        return LandUse::Park;
    }
    select_from_draw(weights, rng.random::<f64>() * total)
}

fn classify(parcel: &Parcel, context: &NetworkContext, index: &RoadIndex, rng: &mut impl Rng) -> LandUse {
    let centroid = polygon_centroid(&parcel.shape);
    let dist_to_center = centroid.distance(context.centroid);
    let (min_road, min_primary) = index.nearest_distances(&parcel.shape, ROAD_QUERY_BUFFER);

    let weights = compute_weights(dist_to_center, min_road, min_primary, context.max_dist);
    select_land_use(&weights, rng)
}

/// Classifies every parcel in place, spreading the work over the compute pool.
///
/// Does nothing when either the parcels or the roads are empty.
pub fn assign_land_use_in_place<R: RandomSource>(parcels: &mut [Parcel], roads: &[LineSegment], source: &R) {
    if parcels.is_empty() || roads.is_empty() {
        return;
    }
    let Some(context) = NetworkContext::from_roads(roads) else {
        return;
    };

    let index = RoadIndex::build(roads);
    let pool = compute_pool();
    let chunk_size = parcels.len().div_ceil(pool.thread_num().max(1));

    let index = &index;
    let context = &context;
    pool.scope(|scope| {
        for (chunk_idx, chunk) in parcels.chunks_mut(chunk_size).enumerate() {
            scope.spawn(async move {
                for (offset, parcel) in chunk.iter_mut().enumerate() {
                    let mut rng = source.rng_for(chunk_idx * chunk_size + offset);
                    parcel.land_use = Some(classify(parcel, context, index, &mut rng));
                }
            });
        }
    });

    debug!("classified {} parcels against {} roads", parcels.len(), index.len());
}

/// Land-use stage.
pub fn assign_land_use<R: RandomSource>(model: CityDataModel<Parceled>, source: &R) -> CityDataModel<Classified> {
    let mut model = model.classified();
    assign_land_use_in_place(&mut model.parcels, &model.road_network, source);
    model
}
