// handles procedural road network generation for an urban area

use std::collections::{HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

use bevy::log::debug;
use bevy::math::DVec2;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use spade::{DelaunayTriangulation, LastUsedVertexHintGenerator, Point2, Triangulation as _};

use crate::config::*;
use crate::systems::city::{CityDataModel, LineSegment, RoadType, run_pipeline};
use crate::systems::geometry::Envelope;
use crate::systems::geometry::utils::{envelope, point_in_polygon, polygon_area};

use super::{GenerationError, RoadNetworkGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoadLayout {
    /// Straight avenues across the whole area.
    #[default]
    Grid,
    /// Delaunay mesh over jittered points, hull edges become primary roads.
    Organic,
}

type CacheKey = (u64, u32);

// finished models by boundary and cell size, evicted in insertion order
struct ModelCache {
    capacity: usize,
    models: HashMap<CacheKey, Arc<CityDataModel>>,
    order: VecDeque<CacheKey>,
}

impl ModelCache {
    fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), models: HashMap::new(), order: VecDeque::new() }
    }

    fn get(&self, key: &CacheKey) -> Option<Arc<CityDataModel>> {
        self.models.get(key).cloned()
    }

    // a concurrent caller may have finished first, keep whichever landed first
    fn insert(&mut self, key: CacheKey, model: Arc<CityDataModel>) -> Arc<CityDataModel> {
        if let Some(existing) = self.models.get(&key) {
            return existing.clone();
        }
        while self.models.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.models.remove(&oldest);
        }
        self.order.push_back(key);
        self.models.insert(key, model.clone());
        model
    }
}

/// Stand-in for a real road network source: lays out roads inside the boundary's envelope and
/// runs the full structural pipeline on them. Holds on to at most `GENERATOR_CACHE_CAPACITY`
/// finished models by default.
pub struct ProceduralCityGenerator {
    layout: RoadLayout,
    seed: u64,
    cache: Mutex<ModelCache>,
}

impl ProceduralCityGenerator {
    pub fn new(layout: RoadLayout, seed: u64) -> Self {
        Self::with_cache_capacity(layout, seed, GENERATOR_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(layout: RoadLayout, seed: u64, capacity: usize) -> Self {
        Self {
            layout,
            seed,
            cache: Mutex::new(ModelCache::new(capacity)),
        }
    }

    pub fn layout(&self) -> RoadLayout {
        self.layout
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).models.len()
    }

    /// Lays out the road network for a boundary without running the pipeline.
    pub fn roads_for(&self, boundary: &[DVec2], cell_size: u32) -> Result<Vec<LineSegment>, GenerationError> {
        let env = validate_boundary(boundary)?;
        match self.layout {
            RoadLayout::Grid => Ok(grid_roads(&env, cell_size)),
            RoadLayout::Organic => organic_roads(boundary, &env, cell_size, self.seed.wrapping_add(boundary_key(boundary))),
        }
    }
}

impl RoadNetworkGenerator for ProceduralCityGenerator {
    fn generate_model(&self, boundary: &[DVec2], cell_size: u32) -> Result<Arc<CityDataModel>, GenerationError> {
        let key = (boundary_key(boundary), cell_size);
        if let Some(model) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(model);
        }

        let roads = self.roads_for(boundary, cell_size)?;
        let model = Arc::new(run_pipeline(CityDataModel::new(roads), self.seed));
        debug!(
            "generated city {}: {} roads, {} parcels, {} buildings",
            model.id(),
            model.road_network().len(),
            model.parcels().len(),
            model.buildings().len()
        );

        Ok(self.cache.lock().unwrap_or_else(PoisonError::into_inner).insert(key, model))
    }
}

fn validate_boundary(boundary: &[DVec2]) -> Result<Envelope, GenerationError> {
    if boundary.len() < 3 {
        return Err(GenerationError::EmptyBoundary(boundary.len()));
    }
    if boundary.iter().any(|p| !p.is_finite()) || polygon_area(boundary).abs() <= 0.0 {
        return Err(GenerationError::DegenerateBoundary);
    }
    envelope(boundary).ok_or(GenerationError::DegenerateBoundary)
}

// hash of the exact coordinates
fn boundary_key(boundary: &[DVec2]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for p in boundary {
        p.x.to_bits().hash(&mut hasher);
        p.y.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

/// Evenly spaced avenues over the envelope
///
/// # Returns
/// `n + 1` vertical and `n + 1` horizontal roads spanning the whole envelope, where `n` is
/// `cell_size` clamped to `GRID_LINES_MIN..=GRID_LINES_MAX`. Every `PRIMARY_EVERY`-th line,
/// the outer ones included, is primary.
pub fn grid_roads(env: &Envelope, cell_size: u32) -> Vec<LineSegment> {
    let n = (cell_size as usize).clamp(GRID_LINES_MIN, GRID_LINES_MAX);
    let step = DVec2::new(env.width(), env.height()) / n as f64;
    let mut roads = Vec::with_capacity(2 * (n + 1));

    for i in 0..=n {
        let road_type = if i % PRIMARY_EVERY == 0 || i == n { RoadType::Primary } else { RoadType::Secondary };
        // pin the last line to the envelope edge
        let x = if i == n { env.max.x } else { env.min.x + i as f64 * step.x };
        let y = if i == n { env.max.y } else { env.min.y + i as f64 * step.y };

        roads.push(LineSegment::new(x, env.min.y, x, env.max.y, road_type));
        roads.push(LineSegment::new(env.min.x, y, env.max.x, y, road_type));
    }

    roads
}

/// Delaunay road mesh over jittered points inside the boundary plus the boundary vertices
/// themselves. Edges on the convex hull are primary roads.
pub fn organic_roads(
    boundary: &[DVec2],
    env: &Envelope,
    cell_size: u32,
    seed: u64,
) -> Result<Vec<LineSegment>, GenerationError> {
    let mut rng = StdRng::seed_from_u64(seed);

    let count = ORGANIC_POINT_COUNT.max(cell_size as usize).min(GRID_LINES_MAX * GRID_LINES_MAX);
    let side = (count as f64).sqrt().ceil().max(1.0) as usize;
    let step = DVec2::new(env.width(), env.height()) / side as f64;

    let jitter = Normal::new(0.0, ORGANIC_JITTER).map_err(|e| GenerationError::Failed(e.to_string()))?;

    // jittered lattice, kept only where it falls inside the boundary
    let mut points: Vec<DVec2> = boundary.to_vec();
    for i in 0..side {
        for j in 0..side {
            let cell = DVec2::new(i as f64 + 0.5, j as f64 + 0.5);
            let offset = DVec2::new(rng.sample(jitter), rng.sample(jitter));
            let p = env.min + (cell + offset) * step;
            if point_in_polygon(p, boundary) {
                points.push(p);
            }
        }
    }

    let mut triangulation: DelaunayTriangulation<Point2<f64>, (), (), (), LastUsedVertexHintGenerator> =
        DelaunayTriangulation::new();
    for p in &points {
        triangulation.insert(Point2::new(p.x, p.y)).ok();
    }

    let mut roads = Vec::with_capacity(triangulation.num_undirected_edges());
    for edge in triangulation.undirected_edges() {
        let directed = edge.as_directed();
        let on_hull = directed.face().is_outer() || directed.rev().face().is_outer();
        let road_type = if on_hull { RoadType::Primary } else { RoadType::Secondary };

        let (from, to) = (directed.from().position(), directed.to().position());
        roads.push(LineSegment::new(from.x, from.y, to.x, to.y, road_type));
    }

    Ok(roads)
}
