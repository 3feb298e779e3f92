// city data model and the structural pipeline:
// roads -> parcels -> land use -> buildings
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use bevy::math::DVec2;
use bevy::tasks::{ComputeTaskPool, TaskPool};

use crate::systems::geometry::{Envelope, Polygon};

pub mod buildings;
pub mod land_use;
pub mod parcels;
pub mod polygonize;
pub mod spatial;

pub use buildings::generate_buildings;
pub use land_use::{SeededRandom, assign_land_use};
pub use parcels::generate_parcels;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoadType {
    Primary,
    #[default]
    Secondary,
}

/// A road between two points. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    start: DVec2,
    end: DVec2,
    road_type: RoadType,
}

impl LineSegment {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, road_type: RoadType) -> Self {
        Self::from_points(DVec2::new(x1, y1), DVec2::new(x2, y2), road_type)
    }

    pub fn from_points(start: DVec2, end: DVec2, road_type: RoadType) -> Self {
        Self { start, end, road_type }
    }

    pub fn start(&self) -> DVec2 {
        self.start
    }

    pub fn end(&self) -> DVec2 {
        self.end
    }

    pub fn road_type(&self) -> RoadType {
        self.road_type
    }

    pub fn envelope(&self) -> Envelope {
        Envelope {
            min: self.start.min(self.end),
            max: self.start.max(self.end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandUse {
    Commercial,
    Residential,
    Industrial,
    Park,
}

impl LandUse {
    // fixed enumeration order, weighted selection walks categories in this order
    pub const ALL: [LandUse; 4] = [LandUse::Commercial, LandUse::Residential, LandUse::Industrial, LandUse::Park];
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    pub shape: Polygon,
    // None until the land-use assigner has run
    pub land_use: Option<LandUse>,
}

impl Parcel {
    pub fn new(shape: Polygon) -> Self {
        Self { shape, land_use: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    pub footprint: Polygon,
    pub land_use: LandUse,
}

// pipeline phase markers, a model only moves forward through these
pub mod phase {
    #[derive(Debug, Clone, Copy)]
    pub struct Roads;
    #[derive(Debug, Clone, Copy)]
    pub struct Parceled;
    #[derive(Debug, Clone, Copy)]
    pub struct Classified;
    #[derive(Debug, Clone, Copy)]
    pub struct Built;
}

use phase::{Built, Classified, Parceled, Roads};

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// The road network of one city area and everything derived from it.
///
/// The phase parameter records which pipeline stages have run: each stage consumes the
/// model of the previous phase and hands back the next one, so a stage can never see a
/// collection that has not been produced yet.
#[derive(Debug, Clone)]
pub struct CityDataModel<S = Built> {
    id: u64,
    pub(crate) road_network: Vec<LineSegment>,
    pub(crate) parcels: Vec<Parcel>,
    pub(crate) buildings: Vec<Building>,
    _phase: PhantomData<S>,
}

impl<S> CityDataModel<S> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn road_network(&self) -> &[LineSegment] {
        &self.road_network
    }

    pub fn parcels(&self) -> &[Parcel] {
        &self.parcels
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    // drop every derived collection so the pipeline can be re-run on the same roads
    pub fn into_roads(self) -> CityDataModel<Roads> {
        CityDataModel {
            id: self.id,
            road_network: self.road_network,
            parcels: Vec::new(),
            buildings: Vec::new(),
            _phase: PhantomData,
        }
    }

    fn advance<T>(self, parcels: Vec<Parcel>, buildings: Vec<Building>) -> CityDataModel<T> {
        CityDataModel {
            id: self.id,
            road_network: self.road_network,
            parcels,
            buildings,
            _phase: PhantomData,
        }
    }
}

impl CityDataModel<Roads> {
    pub fn new(road_network: Vec<LineSegment>) -> Self {
        Self {
            id: NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed),
            road_network,
            parcels: Vec::new(),
            buildings: Vec::new(),
            _phase: PhantomData,
        }
    }

    pub(crate) fn with_parcels(self, parcels: Vec<Parcel>) -> CityDataModel<Parceled> {
        self.advance(parcels, Vec::new())
    }
}

impl CityDataModel<Parceled> {
    pub(crate) fn classified(mut self) -> CityDataModel<Classified> {
        let parcels = std::mem::take(&mut self.parcels);
        self.advance(parcels, Vec::new())
    }
}

impl CityDataModel<Classified> {
    pub(crate) fn with_buildings(mut self, buildings: Vec<Building>) -> CityDataModel<Built> {
        let parcels = std::mem::take(&mut self.parcels);
        self.advance(parcels, buildings)
    }
}

/// Runs every structural stage on a road network.
pub fn run_pipeline(model: CityDataModel<Roads>, seed: u64) -> CityDataModel<Built> {
    let parceled = generate_parcels(model);
    let classified = assign_land_use(parceled, &SeededRandom(seed));
    generate_buildings(classified)
}

// fan-out pool for the parallel stages
pub(crate) fn compute_pool() -> &'static TaskPool {
    ComputeTaskPool::get_or_init(TaskPool::default)
}
