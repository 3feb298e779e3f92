// this is the entry point for the city generation plugin
use std::sync::Arc;

use bevy::math::DVec2;
use bevy::prelude::*;
use thiserror::Error;

use crate::config::*;
use crate::systems::city::CityDataModel;
use crate::systems::geometry::Polygon;

pub mod manager;
pub mod procedural;

pub use manager::{CityGenerationManager, ManagerSettings};
pub use procedural::{ProceduralCityGenerator, RoadLayout};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerationError {
    #[error("boundary polygon needs at least 3 vertices, got {0}")]
    EmptyBoundary(usize),
    #[error("boundary polygon has no area")]
    DegenerateBoundary,
    #[error("road network generation failed: {0}")]
    Failed(String),
}

/// Produces a fully built city model for a boundary polygon.
///
/// Implementations must be idempotent per call and must not touch shared state beyond their
/// own caches; callers treat a failure as "no data for this area".
pub trait RoadNetworkGenerator: Send + Sync + 'static {
    fn generate_model(&self, boundary: &[DVec2], cell_size: u32) -> Result<Arc<CityDataModel>, GenerationError>;
}

impl<F> RoadNetworkGenerator for F
where
    F: Fn(&[DVec2], u32) -> Result<Arc<CityDataModel>, GenerationError> + Send + Sync + 'static,
{
    fn generate_model(&self, boundary: &[DVec2], cell_size: u32) -> Result<Arc<CityDataModel>, GenerationError> {
        self(boundary, cell_size)
    }
}

// generation parameters
#[derive(Resource, Clone, Debug)]
pub struct GenerationParams {
    pub urban_areas: Vec<Polygon>,
    pub layout: RoadLayout,
    pub seed: u64,
    pub cell_size: u32,
    pub queue_delay_ms: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            urban_areas: demo_urban_areas(),
            layout: RoadLayout::default(),
            seed: INITIAL_SEED,
            cell_size: MANAGER_CELL_SIZE,
            queue_delay_ms: QUEUE_YIELD_MS,
        }
    }
}

// a handful of small city outlines, roughly 0.1 degrees across
pub fn demo_urban_areas() -> Vec<Polygon> {
    let rect = |lon: f64, lat: f64, w: f64, h: f64| -> Polygon {
        vec![
            DVec2::new(lon, lat),
            DVec2::new(lon + w, lat),
            DVec2::new(lon + w, lat + h),
            DVec2::new(lon, lat + h),
        ]
    };

    vec![
        rect(2.30, 48.82, 0.08, 0.06),
        rect(13.36, 52.48, 0.10, 0.08),
        // irregular outline
        vec![
            DVec2::new(-0.16, 51.48),
            DVec2::new(-0.06, 51.47),
            DVec2::new(-0.03, 51.53),
            DVec2::new(-0.10, 51.56),
            DVec2::new(-0.17, 51.53),
        ],
    ]
}

/// Live generation state: the shared generator, the work queue and the runtime driving it.
#[derive(Resource)]
pub struct CityGeneration {
    pub manager: CityGenerationManager,
    pub generator: Arc<ProceduralCityGenerator>,
    // owns the worker threads, dropped with the app
    _runtime: tokio::runtime::Runtime,
}

// main plugin for generation
pub struct CityGenerationPlugin;

impl Plugin for CityGenerationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<GenerationParams>()
            .add_systems(Startup, start_generation)
            .add_systems(Update, log_progress);
    }
}

fn start_generation(mut commands: Commands, params: Res<GenerationParams>, mut exit: EventWriter<AppExit>) {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("could not start the generation runtime: {err}");
            exit.write(AppExit::error());
            return;
        }
    };

    let generator = Arc::new(ProceduralCityGenerator::new(params.layout, params.seed));
    let settings = ManagerSettings {
        cell_size: params.cell_size,
        delay: std::time::Duration::from_millis(params.queue_delay_ms),
    };
    let manager = CityGenerationManager::with_settings(generator.clone(), runtime.handle().clone(), settings);

    for area in &params.urban_areas {
        manager.queue_area(area.clone());
    }
    info!("queued {} urban areas ({:?} layout)", params.urban_areas.len(), params.layout);

    commands.insert_resource(CityGeneration { manager, generator, _runtime: runtime });
}

fn log_progress(generation: Option<Res<CityGeneration>>, mut last_pending: Local<Option<usize>>) {
    let Some(generation) = generation else {
        return;
    };

    let pending = generation.manager.queue_count();
    if *last_pending != Some(pending) {
        debug!("{pending} urban areas waiting for generation");
        *last_pending = Some(pending);
    }
}
