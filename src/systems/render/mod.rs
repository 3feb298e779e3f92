// this is the entry point for tile rendering
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use bevy::math::DVec2;
use bevy::prelude::*;
use geo::Intersects;
use image::{Rgba, RgbaImage};
use imageproc::drawing::Blend;
use thiserror::Error;

use crate::config::*;
use crate::systems::city::{CityDataModel, LandUse, RoadType, compute_pool};
use crate::systems::export::{export_model_obj, export_tile_png};
use crate::systems::generation::{CityGeneration, GenerationParams, RoadNetworkGenerator};
use crate::systems::geometry::utils::{envelope, intersect_polygons, to_geo};
use crate::systems::geometry::{Envelope, GeoBounds, GeometryError, Polygon, clip_segment};

pub mod canvas;
pub mod tiles;

use canvas::Canvas;
pub use tiles::{TileCache, TileKey, cell_size_for_zoom, tile_bounds, tile_key_at};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("tile io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("tile image failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Read-only list of urban-area outlines, loaded once and shared with every renderer.
#[derive(Debug, Clone, Default)]
pub struct UrbanAreas {
    polygons: Vec<Polygon>,
    envelopes: Vec<Envelope>,
}

impl UrbanAreas {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        let (polygons, envelopes) = polygons
            .into_iter()
            .filter(|p| p.len() >= 3)
            .filter_map(|p| envelope(&p).map(|env| (p, env)))
            .unzip();
        Self { polygons, envelopes }
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    /// Areas overlapping the bounds: a cheap envelope test first, then the exact one.
    pub fn intersecting(&self, bounds: &GeoBounds) -> Vec<&Polygon> {
        let tile_env = bounds.envelope();
        let tile = to_geo(&bounds.to_polygon());

        self.polygons
            .iter()
            .zip(&self.envelopes)
            .filter(|(_, env)| env.intersects(&tile_env))
            .filter(|(polygon, _)| to_geo(polygon).intersects(&tile))
            .map(|(polygon, _)| polygon)
            .collect()
    }
}

pub fn land_use_color(land_use: Option<LandUse>) -> Rgba<u8> {
    Rgba(match land_use {
        Some(LandUse::Commercial) => COMMERCIAL_COLOR,
        Some(LandUse::Residential) => RESIDENTIAL_COLOR,
        Some(LandUse::Industrial) => INDUSTRIAL_COLOR,
        Some(LandUse::Park) => PARK_COLOR,
        None => UNKNOWN_COLOR,
    })
}

fn road_style(road_type: RoadType) -> (f64, Rgba<u8>) {
    match road_type {
        RoadType::Primary => (PRIMARY_ROAD_WIDTH_PX, Rgba(PRIMARY_ROAD_COLOR)),
        RoadType::Secondary => (SECONDARY_ROAD_WIDTH_PX, Rgba(SECONDARY_ROAD_COLOR)),
    }
}

/// Linear lon/lat to pixel mapping over one tile, north up.
#[derive(Debug, Clone, Copy)]
pub struct TileTransform {
    bounds: GeoBounds,
    scale: DVec2,
}

impl TileTransform {
    pub fn new(bounds: GeoBounds, width: u32, height: u32) -> Self {
        let scale = DVec2::new(width as f64 / bounds.width(), height as f64 / bounds.height());
        Self { bounds, scale }
    }

    pub fn to_pixel(&self, p: DVec2) -> DVec2 {
        DVec2::new(
            (p.x - self.bounds.min_lon) * self.scale.x,
            (self.bounds.max_lat - p.y) * self.scale.y,
        )
    }

    pub fn polygon_to_pixels(&self, polygon: &[DVec2]) -> Polygon {
        polygon.iter().map(|&p| self.to_pixel(p)).collect()
    }
}

/// Composites roads and building footprints of every visible city into a tile.
#[derive(Clone)]
pub struct TileRenderer {
    urban_areas: Arc<UrbanAreas>,
    generator: Arc<dyn RoadNetworkGenerator>,
    tile_size: u32,
}

impl TileRenderer {
    pub fn new(urban_areas: Arc<UrbanAreas>, generator: Arc<dyn RoadNetworkGenerator>, tile_size: u32) -> Self {
        Self { urban_areas, generator, tile_size }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Renders one tile.
    ///
    /// # Returns
    /// A transparent tile when no urban area overlaps the bounds, `RenderError::Geometry` for
    /// invalid bounds. Areas whose generation fails are left out.
    pub fn render_tile(&self, bounds: &GeoBounds, cell_size: u32) -> Result<RgbaImage, RenderError> {
        bounds.validate()?;

        let mut image = Blend(RgbaImage::new(self.tile_size, self.tile_size));
        let areas = self.urban_areas.intersecting(bounds);
        if areas.is_empty() {
            return Ok(image.0);
        }
        debug!("rendering {bounds:?} with {} urban areas", areas.len());

        let models = self.generate_models(&areas, cell_size);
        let transform = TileTransform::new(*bounds, self.tile_size, self.tile_size);

        for model in &models {
            draw_roads(&mut image, model, bounds, &transform);
        }

        let tile = bounds.to_polygon();
        let tile_env = bounds.envelope();
        let canvas = Mutex::new(image);
        for model in &models {
            draw_buildings(&canvas, model, &tile, &tile_env, &transform);
        }

        Ok(canvas.into_inner().unwrap_or_else(PoisonError::into_inner).0)
    }

    // one model per area, generated side by side
    fn generate_models(&self, areas: &[&Polygon], cell_size: u32) -> Vec<Arc<CityDataModel>> {
        let generator = &self.generator;
        compute_pool()
            .scope(|scope| {
                for (idx, area) in areas.iter().enumerate() {
                    scope.spawn(async move {
                        match generator.generate_model(area, cell_size) {
                            Ok(model) => Some(model),
                            Err(err) => {
                                warn!("urban area {idx} left out of tile: {err}");
                                None
                            }
                        }
                    });
                }
            })
            .into_iter()
            .flatten()
            .collect()
    }
}

fn draw_roads(image: &mut Blend<RgbaImage>, model: &CityDataModel, bounds: &GeoBounds, transform: &TileTransform) {
    for road in model.road_network() {
        let Some((from, to)) = clip_segment(bounds, road.start(), road.end()) else {
            continue;
        };
        let (width, color) = road_style(road.road_type());
        image.draw_line(transform.to_pixel(from), transform.to_pixel(to), width, color);
    }
}

// footprints are clipped to the tile in parallel, fills are serialized through the lock
fn draw_buildings(
    canvas: &Mutex<Blend<RgbaImage>>,
    model: &CityDataModel,
    tile: &[DVec2],
    tile_env: &Envelope,
    transform: &TileTransform,
) {
    let visible: Vec<_> = model
        .buildings()
        .iter()
        .filter(|b| envelope(&b.footprint).is_some_and(|env| env.intersects(tile_env)))
        .collect();
    if visible.is_empty() {
        return;
    }

    let pool = compute_pool();
    let chunk_size = visible.len().div_ceil(pool.thread_num().max(1));

    pool.scope(|scope| {
        for chunk in visible.chunks(chunk_size) {
            scope.spawn(async move {
                let parts: Vec<(Polygon, Rgba<u8>)> = chunk
                    .iter()
                    .flat_map(|b| {
                        let color = land_use_color(Some(b.land_use));
                        intersect_polygons(&b.footprint, tile)
                            .into_iter()
                            .map(move |part| (transform.polygon_to_pixels(&part), color))
                    })
                    .collect();

                let mut image = canvas.lock().unwrap_or_else(PoisonError::into_inner);
                for (part, color) in &parts {
                    image.fill_polygon(part, *color);
                }
            });
        }
    });
}

// tile output settings for the headless run
#[derive(Resource, Clone, Debug)]
pub struct TileParams {
    pub tiles: Vec<TileKey>,
    pub base_width: u32,
    pub base_height: u32,
    pub output_dir: PathBuf,
    pub cache_dir: Option<PathBuf>,
}

impl Default for TileParams {
    fn default() -> Self {
        let (base_width, base_height) = (360, 180);
        let cell_size = cell_size_for_zoom(PIXELS_PER_CELL_LEVELS.len() as f32);

        // one tile on the center of every demo city
        let tiles = crate::systems::generation::demo_urban_areas()
            .iter()
            .filter_map(|area| envelope(area))
            .map(|env| {
                let c = env.center();
                tile_key_at(c.x, c.y, cell_size, base_width, base_height)
            })
            .collect();

        Self {
            tiles,
            base_width,
            base_height,
            output_dir: PathBuf::from("output"),
            cache_dir: Some(PathBuf::from("output/tile_cache")),
        }
    }
}

pub struct TileRenderPlugin;

impl Plugin for TileRenderPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TileParams>().add_systems(Update, render_when_idle);
    }
}

// once every queued city is generated: render the tiles, export, and quit
fn render_when_idle(
    generation: Option<Res<CityGeneration>>,
    generation_params: Res<GenerationParams>,
    params: Res<TileParams>,
    mut exit: EventWriter<AppExit>,
    mut done: Local<bool>,
) {
    let Some(generation) = generation else {
        return;
    };
    if *done || generation.manager.is_processing() {
        return;
    }
    *done = true;

    let urban_areas = Arc::new(UrbanAreas::new(generation_params.urban_areas.clone()));
    let renderer = TileRenderer::new(urban_areas, generation.generator.clone(), TILE_SIZE_PX);
    let cache = TileCache::new(renderer, params.base_width, params.base_height, params.cache_dir.clone());

    for &key in &params.tiles {
        let path = params.output_dir.join(format!("tile_{}_{}_{}.png", key.cell_size, key.x, key.y));
        match cache.get_tile(key) {
            Ok(tile) => {
                if let Err(err) = export_tile_png(&tile, &path) {
                    error!("could not export {}: {err}", path.display());
                }
            }
            Err(err) => error!("tile {key:?} failed: {err}"),
        }
    }

    let completed = generation.manager.take_completed();
    info!(
        "{} cities generated, {} failed",
        completed.len(),
        generation.manager.failed_count()
    );
    if let Some(model) = completed.first() {
        let path = params.output_dir.join(format!("city_{}.obj", model.id()));
        if let Err(err) = export_model_obj(model, &path) {
            error!("could not export {}: {err}", path.display());
        }
    }

    exit.write(AppExit::Success);
}
