// end to end scenarios across the pipeline, the queue and the tile renderer
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bevy::math::DVec2;
use bevy::prelude::*;
use tokio::runtime::Handle;

use crate::systems::city::{CityDataModel, LineSegment, RoadType, generate_parcels, run_pipeline};
use crate::systems::generation::{
    CityGeneration, CityGenerationManager, CityGenerationPlugin, GenerationError, GenerationParams, ManagerSettings,
    ProceduralCityGenerator, RoadLayout,
};
use crate::systems::geometry::utils::polygon_area;
use crate::systems::geometry::{GeoBounds, GeometryError, Polygon, clip_segment};
use crate::systems::render::{RenderError, TileCache, TileKey, TileRenderer, UrbanAreas, tile_bounds, tile_key_at};

fn square_roads(size: f64) -> Vec<LineSegment> {
    vec![
        LineSegment::new(0.0, 0.0, size, 0.0, RoadType::Primary),
        LineSegment::new(size, 0.0, size, size, RoadType::Primary),
        LineSegment::new(size, size, 0.0, size, RoadType::Secondary),
        LineSegment::new(0.0, size, 0.0, 0.0, RoadType::Secondary),
    ]
}

fn rect(lon: f64, lat: f64, w: f64, h: f64) -> Polygon {
    vec![
        DVec2::new(lon, lat),
        DVec2::new(lon + w, lat),
        DVec2::new(lon + w, lat + h),
        DVec2::new(lon, lat + h),
    ]
}

fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("city_gen_{}_{name}", std::process::id()))
}

#[test]
fn smallest_block_becomes_a_single_parcel() {
    let model = generate_parcels(CityDataModel::new(square_roads(0.01)));
    assert_eq!(model.parcels().len(), 1);
    assert!(model.buildings().is_empty());
}

#[test]
fn smallest_block_in_paris_stays_whole() {
    let corners = rect(2.30, 48.82, 0.01, 0.01);
    let roads: Vec<LineSegment> = (0..4)
        .map(|i| LineSegment::from_points(corners[i], corners[(i + 1) % 4], RoadType::Secondary))
        .collect();
    let model = generate_parcels(CityDataModel::new(roads));
    assert_eq!(model.parcels().len(), 1);
    assert!((polygon_area(&model.parcels()[0].shape).abs() - 0.0001).abs() <= 1e-9);
}

#[test]
fn rerunning_the_pipeline_keeps_parcel_area() {
    let first = run_pipeline(CityDataModel::new(square_roads(0.05)), 3);
    let area = |m: &CityDataModel| m.parcels().iter().map(|p| polygon_area(&p.shape).abs()).sum::<f64>();
    let before = area(&first);

    let second = run_pipeline(first.clone().into_roads(), 3);
    assert_eq!(first.parcels().len(), second.parcels().len());
    assert!((area(&second) - before).abs() <= 1e-12 * before);
    assert!((before - 0.0025).abs() <= 1e-6 * 0.0025);
}

#[test]
fn clipping_a_road_through_a_tile() {
    let bounds = GeoBounds::new(0.0, 10.0, 0.0, 10.0).unwrap();
    let (a, b) = clip_segment(&bounds, DVec2::new(-5.0, 5.0), DVec2::new(15.0, 5.0)).unwrap();
    assert!((a - DVec2::new(0.0, 5.0)).length() < 1e-12);
    assert!((b - DVec2::new(10.0, 5.0)).length() < 1e-12);
}

#[test]
fn tile_without_urban_areas_is_transparent() {
    let generator = |_: &[DVec2], _: u32| -> Result<Arc<CityDataModel>, GenerationError> {
        panic!("no urban area overlaps this tile");
    };
    let renderer = TileRenderer::new(Arc::new(UrbanAreas::new(vec![rect(5.0, 5.0, 1.0, 1.0)])), Arc::new(generator), 32);

    let image = renderer.render_tile(&GeoBounds::new(0.0, 1.0, 0.0, 1.0).unwrap(), 10).unwrap();
    assert_eq!(image.dimensions(), (32, 32));
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0, 0]));
}

#[test]
fn inverted_bounds_are_rejected() {
    assert!(matches!(
        GeoBounds::new(1.0, 0.0, 0.0, 1.0),
        Err(GeometryError::InvalidBounds { .. })
    ));

    let renderer = TileRenderer::new(
        Arc::new(UrbanAreas::new(vec![rect(0.0, 0.0, 1.0, 1.0)])),
        Arc::new(ProceduralCityGenerator::new(RoadLayout::Grid, 1)),
        16,
    );
    let inverted = GeoBounds { min_lon: 0.0, max_lon: 1.0, min_lat: 1.0, max_lat: 0.0 };
    assert!(matches!(renderer.render_tile(&inverted, 10), Err(RenderError::Geometry(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn manager_drains_every_demo_area() {
    let generator = Arc::new(ProceduralCityGenerator::new(RoadLayout::Grid, 11));
    let settings = ManagerSettings { cell_size: 6, delay: Duration::from_millis(1) };
    let manager = CityGenerationManager::with_settings(generator.clone(), Handle::current(), settings);

    let areas = crate::systems::generation::demo_urban_areas();
    for area in &areas {
        manager.queue_area(area.clone());
    }
    manager.wait_idle().await;

    let completed = manager.take_completed();
    assert_eq!(completed.len(), areas.len());
    assert_eq!(manager.failed_count(), 0);
    assert!(completed.iter().all(|m| !m.parcels().is_empty()));
    assert_eq!(generator.cached_count(), areas.len());
}

#[test]
fn rendered_tile_is_reused_from_disk() {
    let dir = scratch_dir("disk_cache");
    let city = rect(0.01, 0.01, 0.04, 0.04);
    let cell_size = 1280;
    let key = tile_key_at(0.03, 0.03, cell_size, 360, 180);
    assert!(tile_bounds(key, 360, 180).unwrap().contains(DVec2::new(0.03, 0.03)));

    let renderer = TileRenderer::new(
        Arc::new(UrbanAreas::new(vec![city.clone()])),
        Arc::new(ProceduralCityGenerator::new(RoadLayout::Grid, 2)),
        64,
    );
    let cache = TileCache::new(renderer, 360, 180, Some(dir.clone()));
    let rendered = cache.get_tile(key).unwrap();
    assert!(rendered.pixels().any(|p| p[3] > 0));
    let path = cache.tile_path(key).unwrap();
    assert!(path.exists());

    // a fresh cache must not need the generator at all
    let offline = |_: &[DVec2], _: u32| -> Result<Arc<CityDataModel>, GenerationError> {
        Err(GenerationError::Failed("offline".into()))
    };
    let reloaded = TileCache::new(
        TileRenderer::new(Arc::new(UrbanAreas::new(vec![city])), Arc::new(offline), 64),
        360,
        180,
        Some(dir.clone()),
    );
    let from_disk = reloaded.get_tile(key).unwrap();
    std::fs::remove_dir_all(&dir).ok();

    assert_eq!(*from_disk, *rendered);
    assert_eq!(reloaded.len(), 1);
}

#[test]
fn generation_plugin_queues_the_configured_areas() {
    let mut app = App::new();
    app.insert_resource(GenerationParams {
        urban_areas: vec![rect(0.0, 0.0, 0.02, 0.02), rect(1.0, 1.0, 0.02, 0.02)],
        layout: RoadLayout::Grid,
        seed: 4,
        cell_size: 4,
        queue_delay_ms: 1,
    })
    .add_plugins(CityGenerationPlugin);

    app.update();

    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let generation = app.world().resource::<CityGeneration>();
        if !generation.manager.is_processing() {
            break;
        }
        assert!(Instant::now() < deadline, "generation queue never drained");
        std::thread::sleep(Duration::from_millis(5));
        app.update();
    }

    let generation = app.world().resource::<CityGeneration>();
    let completed = generation.manager.take_completed();
    assert_eq!(completed.len(), 2);
    // 4 x 4 grid over a 0.02 square, every cell is small enough to stay whole
    assert!(completed.iter().all(|m| m.parcels().len() == 16));
}

#[test]
fn tile_width_follows_cell_size() {
    let key = TileKey { cell_size: 10, x: 0, y: 0 };
    let bounds = tile_bounds(key, 360, 180).unwrap();
    // 3600 px wide world, 512 px tile
    assert!((bounds.width() - 512.0 / 3600.0 * 360.0).abs() < 1e-9);
}
