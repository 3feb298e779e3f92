// tile addressing and the memory/disk tile cache
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use bevy::log::{debug, warn};
use image::RgbaImage;

use crate::config::*;
use crate::systems::geometry::{GeoBounds, GeometryError};

use super::{RenderError, TileRenderer};

/// A tile of the world raster at one zoom level, where the raster is `base * cell_size` pixels
/// wide and cut into `TILE_SIZE_PX` squares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub cell_size: u32,
    pub x: u32,
    pub y: u32,
}

/// Geographic bounds of a tile, lon from -180 on the left and lat from 90 at the top.
/// The last row and column may be partial tiles.
///
/// # Returns
/// `GeometryError::InvalidBounds` for tiles past the edge of the raster.
pub fn tile_bounds(key: TileKey, base_width: u32, base_height: u32) -> Result<GeoBounds, GeometryError> {
    let full_w = base_width as f64 * key.cell_size as f64;
    let full_h = base_height as f64 * key.cell_size as f64;
    let offset_x = key.x as f64 * TILE_SIZE_PX as f64;
    let offset_y = key.y as f64 * TILE_SIZE_PX as f64;
    let tile_w = (TILE_SIZE_PX as f64).min(full_w - offset_x);
    let tile_h = (TILE_SIZE_PX as f64).min(full_h - offset_y);

    GeoBounds::new(
        -180.0 + offset_x / full_w * 360.0,
        -180.0 + (offset_x + tile_w) / full_w * 360.0,
        90.0 - (offset_y + tile_h) / full_h * 180.0,
        90.0 - offset_y / full_h * 180.0,
    )
}

/// The tile containing a geographic point at the given zoom level.
pub fn tile_key_at(lon: f64, lat: f64, cell_size: u32, base_width: u32, base_height: u32) -> TileKey {
    let full_w = base_width as f64 * cell_size as f64;
    let full_h = base_height as f64 * cell_size as f64;
    let px = ((lon + 180.0) / 360.0 * full_w).clamp(0.0, (full_w - 1.0).max(0.0));
    let py = ((90.0 - lat) / 180.0 * full_h).clamp(0.0, (full_h - 1.0).max(0.0));

    TileKey {
        cell_size,
        x: (px / TILE_SIZE_PX as f64).floor() as u32,
        y: (py / TILE_SIZE_PX as f64).floor() as u32,
    }
}

/// Pixels per map cell for a fractional zoom, interpolated between `PIXELS_PER_CELL_LEVELS`.
/// NaN falls back to the coarsest level.
pub fn cell_size_for_zoom(zoom: f32) -> u32 {
    let anchors = PIXELS_PER_CELL_LEVELS;

    let size = if zoom.is_nan() || zoom <= 1.0 {
        anchors[0] as f32
    } else if zoom >= anchors.len() as f32 {
        anchors[anchors.len() - 1] as f32
    } else {
        let lower = zoom.floor() as usize - 1;
        let t = zoom - (lower + 1) as f32;
        anchors[lower] as f32 + t * (anchors[lower + 1] as f32 - anchors[lower] as f32)
    };

    size.max(1.0).round() as u32
}

type TileSlot = Arc<Mutex<Option<Arc<RgbaImage>>>>;

/// Memory and disk cache in front of a [`TileRenderer`].
///
/// Each key owns a slot lock, held while that tile is loaded or rendered, so concurrent
/// requests for one tile render it once while different tiles proceed in parallel.
pub struct TileCache {
    renderer: TileRenderer,
    base_width: u32,
    base_height: u32,
    disk_dir: Option<PathBuf>,
    slots: Mutex<HashMap<TileKey, TileSlot>>,
}

impl TileCache {
    pub fn new(renderer: TileRenderer, base_width: u32, base_height: u32, disk_dir: Option<PathBuf>) -> Self {
        Self {
            renderer,
            base_width,
            base_height,
            disk_dir,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// `<dir>/<cell_size>/<x>_<y>.png`
    pub fn tile_path(&self, key: TileKey) -> Option<PathBuf> {
        self.disk_dir
            .as_ref()
            .map(|dir| dir.join(key.cell_size.to_string()).join(format!("{}_{}.png", key.x, key.y)))
    }

    /// Number of tiles held in memory.
    pub fn len(&self) -> usize {
        let slots: Vec<TileSlot> = self.slots.lock().unwrap_or_else(PoisonError::into_inner).values().cloned().collect();
        slots
            .iter()
            .filter(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks the tile up in memory, then on disk, and renders it as a last resort.
    /// Rendered tiles are written back to disk when a cache directory is set.
    pub fn get_tile(&self, key: TileKey) -> Result<Arc<RgbaImage>, RenderError> {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone();
        let mut cached = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(tile) = cached.as_ref() {
            debug!("tile {key:?}: memory hit");
            return Ok(tile.clone());
        }

        let path = self.tile_path(key);
        if let Some(path) = path.as_ref().filter(|p| p.exists()) {
            match image::open(path) {
                Ok(loaded) => {
                    debug!("tile {key:?}: disk hit");
                    let tile = Arc::new(loaded.to_rgba8());
                    *cached = Some(tile.clone());
                    return Ok(tile);
                }
                Err(err) => warn!("unreadable cached tile {}, rendering again: {err}", path.display()),
            }
        }

        debug!("tile {key:?}: rendering");
        let bounds = tile_bounds(key, self.base_width, self.base_height)?;
        let tile = self.renderer.render_tile(&bounds, key.cell_size)?;

        if let Some(path) = path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            tile.save(&path)?;
        }

        let tile = Arc::new(tile);
        *cached = Some(tile.clone());
        Ok(tile)
    }
}
