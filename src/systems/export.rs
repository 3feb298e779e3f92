// saves rendered tiles as png and city models as obj files

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use bevy::log::info;
use image::RgbaImage;

use crate::systems::city::CityDataModel;
use crate::systems::geometry::Polygon;

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

// export a tile, creating the folder if needed
pub fn export_tile_png(image: &RgbaImage, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    ensure_parent(path)?;
    image.save(path)?;
    info!("Exported tile to {}", path.display());
    Ok(())
}

// export parcels and building footprints as flat faces
// x = longitude, y = 0, z = -latitude so the map reads north-up in most viewers
pub fn export_model_obj(model: &CityDataModel, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    ensure_parent(path)?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    // OBJ header
    writeln!(writer, "# city {}", model.id())?;
    writeln!(
        writer,
        "# {} roads, {} parcels, {} buildings",
        model.road_network().len(),
        model.parcels().len(),
        model.buildings().len()
    )?;

    // OBJ format indices start at 1
    let mut vertex_offset = 1;

    for (i, parcel) in model.parcels().iter().enumerate() {
        let group = parcel.land_use.map_or("unassigned".to_string(), |l| format!("{l:?}").to_lowercase());
        writeln!(writer, "o Parcel_{i}")?;
        writeln!(writer, "g parcel_{group}")?;
        vertex_offset = write_face(&mut writer, &parcel.shape, vertex_offset)?;
    }

    for (i, building) in model.buildings().iter().enumerate() {
        writeln!(writer, "o Building_{i}")?;
        writeln!(writer, "g building_{}", format!("{:?}", building.land_use).to_lowercase())?;
        vertex_offset = write_face(&mut writer, &building.footprint, vertex_offset)?;
    }

    writer.flush()?;
    info!(
        "Exported {} parcels and {} buildings to {}",
        model.parcels().len(),
        model.buildings().len(),
        path.display()
    );

    Ok(())
}

// one polygon face, returns the next free vertex index
fn write_face(writer: &mut impl Write, polygon: &Polygon, vertex_offset: usize) -> std::io::Result<usize> {
    if polygon.len() < 3 {
        return Ok(vertex_offset);
    }

    for v in polygon {
        writeln!(writer, "v {} 0 {}", v.x, -v.y)?;
    }

    write!(writer, "f")?;
    for i in 0..polygon.len() {
        write!(writer, " {}", vertex_offset + i)?;
    }
    writeln!(writer)?;

    Ok(vertex_offset + polygon.len())
}
