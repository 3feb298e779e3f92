use bevy::log::debug;

use crate::config::*;
use crate::systems::geometry::Polygon;
use crate::systems::geometry::utils::{envelope, inset_polygon, to_geo};

use super::phase::{Built, Classified};
use super::{Building, CityDataModel, LandUse, Parcel, compute_pool};

/// Derives the building footprint of a single parcel
///
/// # Returns
/// `None` for parks, unclassified parcels, and insets that vanish or break into several parts.
pub fn footprint_for(parcel: &Parcel) -> Option<Building> {
    let land_use = parcel.land_use?;
    let ratio = match land_use {
        LandUse::Park => return None,
        LandUse::Commercial => COMMERCIAL_INSET,
        LandUse::Residential => RESIDENTIAL_INSET,
        LandUse::Industrial => INDUSTRIAL_INSET,
    };

    let width = envelope(&parcel.shape)?.width();
    let mut parts = inset_polygon(&parcel.shape, width * ratio);
    if parts.len() != 1 {
        return None;
    }
    let mut footprint: Polygon = parts.pop()?;

    // industrial buildings are boxes, unless boxing would cover a courtyard
    if land_use == LandUse::Industrial && to_geo(&footprint).interiors().is_empty() {
        footprint = envelope(&footprint)?.to_polygon();
    }

    Some(Building { footprint, land_use })
}

/// Building stage: one footprint per eligible parcel, derived in parallel.
///
/// The order of the resulting buildings is not meaningful.
pub fn generate_buildings(model: CityDataModel<Classified>) -> CityDataModel<Built> {
    let buildings = buildings_for(model.parcels());
    model.with_buildings(buildings)
}

pub fn buildings_for(parcels: &[Parcel]) -> Vec<Building> {
    if parcels.is_empty() {
        return Vec::new();
    }

    let pool = compute_pool();
    let chunk_size = parcels.len().div_ceil(pool.thread_num().max(1));

    let buildings: Vec<Building> = pool
        .scope(|scope| {
            for chunk in parcels.chunks(chunk_size) {
                scope.spawn(async move { chunk.iter().filter_map(footprint_for).collect::<Vec<_>>() });
            }
        })
        .into_iter()
        .flatten()
        .collect();

    debug!("{} buildings from {} parcels", buildings.len(), parcels.len());
    buildings
}
