// geometric primitives shared by every stage of the pipeline
use bevy::math::DVec2;
use thiserror::Error;

pub mod clip;
pub mod utils;

pub use clip::{clip_segment, intersect_segments};

// my 2d polygon datatype, an open ring (first vertex is not repeated at the end)
// x is longitude, y is latitude whenever the polygon lives in geographic space
pub type Polygon = Vec<DVec2>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    /// Bounds with `min >= max` on either axis, or non-finite coordinates.
    #[error("invalid bounds: lon [{min_lon}, {max_lon}], lat [{min_lat}, {max_lat}]; min must be below max")]
    InvalidBounds {
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
    },
}

/// A validated rectangular region in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl GeoBounds {
    /// # Returns
    /// The bounds, or `GeometryError::InvalidBounds` if they are inverted, empty or not finite.
    /// Bounds are never normalized.
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Result<Self, GeometryError> {
        let bounds = Self { min_lon, max_lon, min_lat, max_lat };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        let finite = [self.min_lon, self.max_lon, self.min_lat, self.max_lat]
            .iter()
            .all(|v| v.is_finite());

        if finite && self.min_lon < self.max_lon && self.min_lat < self.max_lat {
            Ok(())
        } else {
            Err(GeometryError::InvalidBounds {
                min_lon: self.min_lon,
                max_lon: self.max_lon,
                min_lat: self.min_lat,
                max_lat: self.max_lat,
            })
        }
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn contains(&self, point: DVec2) -> bool {
        point.x >= self.min_lon && point.x <= self.max_lon && point.y >= self.min_lat && point.y <= self.max_lat
    }

    pub fn envelope(&self) -> Envelope {
        Envelope {
            min: DVec2::new(self.min_lon, self.min_lat),
            max: DVec2::new(self.max_lon, self.max_lat),
        }
    }

    // counter-clockwise rectangle
    pub fn to_polygon(&self) -> Polygon {
        vec![
            DVec2::new(self.min_lon, self.min_lat),
            DVec2::new(self.max_lon, self.min_lat),
            DVec2::new(self.max_lon, self.max_lat),
            DVec2::new(self.min_lon, self.max_lat),
        ]
    }
}

/// Axis-aligned bounding rectangle of a geometry. Unlike [`GeoBounds`] it may be degenerate
/// (zero width or height), e.g. the envelope of a single axis-parallel road.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min: DVec2,
    pub max: DVec2,
}

impl Envelope {
    pub fn from_points(points: &[DVec2]) -> Option<Self> {
        let first = *points.first()?;
        let mut envelope = Envelope { min: first, max: first };
        for &p in &points[1..] {
            envelope.min = envelope.min.min(p);
            envelope.max = envelope.max.max(p);
        }
        Some(envelope)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    pub fn expanded(&self, by: f64) -> Envelope {
        Envelope {
            min: self.min - DVec2::splat(by),
            max: self.max + DVec2::splat(by),
        }
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min.x <= other.max.x && other.min.x <= self.max.x && self.min.y <= other.max.y && other.min.y <= self.max.y
    }

    pub fn to_polygon(&self) -> Polygon {
        vec![
            self.min,
            DVec2::new(self.max.x, self.min.y),
            self.max,
            DVec2::new(self.min.x, self.max.y),
        ]
    }
}
