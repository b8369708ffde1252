//! Geographic and screen coordinate types

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Latitude limit of the spherical Mercator projection
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// Half the circumference of the Earth in EPSG:3857 metres
const MERCATOR_HALF_EXTENT: f64 = 20_037_508.342_789_244;

/// A WGS84 position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

impl GeoPoint {
    /// Create a new point
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Project to EPSG:3857 metres as `(x, y)`.
    pub fn to_web_mercator(self) -> (f64, f64) {
        let lat = self.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
        let x = self.lon * MERCATOR_HALF_EXTENT / 180.0;
        let y = ((90.0 + lat) * PI / 360.0).tan().ln() / (PI / 180.0);
        (x, y * MERCATOR_HALF_EXTENT / 180.0)
    }
}

/// A position on the host view, in pixels from its top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    /// Horizontal offset, growing rightward
    pub x: i64,
    /// Vertical offset, growing downward
    pub y: i64,
}

impl PixelPoint {
    /// Create a new pixel point
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned geographic rectangle in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western edge
    pub min_lon: f64,
    /// Southern edge
    pub min_lat: f64,
    /// Eastern edge
    pub max_lon: f64,
    /// Northern edge
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a bounding box from explicit edges
    pub const fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Smallest box containing both corners, in any order
    pub fn from_corners(a: GeoPoint, b: GeoPoint) -> Self {
        Self {
            min_lon: a.lon.min(b.lon),
            min_lat: a.lat.min(b.lat),
            max_lon: a.lon.max(b.lon),
            max_lat: a.lat.max(b.lat),
        }
    }

    /// South-west corner
    pub const fn south_west(&self) -> GeoPoint {
        GeoPoint::new(self.min_lat, self.min_lon)
    }

    /// North-east corner
    pub const fn north_east(&self) -> GeoPoint {
        GeoPoint::new(self.max_lat, self.max_lon)
    }

    /// Edges in EPSG:3857 metres as `(min_x, min_y, max_x, max_y)`
    pub fn to_web_mercator(&self) -> (f64, f64, f64, f64) {
        let (min_x, min_y) = self.south_west().to_web_mercator();
        let (max_x, max_y) = self.north_east().to_web_mercator();
        (min_x, min_y, max_x, max_y)
    }
}
