//! Screen projections

use std::f64::consts::PI;

use crate::models::{GeoPoint, MAX_MERCATOR_LAT, PixelPoint};

/// Width of one zoom-0 world tile in screen pixels
pub const WORLD_TILE_SIZE: u32 = 256;

/// The host view's current size and zoom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Map zoom level
    pub zoom: u8,
}

impl Viewport {
    /// Create a viewport
    pub const fn new(width: u32, height: u32, zoom: u8) -> Self {
        Self {
            width,
            height,
            zoom,
        }
    }
}

/// Translates between geographic positions and view pixels.
pub trait Projection {
    /// Pixel position of `point` relative to the view's top-left corner
    fn to_pixels(&self, point: GeoPoint) -> PixelPoint;

    /// Geographic position under `pixel`
    fn from_pixels(&self, pixel: PixelPoint) -> GeoPoint;
}

/// Spherical Mercator projection of a view centered on a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebMercator {
    world_size: f64,
    left: f64,
    top: f64,
}

impl WebMercator {
    /// Project a view of `viewport`'s size, centered on `center`.
    pub fn new(center: GeoPoint, viewport: &Viewport) -> Self {
        let world_size = f64::from(WORLD_TILE_SIZE) * 2f64.powi(i32::from(viewport.zoom));
        let (cx, cy) = world_pixels(center, world_size);
        Self {
            world_size,
            left: cx - f64::from(viewport.width) / 2.0,
            top: cy - f64::from(viewport.height) / 2.0,
        }
    }
}

fn world_pixels(point: GeoPoint, world_size: f64) -> (f64, f64) {
    let lat = point.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = (point.lon + 180.0) / 360.0 * world_size;
    let y = (1.0 - lat.tan().asinh() / PI) / 2.0 * world_size;
    (x, y)
}

impl Projection for WebMercator {
    fn to_pixels(&self, point: GeoPoint) -> PixelPoint {
        let (x, y) = world_pixels(point, self.world_size);
        PixelPoint::new((x - self.left).round() as i64, (y - self.top).round() as i64)
    }

    fn from_pixels(&self, pixel: PixelPoint) -> GeoPoint {
        let x = pixel.x as f64 + self.left;
        let y = pixel.y as f64 + self.top;
        let lon = x / self.world_size * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * y / self.world_size)).sinh().atan().to_degrees();
        GeoPoint::new(lat, lon)
    }
}
