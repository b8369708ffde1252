//! Data models for tile loading

mod geo;
mod source;
mod tile;

pub use geo::{BoundingBox, GeoPoint, MAX_MERCATOR_LAT, PixelPoint};
pub use source::WmsSource;
pub use tile::TileKey;
