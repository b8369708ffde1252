//! Tile key model

use serde::{Deserialize, Serialize};

/// Identifies one rendered tile of one source.
///
/// `x` grows eastward and `y` grows northward from the overlay origin, so
/// both may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    /// Zoom level the tile was computed for
    pub zoom: u8,
    /// Grid column
    pub x: i64,
    /// Grid row
    pub y: i64,
}

impl TileKey {
    /// Create a new tile key
    pub const fn new(zoom: u8, x: i64, y: i64) -> Self {
        Self { zoom, x, y }
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}
