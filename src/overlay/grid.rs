//! Visible tile grid computation

use serde::Serialize;

use super::{Projection, Viewport};
use crate::models::{BoundingBox, GeoPoint, PixelPoint, TileKey};

/// One tile of the visible grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridTile {
    /// Cache key of the tile
    pub key: TileKey,
    /// Top-left corner on screen
    pub position: PixelPoint,
    /// Geographic extent, used for the request URL
    pub bbox: BoundingBox,
}

/// Splits the view into fixed-size tiles anchored at a geographic origin.
///
/// Tile edges sit at whole multiples of `tile_size` pixels from the origin,
/// so a tile keeps its key while the map pans. Columns count eastward and
/// rows count northward from the origin; row 0 is the band just above it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    tile_size: u32,
    origin: GeoPoint,
}

impl TileGrid {
    /// Create a grid of `tile_size` pixel tiles anchored at `origin`.
    pub const fn new(tile_size: u32, origin: GeoPoint) -> Self {
        Self { tile_size, origin }
    }

    /// Tile edge length in pixels
    pub const fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Tiles covering the whole viewport, row by row from the top-left.
    ///
    /// The first row and column always start off-screen, one tile before the
    /// first tile edge inside the view.
    pub fn compute(&self, viewport: &Viewport, projection: &dyn Projection) -> Vec<GridTile> {
        let size = i64::from(self.tile_size.max(1));
        let origin = projection.to_pixels(self.origin);

        let left = origin.x.rem_euclid(size) - size;
        let top = origin.y.rem_euclid(size) - size;
        let columns = i64::from(viewport.width) / size + 2;
        let rows = i64::from(viewport.height) / size + 2;

        let first_column = (left - origin.x).div_euclid(size);
        let first_band = (top - origin.y).div_euclid(size);

        let mut tiles = Vec::with_capacity(usize::try_from(columns * rows).unwrap_or(0));
        for row in 0..rows {
            let y = top + row * size;
            // Screen y grows downward while grid rows grow northward
            let grid_y = -(first_band + row) - 1;
            for column in 0..columns {
                let x = left + column * size;
                let north_west = projection.from_pixels(PixelPoint::new(x, y));
                let south_east = projection.from_pixels(PixelPoint::new(x + size, y + size));
                tiles.push(GridTile {
                    key: TileKey::new(viewport.zoom, first_column + column, grid_y),
                    position: PixelPoint::new(x, y),
                    bbox: BoundingBox::from_corners(north_west, south_east),
                });
            }
        }
        tiles
    }
}
