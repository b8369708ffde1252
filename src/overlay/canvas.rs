//! Drawing targets for tile images

use std::path::Path;

use image::{DynamicImage, RgbaImage, imageops};

use crate::models::PixelPoint;

/// Surface the overlay paints tiles onto.
pub trait Canvas {
    /// Paint `image` with its top-left corner at `position`, scaled by a
    /// constant `alpha` (0 transparent, 255 as is).
    fn draw_image(&mut self, image: &DynamicImage, position: PixelPoint, alpha: u8);
}

/// In-memory RGBA canvas
pub struct RgbaCanvas {
    image: RgbaImage,
}

impl RgbaCanvas {
    /// Create a fully transparent canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    /// The painted pixels.
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Take the painted pixels.
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Write the canvas to disk; the format follows the file extension.
    pub fn save(&self, path: &Path) -> image::ImageResult<()> {
        self.image.save(path)
    }
}

impl Canvas for RgbaCanvas {
    fn draw_image(&mut self, image: &DynamicImage, position: PixelPoint, alpha: u8) {
        let mut tile = image.to_rgba8();
        if alpha < u8::MAX {
            for pixel in tile.pixels_mut() {
                pixel[3] = ((u16::from(pixel[3]) * u16::from(alpha)) / 255) as u8;
            }
        }
        imageops::overlay(&mut self.image, &tile, position.x, position.y);
    }
}
