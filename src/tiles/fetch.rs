//! Tile download and decoding.

use std::future::Future;
use std::time::Duration;

use image::DynamicImage;

use crate::error::{Result, TileError};

/// Fetches raw tile bytes for a request URL.
///
/// Workers call this off the draw path; implementations may block on
/// network I/O. Tests substitute a mock.
pub trait TileFetcher: Send + Sync + 'static {
    /// Download the body at `url`.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// `reqwest`-backed fetcher
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("wms-tiles/{}", crate::VERSION))
            .build()?;
        Ok(Self { client })
    }
}

impl TileFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("Downloading tile: {url}");

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(TileError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(TileError::EmptyBody(url.to_string()));
        }
        Ok(bytes.to_vec())
    }
}

/// Decode a tile body and bring it to the expected tile size.
pub fn decode_tile(bytes: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    let image = image::load_from_memory(bytes)?;
    Ok(fit_to_tile(image, width, height))
}

/// Some servers ignore WIDTH/HEIGHT; stretch those answers onto the grid.
fn fit_to_tile(image: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.width() == width && image.height() == height {
        return image;
    }
    tracing::debug!(
        "Resizing {}x{} tile to {width}x{height}",
        image.width(),
        image.height()
    );
    image.resize_exact(width, height, image::imageops::FilterType::Triangle)
}
