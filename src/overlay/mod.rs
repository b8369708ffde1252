//! Map overlay that draws WMS tiles for the current view.
//!
//! On every [`TileOverlay::draw`] the visible [`TileGrid`] is computed from
//! the viewport and projection, each tile is requested from every source
//! loader (bottom layer first), and whatever is already cached gets painted.
//! Missing tiles load in the background; [`TileOverlay::poll_events`] tells
//! the host when a repaint would show more.

mod canvas;
mod grid;
mod projection;

pub use canvas::{Canvas, RgbaCanvas};
pub use grid::{GridTile, TileGrid};
pub use projection::{Projection, Viewport, WORLD_TILE_SIZE, WebMercator};

use crate::error::{Result, TileError};
use crate::models::{GeoPoint, TileKey, WmsSource};
use crate::tiles::{EventReceiver, LoaderConfig, LoaderEvent, TileFetcher, TileLoader, channel};

/// Drawing parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayConfig {
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Constant alpha applied to every tile
    pub alpha: u8,
    /// Geographic anchor of the tile grid
    pub origin: GeoPoint,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            alpha: 200,
            origin: GeoPoint::default(),
        }
    }
}

/// Outcome of one draw pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    /// Tiles in the visible grid
    pub tiles: usize,
    /// Tile requests made across all sources
    pub requested: usize,
    /// Requests answered from cache and painted
    pub drawn: usize,
}

impl DrawStats {
    /// Every requested tile was painted
    pub const fn is_complete(&self) -> bool {
        self.drawn == self.requested
    }
}

/// Layered WMS overlay for a host map view
pub struct TileOverlay<F: TileFetcher> {
    loaders: Vec<TileLoader<TileKey, F>>,
    events: EventReceiver<TileKey>,
    grid: TileGrid,
    alpha: u8,
    sleeping: bool,
    last_zoom: Option<u8>,
}

impl<F: TileFetcher> TileOverlay<F> {
    /// Wrap existing loaders, bottom layer first.
    ///
    /// `events` should be the receiving end of the channel the loaders send
    /// to. Every loader must request tiles of `config.tile_size`.
    pub fn new(
        loaders: Vec<TileLoader<TileKey, F>>,
        events: EventReceiver<TileKey>,
        config: OverlayConfig,
    ) -> Result<Self> {
        if let Some(loader) = loaders
            .iter()
            .find(|loader| loader.tile_size() != config.tile_size)
        {
            return Err(TileError::InvalidConfig(format!(
                "source {} loads {}px tiles, overlay grid uses {}px",
                loader.source().name,
                loader.tile_size(),
                config.tile_size
            )));
        }

        Ok(Self {
            loaders,
            events,
            grid: TileGrid::new(config.tile_size, config.origin),
            alpha: config.alpha,
            sleeping: false,
            last_zoom: None,
        })
    }

    /// Create one loader per source, sharing `fetcher` and one event channel.
    ///
    /// Must be called within a tokio runtime.
    pub fn with_sources(
        sources: Vec<WmsSource>,
        loader_config: LoaderConfig,
        config: OverlayConfig,
        fetcher: &F,
    ) -> Result<Self>
    where
        F: Clone,
    {
        let (tx, rx) = channel();
        let loader_config = LoaderConfig {
            tile_size: config.tile_size,
            ..loader_config
        };
        let loaders = sources
            .into_iter()
            .map(|source| TileLoader::new(source, loader_config, fetcher.clone(), tx.clone()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(loaders, rx, config)
    }

    /// Paint every cached tile of the current view and queue the rest.
    pub fn draw(
        &mut self,
        viewport: &Viewport,
        projection: &dyn Projection,
        canvas: &mut dyn Canvas,
    ) -> DrawStats {
        if self.sleeping {
            return DrawStats::default();
        }

        if self.last_zoom.is_some_and(|zoom| zoom != viewport.zoom) {
            tracing::debug!("Zoom changed to {}, dropping queued tiles", viewport.zoom);
            self.stop_loading();
        }
        self.last_zoom = Some(viewport.zoom);

        let tiles = self.grid.compute(viewport, projection);
        let mut stats = DrawStats {
            tiles: tiles.len(),
            ..DrawStats::default()
        };

        for loader in &self.loaders {
            for tile in &tiles {
                stats.requested += 1;
                if let Some(image) = loader.request_tile(tile.key, &tile.bbox) {
                    canvas.draw_image(&image, tile.position, self.alpha);
                    stats.drawn += 1;
                }
            }
        }
        stats
    }

    /// Drain pending loader events; returns `true` if a tile became ready.
    pub fn poll_events(&mut self) -> bool {
        let mut redraw = false;
        while let Ok(event) = self.events.try_recv() {
            redraw |= log_event(&event);
        }
        redraw
    }

    /// Wait for the next loader event.
    pub async fn next_event(&mut self) -> Option<LoaderEvent<TileKey>> {
        let event = self.events.recv().await?;
        log_event(&event);
        Some(event)
    }

    /// Whether any source has queued or in-flight tiles.
    ///
    /// Reads the loaders' worker and queue counters, so it is accurate
    /// whether or not events have been drained.
    pub fn is_loading(&self) -> bool {
        self.loaders
            .iter()
            .any(|loader| loader.active_workers() > 0 || loader.queued_len() > 0)
    }

    /// Drop queued tiles of every source.
    pub fn stop_loading(&self) {
        for loader in &self.loaders {
            loader.stop_loading();
        }
    }

    /// Suspend drawing and tile requests. Cached tiles are kept.
    pub fn sleep(&mut self) {
        self.sleeping = true;
    }

    /// Resume drawing.
    pub fn wake(&mut self) {
        self.sleeping = false;
    }

    /// Whether drawing is suspended.
    pub const fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Detach from the host view: stop and close every loader.
    pub fn close(&mut self) {
        self.sleeping = true;
        for loader in &self.loaders {
            loader.close();
        }
    }

    /// Source loaders, bottom layer first.
    pub fn loaders(&self) -> &[TileLoader<TileKey, F>] {
        &self.loaders
    }

    /// The tile grid used for drawing.
    pub const fn grid(&self) -> &TileGrid {
        &self.grid
    }
}

fn log_event(event: &LoaderEvent<TileKey>) -> bool {
    match event {
        LoaderEvent::TileReady { source, key } => {
            tracing::trace!("Tile {key} ready from {source}");
            true
        }
        LoaderEvent::TileFailed { source, key, error } => {
            tracing::debug!("Tile {key} from {source} failed: {error}");
            false
        }
        LoaderEvent::WorkerStarted { source } => {
            tracing::trace!("Loading started for {source}");
            false
        }
        LoaderEvent::WorkerStopped { source } => {
            tracing::trace!("Loading stopped for {source}");
            false
        }
    }
}
