//! # wms-tiles 🗺️
//!
//! Tiled WMS overlays with a bounded recency cache and background loading.
//!
//! ## Overview
//!
//! A WMS server renders an arbitrary bounding box on request. wms-tiles cuts
//! the visible map into fixed-size tiles anchored at a geographic origin,
//! requests each tile as its own `GetMap` call, and keeps the decoded images
//! in a per-source cache so panning only fetches what is new.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TileOverlay                           │
//! │   Computes the visible grid and paints cached tiles         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  one per source
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TileLoader                            │
//! │   Cache lookup, dedup queue and a bounded worker pool       │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │  RecencyCache   │ │  LoadingQueue   │ │   TileFetcher   │
//! │                 │ │                 │ │                 │
//! │ • Recency order │ │ • Newest first  │ │ • HTTP GetMap   │
//! │ • Batch evict   │ │ • Claimed keys  │ │ • Decode/resize │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Sources and cache sizing
//! - [`error`]: Tile loading errors
//! - [`models`]: Coordinates, tile keys and WMS sources
//! - [`overlay`]: Grid, projection, canvas and the overlay itself
//! - [`tiles`]: Cache, queue, fetcher and loader
//!
//! ## Example
//!
//! ```no_run
//! use wms_tiles::overlay::{RgbaCanvas, TileOverlay, Viewport, WebMercator};
//! use wms_tiles::tiles::HttpFetcher;
//! use wms_tiles::{Config, GeoPoint};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let fetcher = HttpFetcher::new(config.request_timeout())?;
//!     let mut overlay = TileOverlay::with_sources(
//!         config.sources.clone(),
//!         config.loader_config(),
//!         config.overlay_config(),
//!         &fetcher,
//!     )?;
//!
//!     let viewport = Viewport::new(800, 600, 6);
//!     let projection = WebMercator::new(GeoPoint::new(52.5, 13.4), &viewport);
//!     let mut canvas = RgbaCanvas::new(viewport.width, viewport.height);
//!     overlay.draw(&viewport, &projection, &mut canvas);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Stable tiles**: Tile keys survive panning, so cached tiles are reused
//! - **Layered**: Any number of WMS sources drawn bottom to top
//! - **Bounded**: Cache size and download concurrency are capped per source
//! - **Responsive**: Drawing never waits for the network

#![doc(html_root_url = "https://docs.rs/wms-tiles/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::similar_names)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod models;
pub mod overlay;
pub mod paths;
pub mod tiles;

// Re-export main types for convenience
pub use config::Config;
pub use error::{Result, TileError};
pub use models::{BoundingBox, GeoPoint, PixelPoint, TileKey, WmsSource};
pub use overlay::{DrawStats, TileOverlay};
pub use tiles::{LoaderConfig, LoaderEvent, RecencyCache, TileLoader};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
