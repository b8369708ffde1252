//! Configuration module for wms-tiles

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{GeoPoint, WmsSource};
use crate::overlay::OverlayConfig;
use crate::paths;
use crate::tiles::LoaderConfig;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tile edge length in pixels
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,

    /// Tiles kept per source after eviction
    #[serde(default = "default_cache_target_size")]
    pub cache_target_size: usize,

    /// Tiles per source that trigger eviction
    #[serde(default = "default_cache_tolerated_size")]
    pub cache_tolerated_size: usize,

    /// Concurrent downloads per source
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Opacity applied to every tile (0-255)
    #[serde(default = "default_alpha")]
    pub alpha: u8,

    /// HTTP timeout per tile in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Draw passes `render` makes before giving up on missing tiles
    #[serde(default = "default_max_draw_passes")]
    pub max_draw_passes: usize,

    /// Geographic anchor of the tile grid
    #[serde(default)]
    pub origin: GeoPoint,

    /// WMS sources, bottom layer first
    #[serde(default = "default_sources")]
    pub sources: Vec<WmsSource>,
}

fn default_tile_size() -> u32 {
    256
}

fn default_cache_target_size() -> usize {
    40
}

fn default_cache_tolerated_size() -> usize {
    50
}

fn default_max_workers() -> usize {
    2
}

fn default_alpha() -> u8 {
    200
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_draw_passes() -> usize {
    5
}

fn default_sources() -> Vec<WmsSource> {
    vec![WmsSource::new(
        "osm",
        "https://ows.terrestris.de/osm/service",
        &["OSM-WMS"],
    )]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
            cache_target_size: default_cache_target_size(),
            cache_tolerated_size: default_cache_tolerated_size(),
            max_workers: default_max_workers(),
            alpha: default_alpha(),
            request_timeout_secs: default_request_timeout(),
            max_draw_passes: default_max_draw_passes(),
            origin: GeoPoint::default(),
            sources: default_sources(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        paths::config_path()
    }

    /// Load config from the default path or create default
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Per-source loader sizing
    pub const fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            target_size: self.cache_target_size,
            tolerated_size: self.cache_tolerated_size,
            max_workers: self.max_workers,
            tile_size: self.tile_size,
        }
    }

    /// Overlay drawing parameters
    pub const fn overlay_config(&self) -> OverlayConfig {
        OverlayConfig {
            tile_size: self.tile_size,
            alpha: self.alpha,
            origin: self.origin,
        }
    }

    /// HTTP timeout per tile
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Find a source by name (case-insensitive)
    pub fn source(&self, name: &str) -> Option<&WmsSource> {
        self.sources
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}
