//! Common paths for wms-tiles data storage
//!
//! Everything lives under ~/.config/wms-tiles/ on all platforms:
//! - config.toml - Sources and cache sizing

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Get the data directory (~/.config/wms-tiles/), creating it if needed
pub fn app_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let dir = home.join(".config").join("wms-tiles");
    fs::create_dir_all(&dir).context("Failed to create wms-tiles directory")?;
    Ok(dir)
}

/// Get the config file path (~/.config/wms-tiles/config.toml)
pub fn config_path() -> Result<PathBuf> {
    Ok(app_dir()?.join("config.toml"))
}
