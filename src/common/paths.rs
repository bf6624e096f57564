use anyhow::{Context, Result};
use std::path::PathBuf;

/// Centralized path management for wallcraft
/// This module provides a single source of truth for all application paths

/// Get the main wallcraft config directory
pub fn wallcraft_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("wallcraft");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory at {}", config_dir.display()))?;

    Ok(config_dir)
}

/// Get the main wallcraft data directory
pub fn wallcraft_data_dir() -> Result<PathBuf> {
    data_dir_under(dirs::data_dir())
}

fn data_dir_under(base: Option<PathBuf>) -> Result<PathBuf> {
    let data_dir = base
        .context("Unable to determine user data directory")?
        .join("wallcraft");

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory at {}", data_dir.display()))?;

    Ok(data_dir)
}

/// Directory holding the per-monitor output images and the generated apply script
pub fn wallpapers_dir() -> Result<PathBuf> {
    let dir = wallcraft_data_dir()?.join("wallpapers");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating wallpaper directory at {}", dir.display()))?;
    Ok(dir)
}

/// Default location of the monitor layout file
pub fn default_monitors_file() -> Result<PathBuf> {
    Ok(wallcraft_config_dir()?.join("monitors.json"))
}

/// macOS Dock wallpaper database; `None` when there is no home directory.
pub fn desktop_picture_db() -> Option<PathBuf> {
    dirs::home_dir().map(|home| {
        home.join("Library")
            .join("Application Support")
            .join("Dock")
            .join("desktoppicture.db")
    })
}
