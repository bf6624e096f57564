use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::fs;

use super::automation::DEFAULT_SCRIPT_TIMEOUT;
use super::crop::DEFAULT_JPEG_QUALITY;
use super::download::DEFAULT_USER_AGENT;
use super::scheduler::UpdateInterval;
use crate::common::paths;

fn default_script_timeout_secs() -> u64 {
    DEFAULT_SCRIPT_TIMEOUT.as_secs()
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_update_preference_store() -> bool {
    true
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WallpaperConfig {
    #[serde(default)]
    pub update_interval: UpdateInterval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default = "default_script_timeout_secs")]
    pub script_timeout_secs: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_concurrency: Option<usize>,
    #[serde(default = "default_update_preference_store")]
    pub update_preference_store: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallpaper_dir: Option<PathBuf>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WallpaperConfig {
    fn default() -> Self {
        Self {
            update_interval: UpdateInterval::default(),
            source_url: None,
            script_timeout_secs: default_script_timeout_secs(),
            jpeg_quality: default_jpeg_quality(),
            crop_concurrency: None,
            update_preference_store: default_update_preference_store(),
            wallpaper_dir: None,
            user_agent: default_user_agent(),
        }
    }
}

impl WallpaperConfig {
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(paths::wallcraft_config_dir()?.join("wallcraft.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(cfg_path: &Path) -> Result<Self> {
        if !cfg_path.exists() {
            return Ok(Self::default());
        }

        let s = fs::read_to_string(cfg_path)
            .with_context(|| format!("reading config {}", cfg_path.display()))?;
        toml::from_str(&s).with_context(|| format!("parsing config {}", cfg_path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, cfg_path: &Path) -> Result<()> {
        if let Some(parent) = cfg_path.parent() {
            fs::create_dir_all(parent).context("creating config directory")?;
        }

        let toml = toml::to_string_pretty(self).context("serializing config to toml")?;
        fs::write(cfg_path, toml).context("writing config file")?;
        Ok(())
    }

    /// Clamped to 10..=30 seconds.
    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs.clamp(10, 30))
    }

    pub fn output_dir(&self) -> Result<PathBuf> {
        match &self.wallpaper_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::wallpapers_dir(),
        }
    }
}
