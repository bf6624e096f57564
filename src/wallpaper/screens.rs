//! Where the monitor set comes from: `--monitor` descriptors, a JSON file,
//! or the default monitors file.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

use super::geometry::Monitor;
use crate::common::paths;

pub fn load_file(path: &Path) -> Result<Vec<Monitor>> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("reading monitors file {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing monitors file {}", path.display()))
}

pub fn save_file(path: &Path, monitors: &[Monitor]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("creating monitors directory")?;
    }
    let json = serde_json::to_string_pretty(monitors).context("serializing monitors")?;
    fs::write(path, json).with_context(|| format!("writing monitors file {}", path.display()))
}

/// Descriptors win over a file; the default file is the fallback.
pub fn resolve(descriptors: &[String], file: Option<&Path>) -> Result<Vec<Monitor>> {
    if !descriptors.is_empty() {
        return descriptors
            .iter()
            .map(|d| d.parse::<Monitor>().map_err(anyhow::Error::from))
            .collect();
    }

    let path: PathBuf = match file {
        Some(p) => p.to_path_buf(),
        None => paths::default_monitors_file()?,
    };
    if !path.exists() {
        bail!(
            "no monitors given; pass --monitor id:X,Y:WxH[@scale] or create {}",
            path.display()
        );
    }
    load_file(&path)
}
