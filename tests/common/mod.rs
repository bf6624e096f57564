use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Isolated home, config and data directories for one test.
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        for sub in ["home", "config", "data"] {
            std::fs::create_dir_all(temp_dir.path().join(sub))?;
        }
        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn home(&self) -> PathBuf {
        self.path().join("home")
    }

    pub fn config_home(&self) -> PathBuf {
        self.path().join("config")
    }

    pub fn data_home(&self) -> PathBuf {
        self.path().join("data")
    }

    /// Where the binary writes its per-monitor images on Linux.
    pub fn wallpapers_dir(&self) -> PathBuf {
        self.data_home().join("wallcraft").join("wallpapers")
    }
}
