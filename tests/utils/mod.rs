use anyhow::Result;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::path::PathBuf;
use std::process::Command;

use super::common::TestEnvironment;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Parsed JSON events from stdout and stderr (`--format json`).
    pub fn events(&self) -> Vec<serde_json::Value> {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }

    pub fn events_with_code(&self, code: &str) -> Vec<serde_json::Value> {
        self.events()
            .into_iter()
            .filter(|e| e["code"] == code)
            .collect()
    }
}

pub fn run_wallcraft_command(env: &TestEnvironment, args: &[&str]) -> Result<CommandOutput> {
    let output = Command::new(env!("CARGO_BIN_EXE_wallcraft"))
        .args(args)
        .env("HOME", env.home())
        .env("XDG_CONFIG_HOME", env.config_home())
        .env("XDG_DATA_HOME", env.data_home())
        .current_dir(env.path())
        .output()?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Writes a gradient PNG and returns a `file://` URL for it.
pub fn create_test_photo(env: &TestEnvironment, width: u32, height: u32) -> Result<String> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 90])
    });
    let path: PathBuf = env.path().join("photo.png");
    DynamicImage::ImageRgb8(img).save_with_format(&path, ImageFormat::Png)?;
    Ok(format!("file://{}", path.display()))
}
