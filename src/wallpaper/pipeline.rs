//! Download -> crop per monitor -> one aggregate apply.
//!
//! Only one cycle runs at a time; a second request while one is in flight
//! is rejected with [`PipelineError::Busy`]. The gate is an in-process mutex
//! plus an exclusive `flock` on a lock file in the output directory, so a
//! manual `apply` and a running `schedule` exclude each other too.

use futures_util::future::join_all;
use image::DynamicImage;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};

use super::applier::{ApplyTarget, MonitorOutcome, WallpaperApplier};
use super::crop::{self, CropError, SourceImage};
use super::download::ImageSource;
use super::geometry::{self, GeometryError, Monitor, VirtualDesktopBounds};
use super::status::{Stage, StatusBoard, StatusSink, WallpaperStatus};
use crate::ui::{Level, emit};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("a wallpaper is already being applied")]
    Busy,

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("monitor '{0}' has a zero size or non-positive scale factor")]
    InvalidMonitor(String),

    #[error("monitor id '{0}' appears more than once")]
    DuplicateMonitorId(String),

    #[error("could not prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CycleState {
    Success,
    Partial,
    Failed,
}

impl CycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleState::Success => "success",
            CycleState::Partial => "partial",
            CycleState::Failed => "failed",
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CycleOutcome {
    pub state: CycleState,
    pub statuses: Vec<WallpaperStatus>,
    /// Every monitor that started with a valid crop ended in success, and
    /// at least one did.
    pub applied: bool,
}

impl CycleOutcome {
    pub fn succeeded(&self) -> bool {
        self.applied
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub output_dir: PathBuf,
    pub jpeg_quality: u8,
    pub crop_concurrency: usize,
}

impl PipelineOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            jpeg_quality: crop::DEFAULT_JPEG_QUALITY,
            crop_concurrency: default_concurrency(),
        }
    }
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

pub struct Orchestrator {
    source: Arc<dyn ImageSource>,
    applier: Arc<dyn WallpaperApplier>,
    sink: Arc<dyn StatusSink>,
    options: PipelineOptions,
    gate: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn ImageSource>,
        applier: Arc<dyn WallpaperApplier>,
        sink: Arc<dyn StatusSink>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            applier,
            sink,
            options,
            gate: Mutex::new(()),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    pub async fn apply_wallpaper(
        &self,
        photo_url: &str,
        monitors: Vec<Monitor>,
    ) -> Result<CycleOutcome, PipelineError> {
        let _guard = self.gate.try_lock().map_err(|_| PipelineError::Busy)?;

        let bounds = validate(&monitors)?;
        tokio::fs::create_dir_all(&self.options.output_dir)
            .await
            .map_err(|source| PipelineError::Io {
                path: self.options.output_dir.clone(),
                source,
            })?;
        let _lock = acquire_cycle_lock(&self.options.output_dir)?;

        emit(
            Level::Debug,
            "wallpaper.cycle.start",
            &format!("Applying {photo_url} across {} monitors ({bounds})", monitors.len()),
            None,
        );

        let mut board = StatusBoard::begin(self.sink.clone(), &monitors);
        for m in &monitors {
            board.advance(&m.id, Stage::Downloading);
        }

        let image = match self.download_and_decode(photo_url).await {
            Ok(image) => image,
            Err(reason) => {
                for m in &monitors {
                    board.fail(&m.id, reason.clone());
                }
                return Ok(CycleOutcome {
                    state: CycleState::Failed,
                    statuses: board.into_records(),
                    applied: false,
                });
            }
        };

        for m in &monitors {
            board.advance(&m.id, Stage::Cropping);
        }
        let crops = self.crop_all(Arc::new(image), &monitors, bounds).await;

        let mut targets = Vec::with_capacity(monitors.len());
        for (m, result) in monitors.iter().zip(crops) {
            let output_path = match result {
                Ok(path) => Some(path),
                Err(e) => {
                    emit(
                        Level::Warn,
                        "wallpaper.crop.failed",
                        &format!("Cropping for {} failed: {e}", m.label()),
                        None,
                    );
                    board.fail(&m.id, e.to_string());
                    None
                }
            };
            targets.push(ApplyTarget {
                monitor_id: m.id.clone(),
                output_path,
            });
        }

        for t in targets.iter().filter(|t| t.output_path.is_some()) {
            board.advance(&t.monitor_id, Stage::Applying);
        }

        let report = self.applier.apply(&targets).await;
        for (monitor_id, outcome) in &report.outcomes {
            match outcome {
                MonitorOutcome::Applied => {
                    board.advance(monitor_id, Stage::Success);
                }
                MonitorOutcome::Failed(reason) => {
                    board.fail(monitor_id, reason.clone());
                }
                MonitorOutcome::Skipped => {}
            }
        }

        let with_path: Vec<&ApplyTarget> =
            targets.iter().filter(|t| t.output_path.is_some()).collect();
        let applied = !with_path.is_empty()
            && with_path
                .iter()
                .all(|t| board.stage_of(&t.monitor_id) == Some(Stage::Success));
        let successes = board
            .records()
            .iter()
            .filter(|r| r.stage == Stage::Success)
            .count();
        let state = if successes == 0 {
            CycleState::Failed
        } else if successes == monitors.len() {
            CycleState::Success
        } else {
            CycleState::Partial
        };

        Ok(CycleOutcome {
            state,
            statuses: board.into_records(),
            applied,
        })
    }

    async fn download_and_decode(&self, photo_url: &str) -> Result<DynamicImage, String> {
        let bytes = self.source.fetch(photo_url).await.map_err(|e| {
            emit(
                Level::Error,
                "wallpaper.download.failed",
                &format!("Could not download {photo_url}: {e}"),
                None,
            );
            format!("Download failed: {e}")
        })?;

        let decoded = tokio::task::spawn_blocking(move || crop::decode(&bytes))
            .await
            .map_err(|e| format!("Decode failed: {e}"))?;
        decoded.map_err(|e| {
            emit(Level::Error, "wallpaper.decode.failed", &e.to_string(), None);
            format!("Decode failed: {e}")
        })
    }

    /// Crops run in parallel on the blocking pool; results come back in
    /// monitor order.
    async fn crop_all(
        &self,
        image: Arc<DynamicImage>,
        monitors: &[Monitor],
        bounds: VirtualDesktopBounds,
    ) -> Vec<Result<PathBuf, String>> {
        let source = SourceImage::of(&image);
        let permits = Arc::new(Semaphore::new(self.options.crop_concurrency.max(1)));

        let tasks = monitors.iter().map(|m| {
            let image = Arc::clone(&image);
            let permits = Arc::clone(&permits);
            let monitor = m.clone();
            let dir = self.options.output_dir.clone();
            let quality = self.options.jpeg_quality;
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| e.to_string())?;
                tokio::task::spawn_blocking(move || {
                    crop_one(&image, source, &bounds, &monitor, &dir, quality)
                })
                .await
                .map_err(|e| format!("crop task failed: {e}"))?
                .map_err(|e| e.to_string())
            }
        });

        join_all(tasks).await
    }
}

fn crop_one(
    image: &DynamicImage,
    source: SourceImage,
    bounds: &VirtualDesktopBounds,
    monitor: &Monitor,
    dir: &Path,
    quality: u8,
) -> Result<PathBuf, CropError> {
    let region = crop::compute_crop_region(source, bounds, monitor);
    emit(
        Level::Debug,
        "wallpaper.crop.region",
        &format!("{}: {region}", monitor.label()),
        serde_json::to_value(region).ok(),
    );
    let encoded = crop::crop(image, &region, quality)?;
    crop::write_output(dir, &monitor.id, &encoded)
}

pub const LOCK_FILE_NAME: &str = ".wallcraft.lock";

/// Exclusive, non-blocking lock shared by every wallcraft process writing to
/// `dir`. Released when the returned guard is dropped.
pub fn acquire_cycle_lock(dir: &Path) -> Result<Flock<File>, PipelineError> {
    let path = dir.join(LOCK_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|source| PipelineError::Io {
            path: path.clone(),
            source,
        })?;

    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => Ok(lock),
        Err((_, errno)) if errno == Errno::EWOULDBLOCK => Err(PipelineError::Busy),
        Err((_, errno)) => Err(PipelineError::Io {
            path,
            source: std::io::Error::from(errno),
        }),
    }
}

fn validate(monitors: &[Monitor]) -> Result<VirtualDesktopBounds, PipelineError> {
    let mut seen = HashSet::new();
    for m in monitors {
        if m.width == 0 || m.height == 0 || !(m.scale_factor.is_finite() && m.scale_factor > 0.0) {
            return Err(PipelineError::InvalidMonitor(m.id.clone()));
        }
        if !seen.insert(m.id.as_str()) {
            return Err(PipelineError::DuplicateMonitorId(m.id.clone()));
        }
    }
    Ok(geometry::resolve_bounds(monitors)?)
}
