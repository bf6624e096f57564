//! Per-monitor progress for one apply cycle.
//!
//! The orchestrator is the only writer. Each monitor has one record that is
//! upserted in place; stages only move forward within a cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::geometry::Monitor;
use crate::ui::{Level, emit};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Pending,
    Downloading,
    Cropping,
    Applying,
    Success,
    Error,
}

impl Stage {
    fn rank(self) -> u8 {
        match self {
            Stage::Pending => 0,
            Stage::Downloading => 1,
            Stage::Cropping => 2,
            Stage::Applying => 3,
            Stage::Success | Stage::Error => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Success | Stage::Error)
    }

    /// Whether a record may move from `self` to `next`.
    pub fn can_advance_to(self, next: Stage) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::Downloading => "downloading",
            Stage::Cropping => "cropping",
            Stage::Applying => "applying",
            Stage::Success => "success",
            Stage::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WallpaperStatus {
    pub monitor_id: String,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// A new cycle started; all previous records are void.
    Reset,
    Upsert(WallpaperStatus),
}

/// Receives every status event the orchestrator produces.
pub trait StatusSink: Send + Sync {
    fn publish(&self, event: &StatusEvent);
}

/// Forwards events into an unbounded channel for an async consumer.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

pub fn channel() -> (ChannelSink, mpsc::UnboundedReceiver<StatusEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}

impl StatusSink for ChannelSink {
    fn publish(&self, event: &StatusEvent) {
        // A dropped receiver only means nobody is watching.
        let _ = self.tx.send(event.clone());
    }
}

/// Renders transitions through the ui event stream.
pub struct LogSink;

impl StatusSink for LogSink {
    fn publish(&self, event: &StatusEvent) {
        let StatusEvent::Upsert(status) = event else {
            emit(Level::Debug, "wallpaper.status.reset", "Status cleared for new cycle", None);
            return;
        };
        let data = serde_json::to_value(status).ok();
        let code = format!("wallpaper.status.{}", status.stage);
        match (&status.stage, &status.error) {
            (Stage::Error, Some(err)) => emit(
                Level::Error,
                &code,
                &format!("[{}] error: {}", status.monitor_id, err),
                data,
            ),
            (Stage::Success, _) => emit(
                Level::Success,
                &code,
                &format!("[{}] success", status.monitor_id),
                data,
            ),
            (Stage::Pending, _) => emit(
                Level::Debug,
                &code,
                &format!("[{}] pending", status.monitor_id),
                data,
            ),
            (stage, _) => emit(
                Level::Info,
                &code,
                &format!("[{}] {}", status.monitor_id, stage),
                data,
            ),
        }
    }
}

/// Fans one event out to several sinks.
pub struct FanoutSink(pub Vec<Arc<dyn StatusSink>>);

impl StatusSink for FanoutSink {
    fn publish(&self, event: &StatusEvent) {
        for sink in &self.0 {
            sink.publish(event);
        }
    }
}

/// Writer side, owned by a single cycle.
pub struct StatusBoard {
    records: Vec<WallpaperStatus>,
    sink: Arc<dyn StatusSink>,
}

impl StatusBoard {
    /// Clears consumers and creates a `pending` record for every monitor.
    pub fn begin(sink: Arc<dyn StatusSink>, monitors: &[Monitor]) -> Self {
        sink.publish(&StatusEvent::Reset);
        let now = Utc::now();
        let records: Vec<WallpaperStatus> = monitors
            .iter()
            .map(|m| WallpaperStatus {
                monitor_id: m.id.clone(),
                stage: Stage::Pending,
                error: None,
                updated_at: now,
            })
            .collect();
        for record in &records {
            sink.publish(&StatusEvent::Upsert(record.clone()));
        }
        Self { records, sink }
    }

    pub fn advance(&mut self, monitor_id: &str, stage: Stage) -> bool {
        self.transition(monitor_id, stage, None)
    }

    pub fn fail(&mut self, monitor_id: &str, error: impl Into<String>) -> bool {
        self.transition(monitor_id, Stage::Error, Some(error.into()))
    }

    fn transition(&mut self, monitor_id: &str, stage: Stage, error: Option<String>) -> bool {
        let Some(record) = self.records.iter_mut().find(|r| r.monitor_id == monitor_id) else {
            emit(
                Level::Debug,
                "wallpaper.status.unknown",
                &format!("Ignoring status for unknown monitor {monitor_id}"),
                None,
            );
            return false;
        };

        if !record.stage.can_advance_to(stage) {
            emit(
                Level::Debug,
                "wallpaper.status.regression",
                &format!(
                    "Ignoring {} -> {} for monitor {}",
                    record.stage, stage, monitor_id
                ),
                None,
            );
            return false;
        }

        record.stage = stage;
        record.error = error;
        record.updated_at = Utc::now();
        self.sink.publish(&StatusEvent::Upsert(record.clone()));
        true
    }

    pub fn stage_of(&self, monitor_id: &str) -> Option<Stage> {
        self.records
            .iter()
            .find(|r| r.monitor_id == monitor_id)
            .map(|r| r.stage)
    }

    pub fn records(&self) -> &[WallpaperStatus] {
        &self.records
    }

    pub fn into_records(self) -> Vec<WallpaperStatus> {
        self.records
    }
}

/// Consumer side: folds the event stream into the latest record per monitor.
#[derive(Debug, Default, Clone)]
pub struct StatusView {
    records: Vec<WallpaperStatus>,
}

impl StatusView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: StatusEvent) {
        match event {
            StatusEvent::Reset => self.records.clear(),
            StatusEvent::Upsert(status) => {
                match self
                    .records
                    .iter_mut()
                    .find(|r| r.monitor_id == status.monitor_id)
                {
                    Some(existing) => *existing = status,
                    None => self.records.push(status),
                }
            }
        }
    }

    pub fn get(&self, monitor_id: &str) -> Option<&WallpaperStatus> {
        self.records.iter().find(|r| r.monitor_id == monitor_id)
    }

    pub fn records(&self) -> &[WallpaperStatus] {
        &self.records
    }

    pub fn dismiss(&mut self) {
        self.records.clear();
    }
}
