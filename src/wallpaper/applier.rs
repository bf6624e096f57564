//! Workspace applier
//!
//! The host reports one "desktop" per workspace per monitor. Desktops are
//! grouped by display name in first-occurrence order and that order is the
//! monitor index, which must line up with the order monitors were detected
//! in. Every desktop in a group gets that monitor's image in a single
//! automation call; the preference store is then patched so workspaces that
//! are not currently visible pick the image up on the next switch.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::automation::{DesktopAutomation, DesktopEntry, PictureAssignment, PicturePlan};
use super::store::{PreferenceStore, StoreOutcome};
use crate::ui::{Level, emit};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApplyError {
    #[error("wallpaper script failed: {0}")]
    ScriptExecutionFailed(String),

    #[error("wallpaper script did not finish within {}s", .0.as_secs())]
    ScriptTimedOut(Duration),
}

/// One monitor's slot in the aggregate call, in detection order.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyTarget {
    pub monitor_id: String,
    /// `None` when the crop for this monitor failed.
    pub output_path: Option<PathBuf>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "result", content = "reason", rename_all = "lowercase")]
pub enum MonitorOutcome {
    Applied,
    /// Nothing to apply; the monitor had no image this cycle.
    Skipped,
    Failed(String),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum StoreReport {
    NotAttempted,
    Missing,
    Updated { displays: usize, rows: usize },
    Failed { reason: String },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub outcomes: Vec<(String, MonitorOutcome)>,
    pub store: StoreReport,
}

impl ApplyReport {
    /// True iff every monitor that had an image ended up applied.
    pub fn succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, o)| !matches!(o, MonitorOutcome::Failed(_)))
    }

    pub fn outcome_for(&self, monitor_id: &str) -> Option<&MonitorOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == monitor_id)
            .map(|(_, o)| o)
    }
}

/// Receives the complete per-cycle target list exactly once.
#[async_trait]
pub trait WallpaperApplier: Send + Sync {
    async fn apply(&self, targets: &[ApplyTarget]) -> ApplyReport;
}

/// Desktops grouped by display name, first occurrence first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayGroups {
    pub display_names: Vec<String>,
    /// Group index for each desktop, parallel to the enumeration.
    pub desktop_group: Vec<usize>,
}

pub fn group_by_display(desktops: &[DesktopEntry]) -> DisplayGroups {
    let mut display_names: Vec<String> = Vec::new();
    let mut desktop_group = Vec::with_capacity(desktops.len());
    for desktop in desktops {
        let idx = match display_names.iter().position(|n| *n == desktop.display_name) {
            Some(idx) => idx,
            None => {
                display_names.push(desktop.display_name.clone());
                display_names.len() - 1
            }
        };
        desktop_group.push(idx);
    }
    DisplayGroups {
        display_names,
        desktop_group,
    }
}

/// Builds the single automation request. Desktops whose group has no path
/// are left out, so they keep whatever they show now.
pub fn plan_assignments(desktops: &[DesktopEntry], targets: &[ApplyTarget]) -> PicturePlan {
    let groups = group_by_display(desktops);
    let assignments = groups
        .desktop_group
        .iter()
        .enumerate()
        .filter_map(|(desktop_index, &group)| {
            let path = targets.get(group)?.output_path.as_ref()?;
            Some(PictureAssignment {
                desktop_index,
                path: path.clone(),
            })
        })
        .collect();
    PicturePlan {
        expected_desktops: desktops.len(),
        assignments,
    }
}

pub struct WorkspaceApplier {
    automation: Arc<dyn DesktopAutomation>,
    store: Option<Arc<dyn PreferenceStore>>,
}

impl WorkspaceApplier {
    pub fn new(automation: Arc<dyn DesktopAutomation>) -> Self {
        Self {
            automation,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn fail_all(targets: &[ApplyTarget], reason: &str) -> Vec<(String, MonitorOutcome)> {
        targets
            .iter()
            .map(|t| {
                let outcome = if t.output_path.is_some() {
                    MonitorOutcome::Failed(reason.to_string())
                } else {
                    MonitorOutcome::Skipped
                };
                (t.monitor_id.clone(), outcome)
            })
            .collect()
    }

    async fn update_store(&self, targets: &[ApplyTarget]) -> StoreReport {
        let Some(store) = self.store.clone() else {
            return StoreReport::NotAttempted;
        };
        let paths: BTreeMap<usize, PathBuf> = targets
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.output_path.clone().map(|p| (i, p)))
            .collect();

        let result = tokio::task::spawn_blocking(move || store.write_all_spaces(&paths)).await;
        match result {
            Ok(Ok(StoreOutcome::Missing)) => {
                emit(
                    Level::Debug,
                    "wallpaper.store.missing",
                    "No wallpaper preference database found; skipping",
                    None,
                );
                StoreReport::Missing
            }
            Ok(Ok(StoreOutcome::Updated { displays, rows })) => {
                emit(
                    Level::Debug,
                    "wallpaper.store.updated",
                    &format!("Updated {rows} preference rows across {displays} displays"),
                    None,
                );
                StoreReport::Updated { displays, rows }
            }
            Ok(Err(e)) => Self::store_warning(e.to_string()),
            Err(e) => Self::store_warning(format!("store task failed: {e}")),
        }
    }

    fn store_warning(reason: String) -> StoreReport {
        emit(
            Level::Warn,
            "wallpaper.store.failed",
            &format!("Could not update wallpaper preferences for inactive workspaces: {reason}"),
            None,
        );
        StoreReport::Failed { reason }
    }
}

#[async_trait]
impl WallpaperApplier for WorkspaceApplier {
    async fn apply(&self, targets: &[ApplyTarget]) -> ApplyReport {
        if targets.iter().all(|t| t.output_path.is_none()) {
            return ApplyReport {
                outcomes: Self::fail_all(targets, ""),
                store: StoreReport::NotAttempted,
            };
        }

        let desktops = match self.automation.list_desktops(targets.len()).await {
            Ok(desktops) => desktops,
            Err(e) => {
                return ApplyReport {
                    outcomes: Self::fail_all(targets, &e.to_string()),
                    store: StoreReport::NotAttempted,
                };
            }
        };

        let plan = plan_assignments(&desktops, targets);
        emit(
            Level::Debug,
            "wallpaper.apply.plan",
            &format!(
                "{} desktops, {} assignments via {}",
                plan.expected_desktops,
                plan.assignments.len(),
                self.automation.name()
            ),
            None,
        );

        if !plan.assignments.is_empty()
            && let Err(e) = self.automation.set_pictures(&plan).await
        {
            emit(
                Level::Error,
                "wallpaper.apply.script_failed",
                &e.to_string(),
                None,
            );
            return ApplyReport {
                outcomes: Self::fail_all(targets, &e.to_string()),
                store: StoreReport::NotAttempted,
            };
        }

        let groups = group_by_display(&desktops);
        let outcomes = targets
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let outcome = match &t.output_path {
                    None => MonitorOutcome::Skipped,
                    Some(_) if i < groups.display_names.len() => MonitorOutcome::Applied,
                    Some(_) => MonitorOutcome::Failed(format!(
                        "no workspace reported for display index {i}"
                    )),
                };
                (t.monitor_id.clone(), outcome)
            })
            .collect();

        let store = self.update_store(targets).await;
        ApplyReport { outcomes, store }
    }
}
