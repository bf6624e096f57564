use clap::{Args, Subcommand};
use std::path::PathBuf;

use super::scheduler::UpdateInterval;

#[derive(Subcommand, Debug, Clone)]
pub enum WallpaperCommands {
    /// Download a photo and spread it across all monitors
    Apply(ApplyArgs),
    /// Show the crop every monitor would get, without downloading anything
    Plan(PlanArgs),
    /// List the monitor layout and the virtual desktop it spans
    Screens(ScreensArgs),
    /// Re-apply the configured photo on the configured interval until interrupted
    Schedule(ScheduleArgs),
    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct MonitorArgs {
    /// Monitor as id:X,Y:WxH[@scale]; repeat for every display
    #[arg(short, long = "monitor", value_name = "SPEC")]
    pub monitors: Vec<String>,

    /// JSON file with the monitor layout
    #[arg(long = "monitors", value_name = "FILE")]
    pub monitors_file: Option<PathBuf>,

    /// Save the resolved layout as the default monitors file
    #[arg(long)]
    pub save: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Direct image URL (http(s):// or file://)
    pub url: String,

    #[command(flatten)]
    pub monitors: MonitorArgs,

    /// Log what would be set instead of touching the desktop
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Source image size as WxH
    #[arg(long, value_name = "WxH")]
    pub source: String,

    #[command(flatten)]
    pub monitors: MonitorArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ScreensArgs {
    #[command(flatten)]
    pub monitors: MonitorArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ScheduleArgs {
    /// Photo URL; defaults to `source_url` from the config
    #[arg(long)]
    pub url: Option<String>,

    /// Refresh interval; defaults to `update_interval` from the config
    #[arg(long, value_enum)]
    pub interval: Option<UpdateInterval>,

    #[command(flatten)]
    pub monitors: MonitorArgs,

    /// Log what would be set instead of touching the desktop
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Set how often `schedule` refreshes the wallpaper
    SetInterval {
        #[arg(value_enum)]
        interval: UpdateInterval,
    },
    /// Set the photo URL used by `schedule`
    SetUrl { url: String },
}
