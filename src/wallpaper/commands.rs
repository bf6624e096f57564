use anyhow::{Context, Result, anyhow, bail};
use colored::*;
use std::sync::Arc;

use super::applier::WorkspaceApplier;
use super::automation::{DesktopAutomation, LogOnlyAutomation, SystemEventsAutomation};
use super::cli::{
    ApplyArgs, ConfigCommands, MonitorArgs, PlanArgs, ScheduleArgs, ScreensArgs, WallpaperCommands,
};
use super::config::WallpaperConfig;
use super::crop::{self, SourceImage};
use super::download::HttpImageSource;
use super::geometry::{self, Monitor};
use super::pipeline::{
    self, CycleOutcome, CycleState, Orchestrator, PipelineError, PipelineOptions,
};
use super::scheduler::{Scheduler, UpdateInterval};
use super::screens;
use super::status::{self, FanoutSink, LogSink, Stage, StatusSink, StatusView};
use super::store::DesktopPictureDb;
use crate::common::paths;
use crate::ui::prelude::*;

/// Returns whether the command reached its goal; `apply` maps this to the
/// exit status.
pub async fn handle_wallpaper_command(command: WallpaperCommands, debug: bool) -> Result<bool> {
    let config = WallpaperConfig::load()?;
    if debug {
        emit(
            Level::Debug,
            "wallpaper.config.loaded",
            &format!("Loaded {}", WallpaperConfig::config_file_path()?.display()),
            serde_json::to_value(&config).ok(),
        );
    }

    match command {
        WallpaperCommands::Apply(args) => handle_apply(&config, args).await,
        WallpaperCommands::Plan(args) => handle_plan(args),
        WallpaperCommands::Screens(args) => handle_screens(args),
        WallpaperCommands::Schedule(args) => handle_schedule(config, args).await,
        WallpaperCommands::Config { command } => handle_config(config, command),
    }
}

fn resolve_monitors(args: &MonitorArgs) -> Result<Vec<Monitor>> {
    let monitors = screens::resolve(&args.monitors, args.monitors_file.as_deref())?;
    if args.save {
        let path = paths::default_monitors_file()?;
        screens::save_file(&path, &monitors)?;
        emit(
            Level::Info,
            "wallpaper.screens.saved",
            &format!("Saved monitor layout to {}", path.display()),
            None,
        );
    }
    Ok(monitors)
}

fn select_automation(
    config: &WallpaperConfig,
    dry_run: bool,
    script_dir: &std::path::Path,
) -> (Arc<dyn DesktopAutomation>, bool) {
    if dry_run {
        return (Arc::new(LogOnlyAutomation), false);
    }
    if SystemEventsAutomation::is_available() {
        return (
            Arc::new(SystemEventsAutomation::new(script_dir, config.script_timeout())),
            true,
        );
    }
    emit(
        Level::Warn,
        "wallpaper.automation.unavailable",
        "System Events is not available on this host; wallpapers will only be logged",
        None,
    );
    (Arc::new(LogOnlyAutomation), false)
}

fn build_orchestrator(
    config: &WallpaperConfig,
    dry_run: bool,
    sink: Arc<dyn StatusSink>,
) -> Result<Orchestrator> {
    let output_dir = config.output_dir()?;
    let (automation, live) = select_automation(config, dry_run, &output_dir);
    emit(
        Level::Debug,
        "wallpaper.automation.selected",
        &format!("Using {} automation", automation.name()),
        None,
    );

    let mut applier = WorkspaceApplier::new(automation);
    if live
        && config.update_preference_store
        && let Some(db) = paths::desktop_picture_db()
    {
        applier = applier.with_store(Arc::new(DesktopPictureDb::new(db)));
    }

    let source = HttpImageSource::new(&config.user_agent)
        .context("setting up the photo downloader")?
        .with_progress(true);

    let options = PipelineOptions {
        output_dir,
        jpeg_quality: config.jpeg_quality,
        crop_concurrency: config
            .crop_concurrency
            .unwrap_or_else(pipeline::default_concurrency),
    };
    Ok(Orchestrator::new(
        Arc::new(source),
        Arc::new(applier),
        sink,
        options,
    ))
}

async fn handle_apply(config: &WallpaperConfig, args: ApplyArgs) -> Result<bool> {
    let monitors = resolve_monitors(&args.monitors)?;

    let (channel_sink, mut rx) = status::channel();
    let sinks: Vec<Arc<dyn StatusSink>> = vec![Arc::new(LogSink), Arc::new(channel_sink)];
    let sink: Arc<dyn StatusSink> = Arc::new(FanoutSink(sinks));
    let orchestrator = build_orchestrator(config, args.dry_run, sink)?;

    let outcome = orchestrator
        .apply_wallpaper(&args.url, monitors)
        .await
        .context("applying wallpaper")?;

    let mut view = StatusView::new();
    while let Ok(event) = rx.try_recv() {
        view.apply(event);
    }
    print_summary(&view, &outcome);
    view.dismiss();

    Ok(outcome.succeeded())
}

fn print_summary(view: &StatusView, outcome: &CycleOutcome) {
    if get_output_format() == OutputFormat::Json {
        emit(
            Level::Info,
            "wallpaper.apply.result",
            "Apply finished",
            serde_json::to_value(outcome).ok(),
        );
        return;
    }

    println!();
    for record in view.records() {
        let stage = match record.stage {
            Stage::Success => record.stage.as_str().green(),
            Stage::Error => record.stage.as_str().red(),
            _ => record.stage.as_str().yellow(),
        };
        match &record.error {
            Some(err) => println!(
                "  {:<16} {} {}",
                record.monitor_id.bold(),
                stage,
                err.dimmed()
            ),
            None => println!("  {:<16} {}", record.monitor_id.bold(), stage),
        }
    }

    let (level, message) = match outcome.state {
        CycleState::Success => (Level::Success, "Wallpaper applied to every monitor"),
        CycleState::Partial => (Level::Warn, "Wallpaper applied to some monitors"),
        CycleState::Failed => (Level::Error, "Wallpaper was not applied"),
    };
    emit(level, "wallpaper.apply.result", message, None);
}

fn parse_size(raw: &str) -> Result<(u32, u32)> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("source size must be WxH, got '{raw}'"))?;
    let w: u32 = w.trim().parse().with_context(|| format!("bad width in '{raw}'"))?;
    let h: u32 = h.trim().parse().with_context(|| format!("bad height in '{raw}'"))?;
    if w == 0 || h == 0 {
        bail!("source size must be non-zero, got '{raw}'");
    }
    Ok((w, h))
}

fn handle_plan(args: PlanArgs) -> Result<bool> {
    let (pixel_width, pixel_height) = parse_size(&args.source)?;
    let monitors = resolve_monitors(&args.monitors)?;
    let bounds = geometry::resolve_bounds(&monitors)?;
    let source = SourceImage {
        pixel_width,
        pixel_height,
    };

    emit(
        Level::Info,
        "wallpaper.plan.bounds",
        &format!(
            "Virtual desktop {bounds}, scale {:.4} source px per desktop px",
            crop::cover_scale(source, &bounds)
        ),
        serde_json::to_value(bounds).ok(),
    );
    for m in &monitors {
        let region = crop::compute_crop_region(source, &bounds, m);
        emit(
            Level::Info,
            "wallpaper.plan.monitor",
            &format!(
                "{} -> {} ({})",
                m.label().bold(),
                region,
                crop::output_file_name(&m.id)
            ),
            Some(serde_json::json!({ "monitorId": m.id, "region": region })),
        );
    }
    Ok(true)
}

fn handle_screens(args: ScreensArgs) -> Result<bool> {
    let monitors = resolve_monitors(&args.monitors)?;
    let bounds = geometry::resolve_bounds(&monitors)?;
    for m in &monitors {
        emit(
            Level::Info,
            "wallpaper.screens.monitor",
            &m.to_string(),
            serde_json::to_value(m).ok(),
        );
    }
    emit(
        Level::Info,
        "wallpaper.screens.bounds",
        &format!("Virtual desktop: {bounds}"),
        serde_json::to_value(bounds).ok(),
    );
    Ok(true)
}

async fn handle_schedule(config: WallpaperConfig, args: ScheduleArgs) -> Result<bool> {
    let url = args
        .url
        .or_else(|| config.source_url.clone())
        .context("no photo URL; pass --url or run `wallcraft config set-url`")?;
    let interval = args.interval.unwrap_or(config.update_interval);
    if interval == UpdateInterval::Manual {
        bail!("update interval is manual; pass --interval or run `wallcraft config set-interval`");
    }

    let orchestrator = Arc::new(build_orchestrator(&config, args.dry_run, Arc::new(LogSink))?);
    let monitor_args = args.monitors;

    let scheduler = Scheduler::new();
    scheduler.start_for(interval, move || {
        let orchestrator = Arc::clone(&orchestrator);
        let url = url.clone();
        let monitor_args = monitor_args.clone();
        async move { run_scheduled_cycle(&orchestrator, &url, &monitor_args).await }
    });

    emit(
        Level::Info,
        "wallpaper.schedule.started",
        &format!("Refreshing the wallpaper every {interval}; press Ctrl-C to stop"),
        None,
    );
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    scheduler.stop();
    emit(
        Level::Info,
        "wallpaper.schedule.stopped",
        "Scheduler stopped",
        None,
    );
    Ok(true)
}

async fn run_scheduled_cycle(orchestrator: &Orchestrator, url: &str, monitor_args: &MonitorArgs) {
    // Re-read the layout every tick so monitor changes are picked up.
    let resolved = screens::resolve(
        &monitor_args.monitors,
        monitor_args.monitors_file.as_deref(),
    );
    let monitors = match resolved {
        Ok(monitors) => monitors,
        Err(e) => {
            emit(
                Level::Error,
                "wallpaper.schedule.monitors",
                &format!("Skipping refresh: {e:#}"),
                None,
            );
            return;
        }
    };

    match orchestrator.apply_wallpaper(url, monitors).await {
        Ok(outcome) => emit(
            Level::Info,
            "wallpaper.schedule.tick",
            &format!("Scheduled refresh finished: {}", outcome.state.as_str()),
            serde_json::to_value(&outcome).ok(),
        ),
        Err(PipelineError::Busy) => emit(
            Level::Warn,
            "wallpaper.schedule.busy",
            "Previous refresh is still running; skipping this one",
            None,
        ),
        Err(e) => emit(
            Level::Error,
            "wallpaper.schedule.failed",
            &format!("Scheduled refresh failed: {e}"),
            None,
        ),
    }
}

fn handle_config(mut config: WallpaperConfig, command: ConfigCommands) -> Result<bool> {
    match command {
        ConfigCommands::Show => {
            let path = WallpaperConfig::config_file_path()?;
            if get_output_format() == OutputFormat::Json {
                emit(
                    Level::Info,
                    "wallpaper.config.show",
                    &path.display().to_string(),
                    serde_json::to_value(&config).ok(),
                );
            } else {
                println!("{}", format!("# {}", path.display()).dimmed());
                print!(
                    "{}",
                    toml::to_string_pretty(&config).context("serializing config to toml")?
                );
            }
        }
        ConfigCommands::SetInterval { interval } => {
            config.update_interval = interval;
            config.save()?;
            emit(
                Level::Success,
                "wallpaper.config.interval",
                &format!("Update interval set to {}", interval.to_string().green()),
                None,
            );
        }
        ConfigCommands::SetUrl { url } => {
            config.source_url = Some(url.clone());
            config.save()?;
            emit(
                Level::Success,
                "wallpaper.config.url",
                &format!("Photo URL set to {}", url.green()),
                None,
            );
        }
    }
    Ok(true)
}
