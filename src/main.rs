mod common;
mod ui;
mod wallpaper;

use clap::Parser;

use crate::ui::{Level, OutputFormat, emit};
use crate::wallpaper::cli::WallpaperCommands;

/// Spread one photo across every monitor as a single continuous wallpaper
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: WallpaperCommands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    ui::init(cli.format, !cli.no_color);
    ui::set_debug_mode(cli.debug);

    match wallpaper::commands::handle_wallpaper_command(cli.command, cli.debug).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            emit(Level::Error, "wallcraft.error", &format!("{e:#}"), None);
            std::process::exit(1);
        }
    }
}
