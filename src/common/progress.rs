use indicatif::{ProgressBar, ProgressStyle};

use crate::ui::{self, OutputFormat};

pub fn create_spinner(message: String) -> ProgressBar {
    if !interactive() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
        pb.set_style(style.tick_chars("⠁⠉⠙⠚⠒⠂⠲⠴⠤⠄⠠⠦⠖⠐⠓⠋ "));
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Byte progress bar for downloads; falls back to a spinner when the
/// server does not announce a content length.
pub fn create_download_bar(total: Option<u64>, message: String) -> ProgressBar {
    let Some(total) = total else {
        return create_spinner(message);
    };
    if !interactive() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{msg} [{bar:30}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(message);
    pb
}

fn interactive() -> bool {
    ui::get_output_format() == OutputFormat::Text
}
