//! OS automation adapters.
//!
//! `SystemEventsAutomation` talks to macOS System Events through generated
//! AppleScript run by `osascript`. All string escaping for the script lives
//! here; callers only deal in typed plans.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

use super::applier::ApplyError;
use crate::ui::{Level, emit};

pub const SCRIPT_FILE_NAME: &str = "set_wallpaper.applescript";
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(20);

/// One workspace on one display, in host enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PictureAssignment {
    /// Zero-based position in the desktop enumeration.
    pub desktop_index: usize,
    pub path: PathBuf,
}

/// A complete "set every desktop's picture" request.
#[derive(Debug, Clone, PartialEq)]
pub struct PicturePlan {
    /// Desktop count seen when the plan was built; the host rejects the plan
    /// if its workspace layout changed in between.
    pub expected_desktops: usize,
    pub assignments: Vec<PictureAssignment>,
}

#[async_trait]
pub trait DesktopAutomation: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every desktop the host knows about. Adapters that cannot enumerate
    /// report one desktop per display using `display_hint`.
    async fn list_desktops(&self, display_hint: usize) -> Result<Vec<DesktopEntry>, ApplyError>;

    async fn set_pictures(&self, plan: &PicturePlan) -> Result<(), ApplyError>;
}

/// Quotes a string as an AppleScript string literal.
pub fn applescript_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

pub const LIST_DESKTOPS_SCRIPT: &str = r#"tell application "System Events"
  set out to ""
  repeat with d in every desktop
    set out to out & (display name of d) & linefeed
  end repeat
  return out
end tell"#;

pub fn render_set_pictures_script(plan: &PicturePlan) -> String {
    let mut script = String::from("tell application \"System Events\"\n");
    script.push_str("  set allDesktops to every desktop\n");
    script.push_str(&format!(
        "  if (count of allDesktops) is not {} \
         then error \"workspace layout changed during apply\"\n",
        plan.expected_desktops
    ));
    for a in &plan.assignments {
        script.push_str(&format!(
            "  tell item {} of allDesktops to set picture to POSIX file {}\n",
            a.desktop_index + 1,
            applescript_string(&a.path.to_string_lossy())
        ));
    }
    script.push_str("end tell\n");
    script
}

/// Every name in the listing ends with a linefeed and `osascript` adds one more
/// after the result. Only that final newline is dropped; blank names stay so
/// desktop indices match System Events.
pub fn parse_desktop_listing(stdout: &str) -> Vec<DesktopEntry> {
    let body = stdout.strip_suffix('\n').unwrap_or(stdout);
    body.split_terminator('\n')
        .map(|l| DesktopEntry {
            display_name: l.strip_suffix('\r').unwrap_or(l).to_string(),
        })
        .collect()
}

pub struct SystemEventsAutomation {
    program: PathBuf,
    script_dir: PathBuf,
    timeout: Duration,
}

impl SystemEventsAutomation {
    pub fn new(script_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("osascript"),
            script_dir: script_dir.into(),
            timeout,
        }
    }

    /// Runs scripts through `program` instead of `osascript`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn script_path(&self) -> PathBuf {
        self.script_dir.join(SCRIPT_FILE_NAME)
    }

    pub fn is_available() -> bool {
        cfg!(target_os = "macos") && which::which("osascript").is_ok()
    }

    async fn run_osascript(&self, mut cmd: Command) -> Result<Output, ApplyError> {
        cmd.kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ApplyError::ScriptTimedOut(self.timeout))?
            .map_err(|e| {
                ApplyError::ScriptExecutionFailed(format!(
                    "could not run {}: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ApplyError::ScriptExecutionFailed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }

    async fn write_script(&self, path: &Path, script: &str) -> Result<(), ApplyError> {
        let err = |e: std::io::Error| {
            ApplyError::ScriptExecutionFailed(format!("could not write {}: {e}", path.display()))
        };
        tokio::fs::create_dir_all(&self.script_dir).await.map_err(err)?;
        tokio::fs::write(path, script).await.map_err(err)
    }
}

#[async_trait]
impl DesktopAutomation for SystemEventsAutomation {
    fn name(&self) -> &'static str {
        "System Events"
    }

    async fn list_desktops(&self, _display_hint: usize) -> Result<Vec<DesktopEntry>, ApplyError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-e").arg(LIST_DESKTOPS_SCRIPT);
        let output = self.run_osascript(cmd).await?;
        let desktops = parse_desktop_listing(&String::from_utf8_lossy(&output.stdout));
        if desktops.is_empty() {
            return Err(ApplyError::ScriptExecutionFailed(
                "System Events reported no desktops".to_string(),
            ));
        }
        Ok(desktops)
    }

    async fn set_pictures(&self, plan: &PicturePlan) -> Result<(), ApplyError> {
        let path = self.script_path();
        self.write_script(&path, &render_set_pictures_script(plan)).await?;

        let mut cmd = Command::new(&self.program);
        cmd.arg(&path);
        self.run_osascript(cmd).await?;
        Ok(())
    }
}

/// Reports what would be applied without touching the host.
pub struct LogOnlyAutomation;

#[async_trait]
impl DesktopAutomation for LogOnlyAutomation {
    fn name(&self) -> &'static str {
        "log only"
    }

    async fn list_desktops(&self, display_hint: usize) -> Result<Vec<DesktopEntry>, ApplyError> {
        Ok((0..display_hint)
            .map(|i| DesktopEntry {
                display_name: format!("Display {}", i + 1),
            })
            .collect())
    }

    async fn set_pictures(&self, plan: &PicturePlan) -> Result<(), ApplyError> {
        for a in &plan.assignments {
            emit(
                Level::Info,
                "wallpaper.apply.dry_run",
                &format!("Screen {}: {}", a.desktop_index, a.path.display()),
                None,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_backslashes_and_double_quotes() {
        assert_eq!(applescript_string("plain"), "\"plain\"");
        assert_eq!(
            applescript_string(r#"/Users/a "b"/c\d.jpg"#),
            r#""/Users/a \"b\"/c\\d.jpg""#
        );
    }

    #[test]
    fn script_sets_each_planned_desktop_with_one_based_indices() {
        let plan = PicturePlan {
            expected_desktops: 3,
            assignments: vec![
                PictureAssignment {
                    desktop_index: 0,
                    path: PathBuf::from("/w/wallpaper_a.jpg"),
                },
                PictureAssignment {
                    desktop_index: 2,
                    path: PathBuf::from("/w/it's \"here\".jpg"),
                },
            ],
        };
        let script = render_set_pictures_script(&plan);
        assert!(script.starts_with("tell application \"System Events\"\n"));
        assert!(script.contains("(count of allDesktops) is not 3"));
        assert!(script.contains(
            "tell item 1 of allDesktops to set picture to POSIX file \"/w/wallpaper_a.jpg\""
        ));
        assert!(script.contains(
            "tell item 3 of allDesktops to set picture to POSIX file \"/w/it's \\\"here\\\".jpg\""
        ));
        assert!(!script.contains("item 2 of"));
        assert!(script.trim_end().ends_with("end tell"));
    }

    fn names(listing: &str) -> Vec<String> {
        parse_desktop_listing(listing)
            .into_iter()
            .map(|d| d.display_name)
            .collect()
    }

    #[test]
    fn parses_listing_lines_in_order() {
        let listing = "Built-in Retina Display\nDELL U2720Q\nBuilt-in Retina Display\n\n";
        assert_eq!(
            names(listing),
            vec!["Built-in Retina Display", "DELL U2720Q", "Built-in Retina Display"]
        );
    }

    #[test]
    fn blank_display_names_keep_their_desktop_slot() {
        assert_eq!(names("A\n\nB\n\n"), vec!["A", "", "B"]);
        assert_eq!(names("A\nB\n\n\n"), vec!["A", "B", ""]);
        assert_eq!(names("\n\n"), vec![""]);
        assert!(names("\n").is_empty());
    }

    #[test]
    fn surrounding_whitespace_is_part_of_the_name() {
        assert_eq!(names(" A\nA \r\n\n"), vec![" A", "A "]);
    }

    #[tokio::test]
    async fn log_only_synthesizes_one_desktop_per_display() {
        let desktops = LogOnlyAutomation.list_desktops(3).await.unwrap();
        assert_eq!(desktops.len(), 3);
        assert_eq!(desktops[2].display_name, "Display 3");
    }

    #[tokio::test]
    async fn slow_script_is_cut_off_at_the_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let automation = SystemEventsAutomation::new(dir.path(), Duration::from_millis(100))
            .with_program("sleep");

        let mut cmd = Command::new(&automation.program);
        cmd.arg("5");
        let started = std::time::Instant::now();
        let err = automation.run_osascript(cmd).await.unwrap_err();

        assert!(matches!(err, ApplyError::ScriptTimedOut(t) if t == Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_script_failure() {
        let dir = tempfile::tempdir().unwrap();
        let automation =
            SystemEventsAutomation::new(dir.path(), Duration::from_secs(10)).with_program("sh");
        let plan = PicturePlan {
            expected_desktops: 1,
            assignments: vec![PictureAssignment {
                desktop_index: 0,
                path: PathBuf::from("/w/wallpaper_A.jpg"),
            }],
        };

        // sh cannot run AppleScript, so the written script exits non-zero.
        let err = automation.set_pictures(&plan).await.unwrap_err();
        match err {
            ApplyError::ScriptExecutionFailed(msg) => assert!(msg.starts_with("sh exited with")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(automation.script_path().exists());
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_script_failure() {
        let dir = tempfile::tempdir().unwrap();
        let automation = SystemEventsAutomation::new(dir.path(), Duration::from_secs(10))
            .with_program(dir.path().join("no-such-osascript"));

        let err = automation.list_desktops(1).await.unwrap_err();
        assert!(matches!(err, ApplyError::ScriptExecutionFailed(m) if m.contains("could not run")));
    }
}
