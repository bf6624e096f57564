//! Persisted per-workspace wallpaper preferences (`desktoppicture.db`).
//!
//! The Dock reads this database lazily when the user switches workspaces, so
//! patching it reaches workspaces the live script cannot. Everything here is
//! best-effort: callers log failures and move on.

use rusqlite::{Connection, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("preference database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// No database on this machine; nothing to do.
    Missing,
    Updated { displays: usize, rows: usize },
}

pub trait PreferenceStore: Send + Sync {
    /// Points every workspace of display `i` at `paths[i]`.
    fn write_all_spaces(
        &self,
        paths: &BTreeMap<usize, PathBuf>,
    ) -> Result<StoreOutcome, StoreError>;
}

pub struct DesktopPictureDb {
    path: PathBuf,
}

impl DesktopPictureDb {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// XML property list holding a single `BackgroundFilePath` entry.
pub fn background_plist(image_path: &Path) -> Vec<u8> {
    let escaped = image_path
        .to_string_lossy()
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" ",
            "\"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
            "<plist version=\"1.0\">\n",
            "<dict>\n",
            "\t<key>BackgroundFilePath</key>\n",
            "\t<string>{}</string>\n",
            "</dict>\n",
            "</plist>\n"
        ),
        escaped
    )
    .into_bytes()
}

impl PreferenceStore for DesktopPictureDb {
    fn write_all_spaces(
        &self,
        paths: &BTreeMap<usize, PathBuf>,
    ) -> Result<StoreOutcome, StoreError> {
        if !self.path.exists() {
            return Ok(StoreOutcome::Missing);
        }

        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;

        let display_rows: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT rowid FROM displays ORDER BY rowid")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        let mut displays = 0;
        let mut rows_written = 0;
        for (display_idx, display_id) in display_rows.iter().enumerate() {
            let Some(image_path) = paths.get(&display_idx) else {
                continue;
            };
            let plist = background_plist(image_path);

            let data_ids: Vec<i64> = {
                let mut stmt =
                    tx.prepare("SELECT DISTINCT data_id FROM preferences WHERE display_id = ?1")?;
                let rows = stmt.query_map(params![display_id], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };

            if data_ids.is_empty() {
                tx.execute("INSERT INTO data (value) VALUES (?1)", params![plist])?;
                let data_id = tx.last_insert_rowid();

                let space_ids: Vec<i64> = {
                    let mut stmt = tx.prepare("SELECT rowid FROM spaces WHERE display_id = ?1")?;
                    let rows = stmt.query_map(params![display_id], |row| row.get(0))?;
                    rows.collect::<Result<_, _>>()?
                };
                for space_id in space_ids {
                    rows_written += tx.execute(
                        "INSERT OR REPLACE INTO preferences (display_id, space_id, data_id) \
                         VALUES (?1, ?2, ?3)",
                        params![display_id, space_id, data_id],
                    )?;
                }
            } else {
                for data_id in data_ids {
                    rows_written += tx.execute(
                        "UPDATE data SET value = ?1 WHERE rowid = ?2",
                        params![plist, data_id],
                    )?;
                }
            }
            displays += 1;
        }

        tx.commit()?;
        Ok(StoreOutcome::Updated {
            displays,
            rows: rows_written,
        })
    }
}
