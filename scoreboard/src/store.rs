//! Score documents on disk.
//!
//! Two flat JSON documents: totals (`player -> record`) and weekly
//! (`week key -> player -> record`). Missing files read as empty documents.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Win/loss counters for one player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub win: u32,
    #[serde(default)]
    pub lose: u32,
}

impl Record {
    pub fn games(&self) -> u32 {
        self.win.saturating_add(self.lose)
    }

    /// Percentage of games won, 0 when no games were played.
    pub fn win_rate(&self) -> f64 {
        match self.games() {
            0 => 0.0,
            games => f64::from(self.win) * 100.0 / f64::from(games),
        }
    }
}

/// Player name -> counters.
pub type Standings = BTreeMap<String, Record>;

/// Week key -> standings for that week.
pub type WeeklyStandings = BTreeMap<String, Standings>;

pub fn load_standings(path: &Path) -> Result<Standings> {
    load_or_default(path)
}

pub fn load_weekly(path: &Path) -> Result<WeeklyStandings> {
    load_or_default(path)
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        debug!(path = %path.display(), "document missing, starting empty");
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Atomically write `value` as pretty JSON with a trailing newline (temp file + rename).
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Replace `path` with `contents` through a sibling temp file and a rename,
/// creating the parent directory if needed.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_extension = match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    };
    let tmp_path = path.with_extension(tmp_extension);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    debug!(path = %path.display(), bytes = contents.len(), "file written");
    Ok(())
}
