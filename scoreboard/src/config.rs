//! Scoreboard configuration stored in `scoreboard.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use engine::SyncConfig;
use serde::{Deserialize, Serialize};

use crate::ledger::is_valid_player_name;
use crate::store::write_atomic;

/// Scoreboard configuration (TOML).
///
/// Meant to be edited by hand. Missing fields default to values that keep
/// both documents in the current directory and sync them through `git`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScoreboardConfig {
    /// Git working tree holding the score documents.
    pub data_dir: PathBuf,

    /// Totals document, relative to `data_dir`.
    pub totals_file: PathBuf,

    /// Weekly document, relative to `data_dir`.
    pub weekly_file: PathBuf,

    /// Players present from the start, in display order.
    pub roster: Vec<String>,

    /// Required by `reset`. Resets are refused while unset.
    pub reset_password: Option<String>,

    /// Commit and push every mutation. Off means local writes only.
    pub sync_enabled: bool,

    pub sync: SyncConfig,
}

impl Default for ScoreboardConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            totals_file: PathBuf::from("stats_totals.json"),
            weekly_file: PathBuf::from("stats_weekly.json"),
            roster: Vec::new(),
            reset_password: None,
            sync_enabled: true,
            sync: SyncConfig::default(),
        }
    }
}

impl ScoreboardConfig {
    pub fn validate(&self) -> Result<()> {
        for (label, file) in [
            ("totals_file", &self.totals_file),
            ("weekly_file", &self.weekly_file),
        ] {
            if file.as_os_str().is_empty() {
                return Err(anyhow!("{label} must be non-empty"));
            }
            if file.is_absolute() {
                return Err(anyhow!("{label} must be relative to data_dir"));
            }
        }
        if self.totals_file == self.weekly_file {
            return Err(anyhow!("totals_file and weekly_file must differ"));
        }
        if let Some(bad) = self.roster.iter().find(|name| !is_valid_player_name(name)) {
            return Err(anyhow!("roster entry '{bad}' must contain only letters"));
        }
        if self
            .reset_password
            .as_deref()
            .is_some_and(|password| password.trim().is_empty())
        {
            return Err(anyhow!("reset_password must be non-empty when set"));
        }
        self.sync.validate().context("invalid [sync] section")?;
        Ok(())
    }

    pub fn totals_path(&self) -> PathBuf {
        self.data_dir.join(&self.totals_file)
    }

    pub fn weekly_path(&self) -> PathBuf {
        self.data_dir.join(&self.weekly_file)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ScoreboardConfig::default()`.
pub fn load_config(path: &Path) -> Result<ScoreboardConfig> {
    if !path.exists() {
        let cfg = ScoreboardConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ScoreboardConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ScoreboardConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
