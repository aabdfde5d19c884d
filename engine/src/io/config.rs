//! Sync engine configuration (the `[sync]` table of the application config).

use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::process::ProcessRunner;

/// Sync engine configuration (TOML).
///
/// Missing fields default to values that work against a plain `git` checkout
/// with an upstream branch configured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Program used for every version-control command.
    pub git_program: String,

    /// Wall-clock budget for a single git invocation, in seconds.
    pub command_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Total commit attempts when a pre-commit hook rewrites staged files.
    pub commit_attempts: u32,

    /// Phrases that identify a hook rewrite in `git commit` output.
    pub hook_rewrite_markers: Vec<String>,

    /// Remote to pull from and push to. When unset, git uses the upstream.
    pub remote: Option<String>,

    /// Branch paired with `remote`.
    pub branch: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            git_program: "git".to_string(),
            command_timeout_secs: 30,
            output_limit_bytes: 100_000,
            commit_attempts: 2,
            hook_rewrite_markers: vec!["files were modified by this hook".to_string()],
            remote: None,
            branch: None,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.git_program.trim().is_empty() {
            return Err(anyhow!("git_program must be non-empty"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.commit_attempts == 0 {
            return Err(anyhow!("commit_attempts must be >= 1"));
        }
        if self.remote.is_some() != self.branch.is_some() {
            return Err(anyhow!("remote and branch must be set together"));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Explicit `(remote, branch)` for pull/push, if configured.
    pub fn push_target(&self) -> Option<(&str, &str)> {
        match (&self.remote, &self.branch) {
            (Some(remote), Some(branch)) => Some((remote.as_str(), branch.as_str())),
            _ => None,
        }
    }

    /// Subprocess runner honoring this config's timeout and output limit.
    pub fn process_runner(&self) -> ProcessRunner {
        ProcessRunner::new(self.command_timeout(), self.output_limit_bytes)
    }
}
