//! The unit of work submitted to the sync engine.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

/// Files written by one mutation plus the commit message describing it.
///
/// Paths are deduplicated on construction (first occurrence wins). A change
/// set is immutable once built and is consumed by exactly one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    files: Vec<PathBuf>,
    message: String,
}

impl ChangeSet {
    /// Build a change set, rejecting an empty file list or a blank message.
    pub fn new<I, P>(files: I, message: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let message = message.into();
        if message.trim().is_empty() {
            bail!("change set message must not be empty");
        }

        let mut unique: Vec<PathBuf> = Vec::new();
        for file in files {
            let file = file.into();
            if file.as_os_str().is_empty() {
                bail!("change set contains an empty path");
            }
            if !unique.contains(&file) {
                unique.push(file);
            }
        }
        if unique.is_empty() {
            bail!("change set must name at least one file");
        }

        Ok(Self {
            files: unique,
            message,
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True if `path` is part of this change set.
    pub fn contains(&self, path: &Path) -> bool {
        self.files.iter().any(|file| file == path)
    }
}
