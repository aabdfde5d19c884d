//! Result of one sync transaction.
//!
//! Outcomes are informational: the local write that produced the change set
//! is authoritative, so nothing in the application rolls back on failure.

use std::fmt;

/// Transaction step that produced a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// The change set never reached the worker (worker stopped).
    Enqueue,
    /// `git add` failed for one of the files.
    Stage,
    /// `git commit` failed, or the hook kept rewriting files.
    Commit,
    /// `git push` was rejected or could not reach the remote.
    Push,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStep::Enqueue => "enqueue",
            SyncStep::Stage => "stage",
            SyncStep::Commit => "commit",
            SyncStep::Push => "push",
        };
        f.write_str(name)
    }
}

/// What the commit step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// No commit was created.
    NotCommitted,
    /// A commit was created after `attempts` tries (1 unless a hook rewrote files).
    Committed { attempts: u32 },
    /// Git reported nothing to commit; treated as a successful no-op.
    NothingToCommit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub success: bool,
    /// Operator-facing notes: no-op commits, reconciliation trouble, failure text.
    pub diagnostic: Option<String>,
    pub failed_step: Option<SyncStep>,
    pub commit: CommitStatus,
}

impl SyncOutcome {
    pub fn succeeded(commit: CommitStatus, notes: Vec<String>) -> Self {
        Self {
            success: true,
            diagnostic: join_notes(notes),
            failed_step: None,
            commit,
        }
    }

    pub fn failed(
        step: SyncStep,
        commit: CommitStatus,
        mut notes: Vec<String>,
        reason: impl Into<String>,
    ) -> Self {
        notes.push(reason.into());
        Self {
            success: false,
            diagnostic: join_notes(notes),
            failed_step: Some(step),
            commit,
        }
    }

    /// Outcome reported when the worker can no longer accept or answer a request.
    pub fn worker_unavailable() -> Self {
        Self::failed(
            SyncStep::Enqueue,
            CommitStatus::NotCommitted,
            Vec::new(),
            "sync worker is not running",
        )
    }
}

fn join_notes(notes: Vec<String>) -> Option<String> {
    let notes: Vec<String> = notes
        .into_iter()
        .map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty())
        .collect();
    if notes.is_empty() {
        None
    } else {
        Some(notes.join("; "))
    }
}
