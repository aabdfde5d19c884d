//! One add → commit → pull → push cycle for a single change set.
//!
//! The transaction owns the working tree for its whole duration; callers must
//! never run two at once against the same checkout (see [`crate::queue`]).
//!
//! Failure policy per step:
//!
//! | step   | on failure                                                        |
//! |--------|-------------------------------------------------------------------|
//! | stage  | abort, nothing is committed                                       |
//! | commit | "nothing to commit" is a no-op; hook rewrite re-stages and retries |
//! | pull   | any partial merge is aborted, then logged; the push decides       |
//! | push   | reported; the local commit stays and rides along with the next push |

use tracing::{debug, info, instrument, warn};

use crate::core::change_set::ChangeSet;
use crate::core::outcome::{CommitStatus, SyncOutcome, SyncStep};
use crate::core::signature::{
    is_already_up_to_date, is_hook_rewrite, is_no_merge_in_progress, is_nothing_to_commit,
    summarize,
};
use crate::io::config::SyncConfig;
use crate::io::git::Git;
use crate::io::process::CommandRunner;

const LOG_EXCERPT_CHARS: usize = 240;

/// Hard failure of a step, carried back to [`run_sync`].
struct StepFailure {
    step: SyncStep,
    reason: String,
}

impl StepFailure {
    fn new(step: SyncStep, reason: impl Into<String>) -> Self {
        Self {
            step,
            reason: reason.into(),
        }
    }
}

/// Land `change_set` on the remote and report what happened.
///
/// Never panics and never returns an error: every failure is folded into the
/// returned [`SyncOutcome`].
#[instrument(skip_all, fields(message = %change_set.message(), files = change_set.files().len()))]
pub fn run_sync<R: CommandRunner>(
    git: &Git<R>,
    config: &SyncConfig,
    change_set: &ChangeSet,
) -> SyncOutcome {
    let mut notes = Vec::new();

    if let Err(failure) = stage_all(git, change_set) {
        return SyncOutcome::failed(
            failure.step,
            CommitStatus::NotCommitted,
            notes,
            failure.reason,
        );
    }

    let commit = match commit_with_retry(git, config, change_set) {
        Ok(commit) => commit,
        Err(failure) => {
            return SyncOutcome::failed(
                failure.step,
                CommitStatus::NotCommitted,
                notes,
                failure.reason,
            );
        }
    };
    if commit == CommitStatus::NothingToCommit {
        notes.push("nothing to commit".to_string());
    }

    if let Some(note) = reconcile(git) {
        notes.push(note);
    }

    let pushed = git.push();
    if !pushed.success {
        warn!(
            output = %summarize(&pushed.output, LOG_EXCERPT_CHARS),
            "push failed, local commit kept for the next sync"
        );
        return SyncOutcome::failed(
            SyncStep::Push,
            commit,
            notes,
            format!("push failed: {}", pushed.output.trim()),
        );
    }

    info!(workdir = %git.workdir().display(), ?commit, "sync completed");
    SyncOutcome::succeeded(commit, notes)
}

/// Stage every file individually; the first failure aborts.
fn stage_all<R: CommandRunner>(git: &Git<R>, change_set: &ChangeSet) -> Result<(), StepFailure> {
    for file in change_set.files() {
        let staged = git.add(file);
        if !staged.success {
            warn!(
                file = %file.display(),
                output = %summarize(&staged.output, LOG_EXCERPT_CHARS),
                "staging failed"
            );
            return Err(StepFailure::new(
                SyncStep::Stage,
                format!("add {} failed: {}", file.display(), staged.output.trim()),
            ));
        }
    }
    debug!(files = change_set.files().len(), "staged change set");
    Ok(())
}

/// Commit, re-staging and retrying while a hook keeps rewriting files.
fn commit_with_retry<R: CommandRunner>(
    git: &Git<R>,
    config: &SyncConfig,
    change_set: &ChangeSet,
) -> Result<CommitStatus, StepFailure> {
    let budget = config.commit_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let committed = git.commit(change_set.message());
        if committed.success {
            debug!(attempts, "commit created");
            return Ok(CommitStatus::Committed { attempts });
        }
        if is_nothing_to_commit(&committed.output) {
            info!("nothing to commit, continuing with reconciliation");
            return Ok(CommitStatus::NothingToCommit);
        }
        if !is_hook_rewrite(&committed.output, &config.hook_rewrite_markers) {
            warn!(
                output = %summarize(&committed.output, LOG_EXCERPT_CHARS),
                "commit failed"
            );
            return Err(StepFailure::new(
                SyncStep::Commit,
                format!("commit failed: {}", committed.output.trim()),
            ));
        }
        if attempts >= budget {
            warn!(attempts, "pre-commit hook still rewriting files, giving up");
            return Err(StepFailure::new(
                SyncStep::Commit,
                format!(
                    "pre-commit hook rewrote files on all {attempts} commit attempts: {}",
                    committed.output.trim()
                ),
            ));
        }

        info!(attempts, "pre-commit hook rewrote files, re-staging");
        stage_all(git, change_set)?;
    }
}

/// Merge remote changes; returns a note when the pull did not go cleanly.
///
/// A conflicting pull leaves conflict markers in the working tree. The merge
/// is aborted so the committed documents stay intact, and the push still runs.
fn reconcile<R: CommandRunner>(git: &Git<R>) -> Option<String> {
    let pulled = git.pull_merge();
    if pulled.success {
        debug!("pulled remote changes");
        return None;
    }
    if is_already_up_to_date(&pulled.output) {
        info!("already up to date with remote");
        return None;
    }
    warn!(
        output = %summarize(&pulled.output, LOG_EXCERPT_CHARS),
        "pull failed, aborting any partial merge"
    );
    let mut note = format!("pull failed: {}", pulled.output.trim());

    let aborted = git.merge_abort();
    if aborted.success {
        info!("partial merge aborted, working tree restored");
        note.push_str("; merge aborted");
    } else if is_no_merge_in_progress(&aborted.output) {
        debug!("no merge in progress");
    } else {
        warn!(
            output = %summarize(&aborted.output, LOG_EXCERPT_CHARS),
            "merge abort failed"
        );
        note.push_str(&format!("; merge abort failed: {}", aborted.output.trim()));
    }
    Some(note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::process::CommandOutcome;
    use crate::test_support::ScriptedRunner;

    const HOOK_OUTPUT: &str = "prettier.................Failed\n- files were modified by this hook";

    fn change_set(message: &str) -> ChangeSet {
        ChangeSet::new(["a.json", "b.json"], message).expect("change set")
    }

    fn sync(runner: &ScriptedRunner, cs: &ChangeSet) -> SyncOutcome {
        let config = SyncConfig::default();
        let git = Git::new(runner, "/repo", &config);
        run_sync(&git, &config, cs)
    }

    #[test]
    fn clean_run_stages_commits_pulls_and_pushes() {
        let runner = ScriptedRunner::new();
        let outcome = sync(&runner, &change_set("win: X +1"));

        assert!(outcome.success);
        assert_eq!(outcome.commit, CommitStatus::Committed { attempts: 1 });
        assert_eq!(outcome.diagnostic, None);
        let verbs: Vec<String> = runner.calls().into_iter().map(|c| c[1].clone()).collect();
        assert_eq!(verbs, vec!["add", "add", "commit", "pull", "push"]);
        assert!(runner.calls_for("merge").is_empty());
    }

    #[test]
    fn staging_failure_aborts_before_commit() {
        let runner = ScriptedRunner::new();
        runner.script("add", CommandOutcome::ok(""));
        runner.script(
            "add",
            CommandOutcome::failed("fatal: pathspec 'b.json' did not match any files"),
        );

        let outcome = sync(&runner, &change_set("win: X +1"));

        assert!(!outcome.success);
        assert_eq!(outcome.failed_step, Some(SyncStep::Stage));
        assert_eq!(outcome.commit, CommitStatus::NotCommitted);
        assert!(runner.calls_for("commit").is_empty());
        assert!(runner.calls_for("push").is_empty());
    }

    #[test]
    fn nothing_to_commit_still_reconciles_and_pushes() {
        let runner = ScriptedRunner::new();
        runner.script(
            "commit",
            CommandOutcome::failed("On branch main\nnothing to commit, working tree clean"),
        );

        let outcome = sync(&runner, &change_set("win: X +1"));

        assert!(outcome.success);
        assert_eq!(outcome.commit, CommitStatus::NothingToCommit);
        assert!(
            outcome
                .diagnostic
                .as_deref()
                .is_some_and(|d| d.contains("nothing to commit"))
        );
        assert_eq!(runner.calls_for("pull").len(), 1);
        assert_eq!(runner.calls_for("push").len(), 1);
    }

    #[test]
    fn hook_rewrite_once_restages_and_retries() {
        let runner = ScriptedRunner::new();
        runner.script("commit", CommandOutcome::failed(HOOK_OUTPUT));

        let outcome = sync(&runner, &change_set("lose: Y +2"));

        assert!(outcome.success);
        assert_eq!(outcome.commit, CommitStatus::Committed { attempts: 2 });
        assert_eq!(runner.calls_for("commit").len(), 2);
        assert_eq!(runner.calls_for("add").len(), 4, "both files re-staged");
    }

    #[test]
    fn hook_rewrite_twice_fails_after_two_attempts() {
        let runner = ScriptedRunner::new();
        runner.script("commit", CommandOutcome::failed(HOOK_OUTPUT));
        runner.script("commit", CommandOutcome::failed(HOOK_OUTPUT));

        let outcome = sync(&runner, &change_set("lose: Y +2"));

        assert!(!outcome.success);
        assert_eq!(outcome.failed_step, Some(SyncStep::Commit));
        assert_eq!(runner.calls_for("commit").len(), 2);
        assert!(runner.calls_for("pull").is_empty());
        assert!(runner.calls_for("push").is_empty());
    }

    #[test]
    fn restage_failure_during_retry_is_fatal() {
        let runner = ScriptedRunner::new();
        runner.script("commit", CommandOutcome::failed(HOOK_OUTPUT));
        runner.script("add", CommandOutcome::ok(""));
        runner.script("add", CommandOutcome::ok(""));
        runner.script("add", CommandOutcome::failed("fatal: unable to index file"));

        let outcome = sync(&runner, &change_set("lose: Y +2"));

        assert!(!outcome.success);
        assert_eq!(outcome.failed_step, Some(SyncStep::Stage));
        assert_eq!(runner.calls_for("commit").len(), 1);
    }

    #[test]
    fn other_commit_failure_is_fatal_without_retry() {
        let runner = ScriptedRunner::new();
        runner.script(
            "commit",
            CommandOutcome::failed("fatal: unable to auto-detect email address"),
        );

        let outcome = sync(&runner, &change_set("win: X +1"));

        assert!(!outcome.success);
        assert_eq!(outcome.failed_step, Some(SyncStep::Commit));
        assert_eq!(runner.calls_for("commit").len(), 1);
        assert!(runner.calls_for("push").is_empty());
    }

    #[test]
    fn pull_conflict_is_aborted_noted_and_push_decides() {
        let runner = ScriptedRunner::new();
        runner.script(
            "pull",
            CommandOutcome::failed("CONFLICT (content): Merge conflict in a.json"),
        );

        let outcome = sync(&runner, &change_set("win: X +1"));

        assert!(outcome.success);
        let diagnostic = outcome.diagnostic.unwrap_or_default();
        assert!(diagnostic.contains("pull failed"), "{diagnostic}");
        assert!(diagnostic.contains("merge aborted"), "{diagnostic}");
        let verbs: Vec<String> = runner.calls().into_iter().map(|c| c[1].clone()).collect();
        assert_eq!(verbs, vec!["add", "add", "commit", "pull", "merge", "push"]);
    }

    #[test]
    fn unreachable_remote_has_no_merge_to_abort() {
        let runner = ScriptedRunner::new();
        runner.script("pull", CommandOutcome::failed("fatal: could not read from remote"));
        runner.script(
            "merge",
            CommandOutcome::failed("fatal: There is no merge to abort (MERGE_HEAD missing)."),
        );

        let outcome = sync(&runner, &change_set("win: X +1"));

        let diagnostic = outcome.diagnostic.unwrap_or_default();
        assert!(diagnostic.contains("pull failed"), "{diagnostic}");
        assert!(!diagnostic.contains("merge abort"), "{diagnostic}");
        assert_eq!(runner.calls_for("push").len(), 1);
    }

    #[test]
    fn failed_merge_abort_is_noted() {
        let runner = ScriptedRunner::new();
        runner.script("pull", CommandOutcome::failed("CONFLICT (content): Merge conflict"));
        runner.script("merge", CommandOutcome::failed("error: could not reset index"));

        let outcome = sync(&runner, &change_set("win: X +1"));

        assert!(
            outcome
                .diagnostic
                .as_deref()
                .is_some_and(|d| d.contains("merge abort failed: error: could not reset index"))
        );
    }

    #[test]
    fn already_up_to_date_pull_failure_is_not_noted() {
        let runner = ScriptedRunner::new();
        runner.script("pull", CommandOutcome::failed("Already up to date."));

        let outcome = sync(&runner, &change_set("win: X +1"));

        assert!(outcome.success);
        assert_eq!(outcome.diagnostic, None);
    }

    #[test]
    fn push_failure_keeps_commit_status() {
        let runner = ScriptedRunner::new();
        runner.script(
            "push",
            CommandOutcome::failed("! [rejected] main -> main (fetch first)"),
        );

        let outcome = sync(&runner, &change_set("win: X +1"));

        assert!(!outcome.success);
        assert_eq!(outcome.failed_step, Some(SyncStep::Push));
        assert_eq!(outcome.commit, CommitStatus::Committed { attempts: 1 });
        assert!(
            outcome
                .diagnostic
                .as_deref()
                .is_some_and(|d| d.contains("rejected"))
        );
    }

    #[test]
    fn single_attempt_budget_fails_on_first_hook_rewrite() {
        let runner = ScriptedRunner::new();
        runner.script("commit", CommandOutcome::failed(HOOK_OUTPUT));
        let config = SyncConfig {
            commit_attempts: 1,
            ..SyncConfig::default()
        };
        let git = Git::new(&runner, "/repo", &config);

        let outcome = run_sync(&git, &config, &change_set("win: X +1"));

        assert!(!outcome.success);
        assert_eq!(runner.calls_for("commit").len(), 1);
    }
}
