//! Test-only runners and git fixtures.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::io::process::{CommandOutcome, CommandRunner};

/// Runner that replays queued outcomes per git verb instead of spawning processes.
///
/// Outcomes are keyed by `argv[1]` (`add`, `commit`, `pull`, `push`). A verb
/// with no queued outcome succeeds with empty output. Every call is recorded,
/// and the runner tracks how many calls overlapped.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, VecDeque<CommandOutcome>>>,
    calls: Mutex<Vec<Vec<String>>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every call, simulating slow disk or network.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Queue the outcome returned by the next unscripted call to `verb`.
    pub fn script(&self, verb: &str, outcome: CommandOutcome) -> &Self {
        lock(&self.scripts)
            .entry(verb.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }

    /// Recorded calls whose verb is `verb`.
    pub fn calls_for(&self, verb: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|argv| argv.get(1).map(String::as_str) == Some(verb))
            .collect()
    }

    /// Commit messages in the order the commits were attempted.
    pub fn commit_messages(&self) -> Vec<String> {
        self.calls_for("commit")
            .into_iter()
            .filter_map(|argv| argv.last().cloned())
            .collect()
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, argv: &[String], _workdir: &Path) -> CommandOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        lock(&self.calls).push(argv.to_vec());

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let verb = argv.get(1).cloned().unwrap_or_default();
        let outcome = lock(&self.scripts)
            .get_mut(&verb)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| CommandOutcome::ok(""));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A bare "remote" repository plus a working clone tracking `main`, in a temp dir.
pub struct GitFixture {
    _temp: TempDir,
    remote: PathBuf,
    work: PathBuf,
}

impl GitFixture {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let remote = temp.path().join("remote.git");
        let work = temp.path().join("work");

        git(temp.path(), &["init", "--bare", "remote.git"])?;
        git(temp.path(), &["clone", "remote.git", "work"])?;
        configure_identity(&work)?;

        fs::write(work.join("README.md"), "scores\n").context("write README")?;
        git(&work, &["add", "README.md"])?;
        git(&work, &["commit", "-m", "initial"])?;
        git(&work, &["branch", "-M", "main"])?;
        git(&work, &["push", "-u", "origin", "main"])?;
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"])?;

        Ok(Self {
            _temp: temp,
            remote,
            work,
        })
    }

    /// Working tree the sync engine operates on.
    pub fn work(&self) -> &Path {
        &self.work
    }

    pub fn remote(&self) -> &Path {
        &self.remote
    }

    pub fn write(&self, relative: &str, contents: &str) -> Result<()> {
        let path = self.work.join(relative);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Commit subjects on the remote's `main`, newest first.
    pub fn remote_subjects(&self) -> Result<Vec<String>> {
        subjects(&self.remote, "main")
    }

    /// Commit subjects on the working clone's HEAD, newest first.
    pub fn local_subjects(&self) -> Result<Vec<String>> {
        subjects(&self.work, "HEAD")
    }

    /// Push a commit touching `relative` from a second clone, moving the remote ahead.
    pub fn push_from_peer(&self, relative: &str, contents: &str, message: &str) -> Result<()> {
        let parent = self
            .remote
            .parent()
            .context("remote path missing parent")?;
        let peer = parent.join("peer");
        if !peer.exists() {
            git(parent, &["clone", "remote.git", "peer"])?;
            configure_identity(&peer)?;
        } else {
            git(&peer, &["pull", "--no-rebase", "--no-edit"])?;
        }
        fs::write(peer.join(relative), contents).context("write peer file")?;
        git(&peer, &["add", relative])?;
        git(&peer, &["commit", "-m", message])?;
        git(&peer, &["push", "origin", "main"])?;
        Ok(())
    }

    /// Revert the peer's latest commit and push the revert.
    pub fn revert_on_peer(&self) -> Result<()> {
        let peer = self
            .remote
            .parent()
            .context("remote path missing parent")?
            .join("peer");
        if !peer.exists() {
            bail!("no peer clone yet, call push_from_peer first");
        }
        git(&peer, &["pull", "--no-rebase", "--no-edit"])?;
        git(&peer, &["revert", "--no-edit", "HEAD"])?;
        git(&peer, &["push", "origin", "main"])?;
        Ok(())
    }

    /// True while the working clone is stuck in an unfinished merge.
    pub fn merge_in_progress(&self) -> bool {
        self.work.join(".git").join("MERGE_HEAD").exists()
    }

    /// `git status --porcelain` of the working clone.
    pub fn status(&self) -> Result<String> {
        git(&self.work, &["status", "--porcelain"])
    }

    /// Point `origin` somewhere unreachable (or back) to simulate network failures.
    pub fn set_origin_url(&self, url: &Path) -> Result<()> {
        let url = url.to_string_lossy();
        git(&self.work, &["remote", "set-url", "origin", url.as_ref()])?;
        Ok(())
    }

    /// Install an executable pre-commit hook with the given shell body.
    #[cfg(unix)]
    pub fn install_pre_commit_hook(&self, body: &str) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let hooks = self.work.join(".git").join("hooks");
        fs::create_dir_all(&hooks).context("create hooks dir")?;
        let path = hooks.join("pre-commit");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).context("write hook")?;
        let mut perms = fs::metadata(&path).context("stat hook")?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).context("chmod hook")?;
        Ok(())
    }
}

fn configure_identity(repo: &Path) -> Result<()> {
    git(repo, &["config", "user.email", "scores@example.com"])?;
    git(repo, &["config", "user.name", "Scoreboard Tests"])?;
    git(repo, &["config", "commit.gpgsign", "false"])?;
    Ok(())
}

fn subjects(repo: &Path, rev: &str) -> Result<Vec<String>> {
    let out = git(repo, &["log", "--format=%s", rev])?;
    Ok(out.lines().map(str::to_string).collect())
}

fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
