//! Git verbs used by the sync transaction.
//!
//! Every verb is a single subprocess call through a [`CommandRunner`], so the
//! transaction can be driven by real git or by a scripted runner in tests.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::io::config::SyncConfig;
use crate::io::process::{CommandOutcome, CommandRunner};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git<R> {
    runner: R,
    program: String,
    workdir: PathBuf,
    target: Option<(String, String)>,
}

impl<R: CommandRunner> Git<R> {
    pub fn new(runner: R, workdir: impl Into<PathBuf>, config: &SyncConfig) -> Self {
        Self {
            runner,
            program: config.git_program.clone(),
            workdir: workdir.into(),
            target: config
                .push_target()
                .map(|(remote, branch)| (remote.to_string(), branch.to_string())),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Stage a single path.
    pub fn add(&self, path: &Path) -> CommandOutcome {
        let path = path.to_string_lossy();
        self.run(&["add", "--", path.as_ref()])
    }

    /// Commit whatever is staged with `message`.
    pub fn commit(&self, message: &str) -> CommandOutcome {
        self.run(&["commit", "-m", message])
    }

    /// Fetch and merge the remote branch. Never rebases and never opens an editor.
    pub fn pull_merge(&self) -> CommandOutcome {
        let mut args = vec!["pull", "--no-rebase", "--no-edit"];
        if let Some((remote, branch)) = &self.target {
            args.push(remote);
            args.push(branch);
        }
        self.run(&args)
    }

    /// Throw away a merge left half-done by a conflicting pull.
    pub fn merge_abort(&self) -> CommandOutcome {
        self.run(&["merge", "--abort"])
    }

    pub fn push(&self) -> CommandOutcome {
        let mut args = vec!["push"];
        if let Some((remote, branch)) = &self.target {
            args.push(remote);
            args.push(branch);
        }
        self.run(&args)
    }

    fn run(&self, args: &[&str]) -> CommandOutcome {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(args.iter().map(|arg| arg.to_string()));
        debug!(args = %args.join(" "), "git");
        self.runner.run(&argv, &self.workdir)
    }
}
