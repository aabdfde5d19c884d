//! Single-worker FIFO queue of sync requests.
//!
//! Any number of producers may push; exactly one worker drains. The worker
//! pulls the next job only after the previous transaction returned, so at
//! most one transaction (and one git process) touches the working tree at a
//! time. Jobs are never merged, reordered or dropped.

use std::path::PathBuf;
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, info_span, warn};

use crate::core::change_set::ChangeSet;
use crate::core::outcome::SyncOutcome;
use crate::io::config::SyncConfig;
use crate::io::git::Git;
use crate::io::process::CommandRunner;
use crate::transaction::run_sync;

/// One queued sync request.
#[derive(Debug)]
pub struct SyncJob {
    pub id: u64,
    pub change_set: ChangeSet,
    /// Receives the outcome; the receiver may already be gone.
    pub reply: oneshot::Sender<SyncOutcome>,
}

/// Producer side of the queue. Unbounded: producers are human-paced.
#[derive(Debug)]
pub struct SyncQueue {
    tx: mpsc::UnboundedSender<SyncJob>,
    /// Held across `send` so id order always matches queue order.
    next_id: Mutex<u64>,
}

impl SyncQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            tx,
            next_id: Mutex::new(1),
        };
        (queue, rx)
    }

    /// Append a job; ids increase in submission order and are never reused,
    /// even for a job the worker refused.
    ///
    /// Returns the job back if the worker has stopped receiving.
    pub fn push(
        &self,
        change_set: ChangeSet,
    ) -> Result<(u64, oneshot::Receiver<SyncOutcome>), Box<SyncJob>> {
        let mut next_id = self
            .next_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = *next_id;
        *next_id += 1;
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SyncJob {
                id,
                change_set,
                reply,
            })
            .map_err(|err| Box::new(err.0))?;
        Ok((id, rx))
    }
}

/// Drain `rx` until every producer is dropped, running one transaction at a time.
///
/// Blocks the calling thread; run it on a dedicated thread, never inside an
/// async runtime worker.
pub fn run_worker<R: CommandRunner>(
    runner: R,
    workdir: PathBuf,
    config: SyncConfig,
    mut rx: mpsc::UnboundedReceiver<SyncJob>,
) {
    let git = Git::new(runner, workdir, &config);
    info!(workdir = %git.workdir().display(), "sync worker started");

    while let Some(job) = rx.blocking_recv() {
        let span = info_span!("sync_job", id = job.id);
        let _enter = span.enter();

        let outcome = run_sync(&git, &config, &job.change_set);
        if outcome.success {
            info!(
                message = %job.change_set.message(),
                diagnostic = outcome.diagnostic.as_deref().unwrap_or(""),
                "change set synced"
            );
        } else {
            warn!(
                message = %job.change_set.message(),
                step = ?outcome.failed_step,
                diagnostic = outcome.diagnostic.as_deref().unwrap_or(""),
                "change set not synced"
            );
        }
        // The submitter may have discarded its handle.
        let _ = job.reply.send(outcome);
    }

    info!("sync worker stopped");
}
