//! Non-blocking façade over the sync queue.
//!
//! The application writes its files, replies to the user, then calls
//! [`SyncService::submit`]. Submission only enqueues; the returned
//! [`SyncHandle`] can be awaited by callers that care about the outcome and
//! dropped by everyone else.

use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result, anyhow};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::core::change_set::ChangeSet;
use crate::core::outcome::SyncOutcome;
use crate::io::config::SyncConfig;
use crate::io::process::CommandRunner;
use crate::queue::{SyncQueue, run_worker};

/// Owns the sync queue and its single worker thread.
///
/// Construct once at startup. Dropping the service without calling
/// [`shutdown`](Self::shutdown) detaches the worker: queued jobs keep running
/// until the process exits.
#[derive(Debug)]
pub struct SyncService {
    queue: SyncQueue,
    worker: thread::JoinHandle<()>,
}

impl SyncService {
    /// Validate `config` and spawn the worker for the checkout at `workdir`.
    pub fn start<R>(runner: R, workdir: impl Into<PathBuf>, config: SyncConfig) -> Result<Self>
    where
        R: CommandRunner + Send + 'static,
    {
        config.validate()?;
        let workdir = workdir.into();
        let (queue, rx) = SyncQueue::new();
        let worker = thread::Builder::new()
            .name("sync-worker".to_string())
            .spawn(move || run_worker(runner, workdir, config, rx))
            .context("spawn sync worker thread")?;
        Ok(Self { queue, worker })
    }

    /// Enqueue `change_set` and return immediately.
    ///
    /// Never fails: if the worker is gone the handle resolves to a failed outcome.
    pub fn submit(&self, change_set: ChangeSet) -> SyncHandle {
        match self.queue.push(change_set) {
            Ok((id, rx)) => {
                debug!(id, "change set queued");
                SyncHandle { id, rx }
            }
            Err(job) => {
                error!(
                    message = %job.change_set.message(),
                    "sync worker stopped, change set not queued"
                );
                let (tx, rx) = oneshot::channel();
                let _ = tx.send(SyncOutcome::worker_unavailable());
                SyncHandle { id: job.id, rx }
            }
        }
    }

    /// Close the queue, let the worker finish every queued job, and join it.
    pub fn shutdown(self) -> Result<()> {
        let Self { queue, worker } = self;
        drop(queue);
        info!("waiting for queued syncs to finish");
        worker
            .join()
            .map_err(|_| anyhow!("sync worker thread panicked"))
    }
}

/// Receipt for a submitted change set.
#[derive(Debug)]
pub struct SyncHandle {
    id: u64,
    rx: oneshot::Receiver<SyncOutcome>,
}

impl SyncHandle {
    /// Queue position assigned at submission (1 for the first change set).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the transaction to finish.
    pub async fn outcome(self) -> SyncOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| SyncOutcome::worker_unavailable())
    }

    /// Blocking variant of [`outcome`](Self::outcome) for non-async callers.
    ///
    /// Panics if called from within an async runtime worker thread.
    pub fn wait(self) -> SyncOutcome {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| SyncOutcome::worker_unavailable())
    }
}
