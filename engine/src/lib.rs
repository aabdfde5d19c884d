//! Background write-through sync between a local git working tree and its remote.
//!
//! Callers hand the engine a [`ChangeSet`](core::change_set::ChangeSet) after
//! they have written files to disk. The engine stages, commits, reconciles and
//! pushes it on a dedicated worker thread, so the caller never waits on git or
//! the network. The architecture follows a strict split:
//!
//! - **[`core`]**: Pure values and output classification. No I/O.
//! - **[`io`]**: Subprocess execution, git verbs and configuration.
//!
//! On top of those, [`transaction`] runs one add/commit/pull/push cycle,
//! [`queue`] guarantees a single worker drains requests in FIFO order, and
//! [`service`] is the non-blocking façade the application talks to.

pub mod core;
pub mod io;
pub mod queue;
pub mod service;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod transaction;

pub use crate::core::change_set::ChangeSet;
pub use crate::core::outcome::{CommitStatus, SyncOutcome, SyncStep};
pub use crate::io::config::SyncConfig;
pub use crate::io::process::{CommandOutcome, CommandRunner, ProcessRunner};
pub use crate::service::{SyncHandle, SyncService};
