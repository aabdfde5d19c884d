//! Five-a-side pool scoreboard.
//!
//! Players' wins and losses live in two JSON documents next to a git
//! checkout. Every mutation writes the documents, answers immediately, and
//! hands the changed files to the [`engine`] sync service, which commits and
//! pushes them in the background.
//!
//! - **[`store`]** / **[`week`]**: document shapes, atomic writes, week keys.
//! - **[`ledger`]**: the mutations and queries over both documents.
//! - **[`command`]** / **[`report`]**: chat-style command lines in, text out.
//! - **[`app`]**: the service object wiring the ledger to the sync engine.

pub mod app;
pub mod command;
pub mod config;
pub mod exit_codes;
pub mod ledger;
pub mod logging;
pub mod report;
pub mod store;
pub mod week;
