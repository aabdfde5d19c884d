//! Deterministic values shared by the sync engine.
//!
//! Core modules must be free of I/O side effects. They describe what a sync
//! request is, what it produced, and how command output is classified.

pub mod change_set;
pub mod outcome;
pub mod signature;
