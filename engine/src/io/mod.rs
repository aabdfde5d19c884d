//! I/O helpers for the sync engine.

pub mod config;
pub mod git;
pub mod process;
