//! Stable exit codes for scoreboard CLI commands.

/// Command succeeded. A failed background sync does not change this: the local write stands.
pub const OK: i32 = 0;
/// Invalid arguments, unknown player, unreadable config or data files.
pub const INVALID: i32 = 1;
