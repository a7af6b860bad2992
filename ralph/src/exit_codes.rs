//! Stable exit codes for ralph CLI commands.

/// Command succeeded or an actionable task was found.
pub const OK: i32 = 0;
/// Command failed due to invalid config, unreadable files or other errors.
pub const INVALID: i32 = 1;
/// No actionable task remains (`ralph next`, `ralph run`).
pub const COMPLETE: i32 = 2;
/// `ralph run` stopped because the agent went quiet for too long.
pub const STALLED: i32 = 3;
/// `ralph run` hit `settings.max_iterations`.
pub const MAX_ITERATIONS: i32 = 4;
/// `ralph run` was stopped manually (Ctrl-C).
pub const CANCELLED: i32 = 5;
