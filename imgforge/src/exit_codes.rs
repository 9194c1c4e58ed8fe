//! Stable exit codes for imgforge CLI commands.

/// Command succeeded; for `build`, every step completed.
pub const OK: i32 = 0;
/// Invalid config, failed pre-flight check, or any other error before the build ran.
pub const INVALID: i32 = 1;
/// A build step halted; cleanup has run.
pub const HALTED: i32 = 2;
/// The build was cancelled (Ctrl-C); cleanup has run.
pub const CANCELLED: i32 = 3;
