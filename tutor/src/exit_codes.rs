//! Stable exit codes for tutor CLI commands.

/// Action completed (including a failed verification, which is reported, not raised).
pub const OK: i32 = 0;
/// Invalid tutorial layout, unreadable files or any other unhandled error.
pub const INVALID: i32 = 1;
/// `verify`, `run` or `print` was invoked with no active problem.
pub const NO_ACTIVE_PROBLEM: i32 = 2;
