//! Stable exit codes for morph CLI commands.

/// Command succeeded, or every plan step passed.
pub const OK: i32 = 0;
/// Invalid arguments, config or plan, or an error before execution started.
pub const INVALID: i32 = 1;
/// `morph run` executed the plan and it failed.
pub const FAILED: i32 = 2;
