//! Stable exit codes for `bread` CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// The site file is missing, malformed, or fails validation.
pub const INVALID: i32 = 1;
/// The site is valid but a query parameter (`-o`, page) was rejected.
pub const BAD_REQUEST: i32 = 2;
