// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `nightly-check` failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum NightlyExitCode {}

impl NightlyExitCode {
    /// No errors occurred, and the verdict counts as a pass (`OK` or `TEST`).
    pub const OK: i32 = 0;

    /// The verdict was `BUILD`: at least one unit failed to build.
    pub const BUILD_FAILED: i32 = 101;

    /// The verdict was `INCOMPLETE`: at least one platform was still running.
    pub const INCOMPLETE_BUILD: i32 = 106;

    /// The verdict was `BADLOG`: expected logs were missing, or unexpected logs appeared.
    pub const BAD_LOGS: i32 = 107;

    /// No history was recorded for the requested date.
    pub const NO_HISTORY: i32 = 4;

    /// Reading or writing the history store produced an error.
    pub const HISTORY_STORE_ERROR: i32 = 108;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up a `nightly-check` invocation.
    pub const SETUP_ERROR: i32 = 96;
}
