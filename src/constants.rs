//! Global constants used throughout the updraft codebase.
//!
//! Timeout durations, retry parameters, and byte budgets that are used across
//! multiple modules. Defining them centrally keeps magic numbers discoverable.

use std::time::Duration;

/// Copy buffer size for streaming archive extraction (32 KiB).
///
/// Extraction streams entry bytes through a buffer of this size, checking
/// cancellation and size budgets between blocks.
pub const EXTRACT_BUFFER_SIZE: usize = 32 * 1024;

/// Default cap on total bytes written by one extraction (5 GiB).
pub const DEFAULT_MAX_TOTAL_SIZE: u64 = 5 << 30;

/// Default cap on a single extracted or compressed file (500 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 500 << 20;

/// Minimum interval between transfer progress notifications (2 seconds).
///
/// Progress events are emitted no more often than this; the terminal
/// notification is always delivered regardless of the interval.
pub const DOWNLOAD_CALLBACK_INTERVAL: Duration = Duration::from_secs(2);

/// How often the updater re-checks the release channel by default (48 hours).
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(48 * 60 * 60);

/// Maximum retries for transient (5xx / connect) download failures.
pub const MAX_DOWNLOAD_RETRIES: u32 = 3;

/// Ceiling on the jittered exponential backoff between download retries.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// Number of swap attempts the helper makes before giving up.
pub const REPLACE_ATTEMPTS: u32 = 15;

/// Fixed delay between swap attempts.
pub const REPLACE_ATTEMPT_DELAY: Duration = Duration::from_secs(3);

/// Maximum accepted reverse-template length in bytes.
pub const MAX_TEMPLATE_LEN: usize = 1024;

/// Maximum accepted compiled-regex source length in bytes.
pub const MAX_REGEX_LEN: usize = 4096;

/// Maximum accepted parse input length in bytes.
pub const MAX_PARSE_INPUT_LEN: usize = 512;

/// Wall-clock budget for one parse attempt across all templates.
pub const PARSE_TIMEOUT: Duration = Duration::from_millis(100);

/// Wall-clock budget for the pathological-input probe at template compile.
pub const REGEX_PROBE_TIMEOUT: Duration = Duration::from_millis(50);

/// Length of the repeated probe inputs fed to freshly compiled templates.
pub const REGEX_PROBE_LEN: usize = 100;

/// Mode bits applied to a downloaded artefact before handing it to the helper.
#[cfg(unix)]
pub const DOWNLOADED_ARTEFACT_MODE: u32 = 0o770;

/// Mode bits applied to the staged helper executable.
#[cfg(unix)]
pub const HELPER_MODE: u32 = 0o755;
