//! Updater status and observable state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manifest::ReleaseAsset;

/// The updater's lifecycle state.
///
/// Transitions:
///
/// ```text
/// INITIAL
///   ├─ hydrate        → INITIAL (or COMPLETE when a prior update log exists)
///   ├─ check_latest   → CHECKING → (UPDATE_AVAILABLE | UP_TO_DATE)
/// UPDATE_AVAILABLE
///   └─ download_update → IN_PROGRESS → (DOWNLOADED | ERROR)
/// DOWNLOADED
///   └─ perform_update  → IN_PROGRESS → (process exits; COMPLETE on relaunch)
/// COMPLETE
///   └─ post_install_cleanup → INITIAL
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum UpdateStatus {
    /// Constructed; nothing checked yet.
    Initial = 0,
    /// A check is running.
    Checking = 1,
    /// The channel carries a newer (or downgrade-eligible) version.
    UpdateAvailable = 2,
    /// The local version matches the channel.
    UpToDate = 3,
    /// The artifact is verified on local disk.
    Downloaded = 4,
    /// A download or swap is in flight.
    InProgress = 5,
    /// A swap finished; observed on the launch after the helper ran.
    Complete = 6,
    /// The operation was cancelled.
    Stopped = 7,
    /// A fatal failure; see the returned error.
    Error = 8,
}

impl UpdateStatus {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Checking,
            2 => Self::UpdateAvailable,
            3 => Self::UpToDate,
            4 => Self::Downloaded,
            5 => Self::InProgress,
            6 => Self::Complete,
            7 => Self::Stopped,
            8 => Self::Error,
            _ => Self::Initial,
        }
    }
}

/// Snapshot of the updater's observable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterState {
    /// When the channel was last checked.
    pub last_update_check: Option<DateTime<Utc>>,
    /// The asset selected by the most recent check, if any.
    pub update_asset: Option<ReleaseAsset>,
    /// Changelog from the channel.
    pub changelog: String,
    /// Publication time of the selected release.
    pub released_at: Option<DateTime<Utc>>,
    /// Seconds between automatic checks.
    pub check_interval_secs: u64,
    /// Contents of the helper's update log, when one was found at hydrate.
    pub log: String,
    /// Configured update log path.
    pub log_path: Option<String>,
    /// The running version.
    pub version: String,
    /// Current status.
    pub status: UpdateStatus,
}
