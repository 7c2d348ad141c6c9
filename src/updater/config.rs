//! Updater configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::constants::DEFAULT_CHECK_INTERVAL;
use crate::manifest::ReleaseAsset;
use crate::utils::platform::{current_arch, current_platform};

use super::clients::CheckClient;
use super::helper::HelperSource;

/// Context handed to the download and prepare hooks.
pub struct UpdateHookContext {
    /// The selected asset at the time the hook runs.
    pub asset: ReleaseAsset,
    /// Scratch directory for downloads and staging.
    pub temporary_path: PathBuf,
    /// Cancellation handle for the surrounding operation.
    pub cancel: CancellationToken,
}

/// Override for the default transfer: fetch the asset yourself and return
/// the local path it was written to.
pub type DownloadFn =
    Arc<dyn Fn(UpdateHookContext) -> BoxFuture<'static, crate::Result<PathBuf>> + Send + Sync>;

/// Pre-swap hook. Returning `Some(path)` rewrites the artefact path the
/// helper will install - the macOS flow extracts a downloaded tarball here
/// and points the updater at the revealed `.app` bundle.
pub type PrepareFn = Arc<
    dyn Fn(UpdateHookContext) -> BoxFuture<'static, crate::Result<Option<PathBuf>>> + Send + Sync,
>;

/// Captures the local environment and update policy.
///
/// `platform` and `architecture` default to the running process's values;
/// both must be non-empty for asset selection to work.
pub struct UpdaterConfig {
    /// Platform tag used to select assets.
    pub platform: String,
    /// Architecture tag used to select assets.
    pub architecture: String,
    /// Build variant required of selected assets; empty accepts any build
    /// without a variant.
    pub variant: String,
    /// The running version (leading `v` tolerated).
    pub version: String,
    /// Install older versions when the channel moved backwards.
    pub allow_downgrade: bool,
    /// Accept pre-release versions.
    pub allow_prerelease: bool,
    /// How often the background check runs.
    pub check_interval: Duration,
    /// Scratch directory for downloads and helper staging.
    pub temporary_path: PathBuf,
    /// Update log path shared with the swap helper.
    pub log_path: Option<PathBuf>,
    /// Pinned verification key (ASCII; PGP armor or SPKI PEM).
    pub public_key: String,
    /// Path to the pinned key; read at hydrate when `public_key` is empty.
    pub public_key_path: Option<PathBuf>,
    /// When the channel was last checked.
    pub last_update_check: Option<DateTime<Utc>>,
    /// Arguments passed to the relaunched application after the swap.
    pub launch_args: Vec<String>,
    /// Where the swap helper executable comes from.
    pub helper_source: HelperSource,
    /// The release-channel client used by `check_latest`.
    pub check_client: Option<Arc<dyn CheckClient>>,
    /// Optional override of the default transfer.
    pub download_fn: Option<DownloadFn>,
    /// Optional pre-swap hook.
    pub prepare_fn: Option<PrepareFn>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            platform: current_platform(),
            architecture: current_arch(),
            variant: String::new(),
            version: String::new(),
            allow_downgrade: false,
            allow_prerelease: false,
            check_interval: DEFAULT_CHECK_INTERVAL,
            temporary_path: std::env::temp_dir().join("updraft"),
            log_path: None,
            public_key: String::new(),
            public_key_path: None,
            last_update_check: None,
            launch_args: Vec::new(),
            helper_source: HelperSource::Sibling,
            check_client: None,
            download_fn: None,
            prepare_fn: None,
        }
    }
}

impl UpdaterConfig {
    /// Set the platform tag.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Set the architecture tag.
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.architecture = arch.into();
        self
    }

    /// Set the required build variant.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    /// Set the running version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Allow installing older versions.
    pub fn with_allow_downgrade(mut self, allow: bool) -> Self {
        self.allow_downgrade = allow;
        self
    }

    /// Accept pre-release versions.
    pub fn with_allow_prerelease(mut self, allow: bool) -> Self {
        self.allow_prerelease = allow;
        self
    }

    /// Set the background check interval.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Set the scratch directory.
    pub fn with_temporary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.temporary_path = path.into();
        self
    }

    /// Set the update log path.
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Provide the pinned verification key inline.
    pub fn with_public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = key.into();
        self
    }

    /// Provide the pinned verification key via a file path.
    pub fn with_public_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.public_key_path = Some(path.into());
        self
    }

    /// Record when the channel was last checked.
    pub fn with_last_update_check(mut self, at: DateTime<Utc>) -> Self {
        self.last_update_check = Some(at);
        self
    }

    /// Set arguments for the relaunched application.
    pub fn with_launch_args(mut self, args: Vec<String>) -> Self {
        self.launch_args = args;
        self
    }

    /// Set where the swap helper executable comes from.
    pub fn with_helper_source(mut self, source: HelperSource) -> Self {
        self.helper_source = source;
        self
    }

    /// Inject the release-channel client.
    pub fn with_check_client(mut self, client: Arc<dyn CheckClient>) -> Self {
        self.check_client = Some(client);
        self
    }

    /// Override the default transfer.
    pub fn with_download_fn(mut self, f: DownloadFn) -> Self {
        self.download_fn = Some(f);
        self
    }

    /// Register the pre-swap hook.
    pub fn with_prepare_fn(mut self, f: PrepareFn) -> Self {
        self.prepare_fn = Some(f);
        self
    }
}
