//! The updater state machine.
//!
//! [`UpdaterSvc`] orchestrates check -> download -> verify -> prepare ->
//! swap. It owns its [`UpdaterConfig`] and the currently selected
//! [`ReleaseAsset`]; the status field is written before any operation
//! returns, so readers always observe the transition that operation caused.
//!
//! # Operation order
//!
//! [`hydrate`](UpdaterSvc::hydrate) happens-before everything else and is
//! idempotent. [`check_latest`](UpdaterSvc::check_latest) must complete
//! before [`download_update`](UpdaterSvc::download_update) unless the caller
//! supplies an asset directly. [`download_update`] must complete before
//! [`perform_update`](UpdaterSvc::perform_update), which stages the swap
//! helper, spawns it detached, and returns immediately - the caller is
//! expected to exit so the helper can replace it on disk.
//!
//! The only concurrency the service owns is the background check spawned
//! from `hydrate` when the check interval has lapsed; it shares state via
//! the atomic status and the mutex-protected selected asset.

pub mod clients;
pub mod config;
pub mod helper;
pub mod status;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{Result, UpdraftError};
use crate::crypto::{detect_key_info, ecdsa, pgp, KeyFormat};
use crate::events::{Relay, RelayEvent};
use crate::manifest::ReleaseAsset;
use crate::net::{DownloadRequest, TransferSvc};
use crate::utils::platform::find_app_bundle_root;

pub use config::{DownloadFn, PrepareFn, UpdateHookContext, UpdaterConfig};
pub use helper::HelperSource;
pub use status::{UpdateStatus, UpdaterState};

/// Relay channel used by the updater.
pub const RELAY_UPDATER_CHANNEL: &str = "updater";
/// Relay ref for updater log lines.
pub const RELAY_UPDATER_LOG: &str = "updater.log";

/// Verification key loaded at hydrate, routed by detected format.
enum VerifyKey {
    Pgp(Vec<pgp::SignedPublicKey>),
    Ecdsa(Box<p256::ecdsa::VerifyingKey>),
}

#[derive(Default)]
struct Inner {
    selected: Option<ReleaseAsset>,
    update_log: String,
    update_target: Option<PathBuf>,
    version: Option<semver::Version>,
    last_update_check: Option<DateTime<Utc>>,
    log_path: Option<PathBuf>,
    hydrated: bool,
}

/// The updater. Shareable behind an `Arc`; operations take `&self` and are
/// serialised by the caller.
pub struct UpdaterSvc {
    cfg: UpdaterConfig,
    relay: Arc<Relay>,
    transfer: Arc<TransferSvc>,
    status: AtomicU8,
    verify_key: Mutex<Option<VerifyKey>>,
    inner: Mutex<Inner>,
}

impl UpdaterSvc {
    /// Create the updater with a default transfer service and a tracing
    /// relay. Call [`hydrate`](Self::hydrate) before any other operation.
    pub fn new(cfg: UpdaterConfig) -> Arc<Self> {
        let relay = Arc::new(Relay::with_tracing());
        let transfer =
            Arc::new(TransferSvc::new(crate::net::TransferConfig::default(), relay.clone()));
        Self::with_services(cfg, relay, transfer)
    }

    /// Create the updater over explicit relay and transfer services.
    pub fn with_services(
        cfg: UpdaterConfig,
        relay: Arc<Relay>,
        transfer: Arc<TransferSvc>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            relay,
            transfer,
            status: AtomicU8::new(UpdateStatus::Initial as u8),
            verify_key: Mutex::new(None),
            inner: Mutex::new(Inner::default()),
        })
    }

    fn set_status(&self, status: UpdateStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    /// The current status.
    pub fn status(&self) -> UpdateStatus {
        UpdateStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn log_event(&self, message: String) {
        self.relay.debug(RelayEvent::new(RELAY_UPDATER_CHANNEL, RELAY_UPDATER_LOG, message));
    }

    /// Initialise the updater. Idempotent; required before any other
    /// operation.
    ///
    /// Reads a prior update log (setting status to
    /// [`UpdateStatus::Complete`] when one exists), loads and routes the
    /// pinned verification key, parses the running version, resolves the
    /// update target (the executable, or the enclosing `.app` bundle on
    /// macOS), and spawns a background check when the check interval has
    /// lapsed.
    pub async fn hydrate(self: &Arc<Self>) -> Result<()> {
        {
            let inner = self.inner.lock().expect("updater state lock poisoned");
            if inner.hydrated {
                return Ok(());
            }
        }
        self.log_event("start: hydrate state".to_string());

        self.transfer.hydrate();

        // A log file left by the helper means an update just finished.
        let mut update_log = String::new();
        if let Some(log_path) = &self.cfg.log_path {
            if let Ok(contents) = tokio::fs::read_to_string(log_path).await {
                update_log = contents;
                self.set_status(UpdateStatus::Complete);
            }
        }

        let mut key_material = self.cfg.public_key.clone();
        if key_material.is_empty() {
            if let Some(path) = &self.cfg.public_key_path {
                match tokio::fs::read_to_string(path).await {
                    Ok(contents) => key_material = contents,
                    Err(e) => {
                        self.log_event(format!(
                            "failed to read public key file {}: {e}",
                            path.display()
                        ));
                    }
                }
            }
        }
        if !key_material.is_empty() {
            self.load_verify_key(&key_material);
        }

        let version = if self.cfg.version.is_empty() {
            None
        } else {
            Some(semver::Version::parse(self.cfg.version.trim_start_matches('v'))?)
        };

        let update_target = match resolve_update_target(&self.cfg.platform) {
            Ok(target) => Some(target),
            Err(e) => {
                // Tests and unusual hosts may run without a resolvable
                // executable; selection still works, only perform_update
                // needs the target.
                self.log_event(format!("could not resolve update target: {e}"));
                None
            }
        };

        let needs_check = match self.cfg.last_update_check {
            Some(last) => {
                let interval = chrono::Duration::from_std(self.cfg.check_interval)
                    .unwrap_or_else(|_| chrono::Duration::hours(48));
                last + interval < Utc::now()
            }
            None => true,
        };

        {
            let mut inner = self.inner.lock().expect("updater state lock poisoned");
            inner.update_log = update_log;
            inner.version = version;
            inner.update_target = update_target;
            inner.last_update_check = self.cfg.last_update_check;
            inner.log_path = self.cfg.log_path.clone();
            inner.hydrated = true;
        }

        if needs_check && self.cfg.check_client.is_some() {
            self.log_event("check interval lapsed, checking in background".to_string());
            let svc = Arc::clone(self);
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                if let Err(e) = svc.check_latest(&cancel).await {
                    if !e.is_cancelled() {
                        svc.log_event(format!("background check failed: {e}"));
                    }
                }
            });
        }

        self.log_event("end: hydrate state".to_string());
        Ok(())
    }

    fn load_verify_key(&self, key_material: &str) {
        match detect_key_info(key_material.as_bytes()) {
            Ok(info) => match info.format {
                KeyFormat::Pgp => match pgp::load_public_keys(key_material.as_bytes()) {
                    Ok(keys) => {
                        debug!("loaded PGP verification keyring");
                        *self.verify_key.lock().expect("key lock poisoned") =
                            Some(VerifyKey::Pgp(keys));
                    }
                    Err(e) => self.log_event(format!("could not load public key: {e}")),
                },
                KeyFormat::X509 => match ecdsa::public_key_from_pem(key_material) {
                    Ok(key) => {
                        debug!("loaded ECDSA verification key");
                        *self.verify_key.lock().expect("key lock poisoned") =
                            Some(VerifyKey::Ecdsa(Box::new(key)));
                    }
                    Err(e) => self.log_event(format!("could not load public key: {e}")),
                },
                KeyFormat::Ssh => {
                    self.log_event(format!("unsupported key format: {}", info.format));
                }
            },
            Err(e) => self.log_event(format!("could not detect key information: {e}")),
        }
    }

    /// Ask the configured client for the latest release and compare it with
    /// the running version. Returns the selected asset; the status moves to
    /// [`UpdateStatus::UpdateAvailable`] or [`UpdateStatus::UpToDate`].
    pub async fn check_latest(&self, cancel: &CancellationToken) -> Result<ReleaseAsset> {
        let client = self.cfg.check_client.clone().ok_or_else(|| {
            self.set_status(UpdateStatus::Error);
            UpdraftError::config("no check client configured")
        })?;

        self.set_status(UpdateStatus::Checking);

        let asset = match client.check_update(cancel, &self.cfg).await {
            Ok(asset) => asset,
            Err(e) => {
                self.set_status(if e.is_cancelled() {
                    UpdateStatus::Stopped
                } else {
                    UpdateStatus::Error
                });
                return Err(e);
            }
        };

        let remote = match semver::Version::parse(asset.version.trim_start_matches('v')) {
            Ok(v) => v,
            Err(e) => {
                self.set_status(UpdateStatus::Error);
                return Err(UpdraftError::CheckFailed {
                    reason: format!("parse: remote version {:?}: {e}", asset.version),
                });
            }
        };

        let mut inner = self.inner.lock().expect("updater state lock poisoned");
        let local = inner.version.clone();
        self.log_event(format!(
            "current version / remote version: {} / {remote}",
            local.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "unknown".to_string())
        ));

        let newer = match &local {
            Some(local) => {
                remote > *local || (self.cfg.allow_downgrade && remote != *local)
            }
            None => true,
        };
        self.set_status(if newer {
            UpdateStatus::UpdateAvailable
        } else {
            UpdateStatus::UpToDate
        });

        inner.last_update_check = Some(Utc::now());
        inner.selected = Some(asset.clone());
        Ok(asset)
    }

    /// Download the selected asset (or `asset`, when supplied) into the
    /// temporary path, make it executable, and verify its signature against
    /// the pinned key. The status moves to [`UpdateStatus::Downloaded`].
    pub async fn download_update(
        &self,
        cancel: &CancellationToken,
        asset: Option<ReleaseAsset>,
    ) -> Result<()> {
        if let Some(asset) = asset {
            self.inner.lock().expect("updater state lock poisoned").selected = Some(asset);
        }

        let selected = self
            .inner
            .lock()
            .expect("updater state lock poisoned")
            .selected
            .clone()
            .ok_or_else(|| UpdraftError::config("no update selected"))?;

        self.set_status(UpdateStatus::InProgress);

        let result = self.download_inner(cancel, selected).await;
        match result {
            Ok(local_path) => {
                let mut inner = self.inner.lock().expect("updater state lock poisoned");
                if let Some(selected) = inner.selected.as_mut() {
                    selected.artefact_name = local_path.display().to_string();
                }
                self.set_status(UpdateStatus::Downloaded);
                Ok(())
            }
            Err(e) => {
                self.set_status(if e.is_cancelled() {
                    UpdateStatus::Stopped
                } else {
                    UpdateStatus::Error
                });
                Err(e)
            }
        }
    }

    async fn download_inner(
        &self,
        cancel: &CancellationToken,
        asset: ReleaseAsset,
    ) -> Result<PathBuf> {
        let destination = if let Some(download_fn) = &self.cfg.download_fn {
            let ctx = UpdateHookContext {
                asset: asset.clone(),
                temporary_path: self.cfg.temporary_path.clone(),
                cancel: cancel.clone(),
            };
            download_fn(ctx).await?
        } else {
            if asset.download_url.is_empty() {
                return Err(UpdraftError::config("no download url configured"));
            }
            let request = DownloadRequest::new(&asset.download_url, &self.cfg.temporary_path)
                .with_checksum(&asset.checksum);
            self.transfer.download_file(cancel, &request).await?
        };

        // The helper exec()s this path; it must be executable.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(
                &destination,
                std::fs::Permissions::from_mode(crate::constants::DOWNLOADED_ARTEFACT_MODE),
            )
            .await
            .map_err(|e| UpdraftError::fs(destination.clone(), e))?;
        }

        if !asset.signature.is_empty() {
            self.verify_signature(&destination, &asset.signature)?;
        }

        info!(path = %destination.display(), "update downloaded");
        Ok(destination)
    }

    /// Verify a detached signature against the loaded key. A signature in a
    /// format without a loaded local key is a warning, not an error.
    fn verify_signature(&self, path: &PathBuf, signature: &str) -> Result<()> {
        let info = detect_key_info(signature.as_bytes()).map_err(|e| UpdraftError::KeyError {
            reason: format!("could not detect key information from signature: {e}"),
        })?;

        let key = self.verify_key.lock().expect("key lock poisoned");
        match (info.format, key.as_ref()) {
            (KeyFormat::Pgp, Some(VerifyKey::Pgp(keys))) => {
                pgp::verify_file_detached(keys, path, signature)
            }
            (KeyFormat::X509, Some(VerifyKey::Ecdsa(key))) => {
                ecdsa::verify_file(key, path, signature)
            }
            (format, _) => {
                warn!(%format, "signature provided but no local key handler");
                self.log_event(format!("{format} signature provided but no local handler"));
                Ok(())
            }
        }
    }

    /// Run the prepare hook, stage the swap helper, and spawn it detached
    /// with the update target, artefact path, and log path. Returns
    /// immediately; the helper outlives this process and the caller should
    /// exit promptly.
    pub async fn perform_update(&self, cancel: &CancellationToken) -> Result<()> {
        self.set_status(UpdateStatus::InProgress);

        let result = self.perform_inner(cancel).await;
        if let Err(e) = &result {
            self.set_status(if e.is_cancelled() {
                UpdateStatus::Stopped
            } else {
                UpdateStatus::Error
            });
        }
        result
    }

    async fn perform_inner(&self, cancel: &CancellationToken) -> Result<()> {
        let selected = self
            .inner
            .lock()
            .expect("updater state lock poisoned")
            .selected
            .clone()
            .ok_or_else(|| UpdraftError::config("no update selected"))?;

        if let Some(prepare) = &self.cfg.prepare_fn {
            let ctx = UpdateHookContext {
                asset: selected.clone(),
                temporary_path: self.cfg.temporary_path.clone(),
                cancel: cancel.clone(),
            };
            if let Some(new_path) = prepare(ctx).await? {
                let mut inner = self.inner.lock().expect("updater state lock poisoned");
                if let Some(selected) = inner.selected.as_mut() {
                    selected.artefact_name = new_path.display().to_string();
                }
            }
        }

        let (artefact, update_target, log_path) = {
            let inner = self.inner.lock().expect("updater state lock poisoned");
            let artefact = inner
                .selected
                .as_ref()
                .map(|a| a.artefact_name.clone())
                .filter(|name| !name.is_empty())
                .ok_or_else(|| UpdraftError::config("no artefact path configured"))?;
            let target = inner
                .update_target
                .clone()
                .ok_or_else(|| UpdraftError::config("no update target resolved"))?;
            (artefact, target, inner.log_path.clone())
        };

        let helper_path = helper::stage_helper(&self.cfg.helper_source, &self.cfg.temporary_path)?;
        self.relay.info(RelayEvent::new(
            RELAY_UPDATER_CHANNEL,
            RELAY_UPDATER_LOG,
            format!("extracted helper to: {}", helper_path.display()),
        ));

        self.relay.info(RelayEvent::new(
            RELAY_UPDATER_CHANNEL,
            RELAY_UPDATER_LOG,
            format!("starting update. replacing {} with {artefact}", update_target.display()),
        ));

        let mut command = std::process::Command::new(&helper_path);
        command.arg(&update_target).arg(&artefact);
        if let Some(log_path) = &log_path {
            command.arg(log_path);
        }
        if !self.cfg.launch_args.is_empty() {
            command.arg("--");
            command.args(&self.cfg.launch_args);
        }
        if let Some(dir) = self.cfg.temporary_path.parent() {
            command.current_dir(dir);
        }

        // Spawn and deliberately do not wait: the helper must outlive us.
        command.spawn().map_err(|e| UpdraftError::SwapFailed {
            reason: format!("couldn't start update helper: {e}"),
        })?;

        Ok(())
    }

    /// Remove the helper's update log and clear the configured path. The
    /// status returns to [`UpdateStatus::Initial`].
    pub async fn post_install_cleanup(&self) -> Result<()> {
        self.log_event("post install cleanup".to_string());
        let log_path = {
            let mut inner = self.inner.lock().expect("updater state lock poisoned");
            inner.update_log.clear();
            inner.log_path.take()
        };
        if let Some(path) = log_path {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                self.log_event(format!("failed to remove log file: {e}"));
            }
        }
        self.set_status(UpdateStatus::Initial);
        Ok(())
    }

    /// Contents of the update log found at hydrate, empty when none.
    pub fn update_log(&self) -> String {
        self.inner.lock().expect("updater state lock poisoned").update_log.clone()
    }

    /// The asset selected by the most recent check or download.
    pub fn selected_asset(&self) -> Option<ReleaseAsset> {
        self.inner.lock().expect("updater state lock poisoned").selected.clone()
    }

    /// Snapshot of the observable state.
    pub fn state(&self) -> UpdaterState {
        let inner = self.inner.lock().expect("updater state lock poisoned");
        UpdaterState {
            last_update_check: inner.last_update_check,
            update_asset: inner.selected.clone(),
            changelog: String::new(),
            released_at: None,
            check_interval_secs: self.cfg.check_interval.as_secs(),
            log: inner.update_log.clone(),
            log_path: inner.log_path.as_ref().map(|p| p.display().to_string()),
            version: inner
                .version
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| self.cfg.version.clone()),
            status: self.status(),
        }
    }
}

/// The path the helper will replace: the resolved current executable, or on
/// macOS the enclosing `.app` bundle when there is one.
fn resolve_update_target(platform: &str) -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| UpdraftError::SwapFailed {
        reason: format!("cannot resolve current executable: {e}"),
    })?;
    let exe = std::fs::canonicalize(&exe).unwrap_or(exe);

    if platform == "darwin" {
        if let Some(bundle) = find_app_bundle_root(&exe) {
            debug!(bundle = %bundle.display(), "found app bundle");
            return Ok(bundle);
        }
    }
    Ok(exe)
}
