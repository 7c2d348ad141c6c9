//! Streaming downloads with progress fan-out.
//!
//! [`TransferSvc`] owns a map of active transfers keyed by destination path
//! and a per-source-URL registry of progress listeners. Two downloader
//! backends are available: native HTTP via `reqwest` with a throttled
//! progress reader, and an external `curl` child process whose progress bar
//! is polled from stderr. Backend selection honours `prefer_curl`; on macOS
//! the preference is forced on at hydrate time (OS download provenance
//! policies), falling back to native when `curl` is absent.
//!
//! Listener contract: channels for a source URL are closed exactly once, on
//! the first terminal notification ([`TransferStatus::Complete`],
//! [`TransferStatus::Error`], [`TransferStatus::Stopped`]). Producers never
//! block on slow consumers - updates are dropped instead - so no
//! `InProgress` notification is guaranteed to be delivered.
//!
//! After a successful transfer, a caller-supplied checksum is verified; a
//! mismatch notifies listeners with `Error` and leaves the file on disk for
//! post-mortem inspection.

mod download;
mod progress;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::constants::{DOWNLOAD_CALLBACK_INTERVAL, MAX_DOWNLOAD_RETRIES, MAX_RETRY_BACKOFF};
use crate::core::{Result, UpdraftError};
use crate::events::{Relay, RelayEvent};
use crate::utils::platform::find_in_path;
use crate::utils::strings::filename_from_url;

/// Relay channel used by the transfer service.
pub const RELAY_NET_CHANNEL: &str = "net";
/// Relay ref for download lifecycle events.
pub const RELAY_NET_DOWNLOAD: &str = "net.download";
/// Relay ref for service log lines.
pub const RELAY_NET_LOG: &str = "net.log";

/// State of one transfer as reported to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Bytes are flowing.
    InProgress,
    /// Finished and verified.
    Complete,
    /// Failed; `message` carries the cause.
    Error,
    /// Cancelled by the caller.
    Stopped,
}

impl TransferStatus {
    /// Terminal states close listener channels.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Progress notification delivered to transfer listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferNotification {
    /// Source URL.
    pub source: String,
    /// Destination path on disk.
    pub destination: String,
    /// Current status.
    pub status: TransferStatus,
    /// Completion percentage in `[0, 100]`; 0 when the total is unknown.
    pub percentage: f64,
    /// Total size in bytes; -1 when the remote did not say.
    #[serde(default)]
    pub total_size: i64,
    /// Bytes written so far.
    #[serde(default)]
    pub downloaded: i64,
    /// Free-text detail (speed, error cause, ...).
    #[serde(default)]
    pub message: String,
}

/// Retry pacing for transient download failures.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// The same delay between every attempt.
    Constant(Duration),
    /// Doubling delay, capped.
    Exponential {
        /// First delay.
        initial: Duration,
        /// Ceiling applied after doubling.
        cap: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential { initial: Duration::from_secs(1), cap: MAX_RETRY_BACKOFF }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Constant(d) => *d,
            Self::Exponential { initial, cap } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                (*initial).saturating_mul(factor).min(*cap)
            }
        }
    }
}

/// Service-level configuration for [`TransferSvc`].
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Prefer the external `curl` backend when it is on `PATH`.
    pub prefer_curl: bool,
    /// Minimum interval between progress notifications.
    pub callback_interval: Duration,
    /// `User-Agent` header for native downloads.
    pub user_agent: String,
    /// Retries for transient failures.
    pub max_retries: u32,
    /// Pacing between retries.
    pub backoff: Backoff,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            prefer_curl: false,
            callback_interval: DOWNLOAD_CALLBACK_INTERVAL,
            user_agent: concat!("updraft/", env!("CARGO_PKG_VERSION")).to_string(),
            max_retries: MAX_DOWNLOAD_RETRIES,
            backoff: Backoff::default(),
        }
    }
}

/// Per-download request.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    /// Source URL.
    pub url: String,
    /// Expected hex SHA-256 of the body; empty skips verification.
    pub checksum: String,
    /// Directory receiving the file.
    pub destination_folder: PathBuf,
    /// File name inside the destination folder; derived from the URL when
    /// empty.
    pub output_file_name: String,
}

impl DownloadRequest {
    /// A request for `url` saving into `destination_folder`.
    pub fn new(url: impl Into<String>, destination_folder: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination_folder: destination_folder.into(),
            ..Default::default()
        }
    }

    /// Expect the body to hash to `checksum`.
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = checksum.into();
        self
    }

    /// Override the output file name.
    pub fn with_output_file_name(mut self, name: impl Into<String>) -> Self {
        self.output_file_name = name.into();
        self
    }
}

/// The transfer service. Shareable behind an `Arc`; all methods take `&self`.
pub struct TransferSvc {
    cfg: TransferConfig,
    relay: Arc<Relay>,
    client: reqwest::Client,
    prefer_curl: AtomicBool,
    transfers: Mutex<HashMap<String, TransferNotification>>,
    listeners: Mutex<HashMap<String, Vec<mpsc::Sender<TransferNotification>>>>,
}

impl TransferSvc {
    /// Create the service. Call [`hydrate`](Self::hydrate) before use.
    pub fn new(cfg: TransferConfig, relay: Arc<Relay>) -> Self {
        let prefer_curl = AtomicBool::new(cfg.prefer_curl);
        Self {
            cfg,
            relay,
            client: reqwest::Client::new(),
            prefer_curl,
            transfers: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the backend preference against the environment. Idempotent.
    ///
    /// macOS forces the `curl` preference on; a preference without `curl` on
    /// `PATH` reverts to the native backend with a warning.
    pub fn hydrate(&self) {
        if cfg!(target_os = "macos") {
            self.prefer_curl.store(true, Ordering::Relaxed);
        }
        if self.prefer_curl.load(Ordering::Relaxed) && find_in_path("curl").is_none() {
            warn!("curl preferred but not found on PATH, using native downloads");
            self.relay.warn(RelayEvent::new(
                RELAY_NET_CHANNEL,
                RELAY_NET_LOG,
                "curl set as preference but not available",
            ));
            self.prefer_curl.store(false, Ordering::Relaxed);
        }
    }

    /// Whether downloads will use the external `curl` backend.
    pub fn uses_curl(&self) -> bool {
        self.prefer_curl.load(Ordering::Relaxed)
    }

    /// Subscribe to progress updates for a source URL.
    ///
    /// The channel holds up to 10 undelivered updates; older ones are
    /// dropped rather than blocking the transfer. The channel closes on the
    /// first terminal notification.
    pub fn transfer_listener(&self, source_url: &str) -> mpsc::Receiver<TransferNotification> {
        let (tx, rx) = mpsc::channel(10);
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .entry(source_url.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Close every listener channel for a source URL.
    pub fn close_listeners(&self, source_url: &str) {
        self.listeners.lock().expect("listener lock poisoned").remove(source_url);
        // Senders drop here; receivers observe channel closure.
    }

    /// Snapshot of the most recent notification per destination.
    pub fn transfers_status(&self) -> HashMap<String, TransferNotification> {
        self.transfers.lock().expect("transfer state lock poisoned").clone()
    }

    /// Record and fan out one notification. Terminal notifications close the
    /// URL's listener channels exactly once.
    pub(crate) fn publish(&self, notification: TransferNotification) {
        self.transfers
            .lock()
            .expect("transfer state lock poisoned")
            .insert(notification.destination.clone(), notification.clone());

        {
            let listeners = self.listeners.lock().expect("listener lock poisoned");
            if let Some(channels) = listeners.get(&notification.source) {
                for tx in channels {
                    // Non-blocking: drop updates to slow subscribers.
                    let _ = tx.try_send(notification.clone());
                }
            }
        }

        self.relay.info(
            RelayEvent::new(RELAY_NET_CHANNEL, RELAY_NET_DOWNLOAD, notification.message.clone())
                .with_data(&notification),
        );

        if notification.status.is_terminal() {
            self.close_listeners(&notification.source);
        }
    }

    /// Download a file, verifying its checksum when one is supplied.
    ///
    /// Returns the destination path. Transient failures (connection errors,
    /// 5xx responses) are retried per the configured backoff; 4xx responses
    /// and verification failures are fatal.
    pub async fn download_file(
        &self,
        cancel: &CancellationToken,
        request: &DownloadRequest,
    ) -> Result<PathBuf> {
        let file_name = if request.output_file_name.is_empty() {
            filename_from_url(&request.url)?
        } else {
            request.output_file_name.clone()
        };
        let destination = request.destination_folder.join(&file_name);

        self.publish(TransferNotification {
            source: request.url.clone(),
            destination: destination.display().to_string(),
            status: TransferStatus::InProgress,
            percentage: 0.0,
            total_size: -1,
            downloaded: 0,
            message: format!("starting download: {}", request.url),
        });

        let mut attempt: u32 = 0;
        loop {
            let result = if self.uses_curl() {
                download::download_with_curl(self, cancel, request, &destination).await
            } else {
                download::download_with_http(self, cancel, request, &destination).await
            };

            match result {
                Ok(()) => return Ok(destination),
                Err(err) if is_retryable(&err) && attempt < self.cfg.max_retries => {
                    let delay = self.cfg.backoff.delay(attempt);
                    warn!(url = %request.url, attempt, error = %err,
                        "transient download failure, retrying");
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub(crate) fn callback_interval(&self) -> Duration {
        self.cfg.callback_interval
    }

    pub(crate) fn user_agent(&self) -> &str {
        &self.cfg.user_agent
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.client
    }
}

/// 5xx responses and pre-status network errors are retryable; everything
/// else (4xx, verification failures, cancellation) is fatal.
fn is_retryable(err: &UpdraftError) -> bool {
    match err {
        UpdraftError::NetworkFailure { .. } => true,
        UpdraftError::ProtocolError { detail, .. } => detail.starts_with('5'),
        UpdraftError::HttpError(e) => e.is_connect() || e.is_timeout(),
        _ => false,
    }
}
