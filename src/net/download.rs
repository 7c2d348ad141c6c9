//! The two downloader backends: native HTTP and external `curl`.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::{Result, UpdraftError};
use crate::crypto::checksum::sha256_verify;
use crate::utils::strings::parse_percentage;

use super::progress::{format_rate, ProgressTracker};
use super::{DownloadRequest, TransferNotification, TransferStatus, TransferSvc};

fn notification(
    request: &DownloadRequest,
    destination: &Path,
    status: TransferStatus,
) -> TransferNotification {
    TransferNotification {
        source: request.url.clone(),
        destination: destination.display().to_string(),
        status,
        percentage: 0.0,
        total_size: -1,
        downloaded: 0,
        message: String::new(),
    }
}

async fn ensure_parent(destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| UpdraftError::fs(parent.to_path_buf(), e))?;
    }
    Ok(())
}

/// Verify the written file against the expected checksum, notifying
/// listeners on mismatch. The file stays on disk either way.
async fn verify_and_finish(
    svc: &TransferSvc,
    request: &DownloadRequest,
    destination: &Path,
    total: i64,
) -> Result<()> {
    if !request.checksum.is_empty() {
        let path = destination.to_path_buf();
        let expected = request.checksum.clone();
        let verified =
            tokio::task::spawn_blocking(move || sha256_verify(&path, &expected))
                .await
                .map_err(|e| UpdraftError::NetworkFailure {
                    operation: "checksum".to_string(),
                    reason: e.to_string(),
                })?;

        if let Err(err) = verified {
            let mut note = notification(request, destination, TransferStatus::Error);
            note.percentage = 100.0;
            note.message = "failed to verify checksum".to_string();
            svc.publish(note);
            return Err(err);
        }
    }

    let mut note = notification(request, destination, TransferStatus::Complete);
    note.percentage = 100.0;
    note.total_size = total;
    note.downloaded = total;
    note.message = "download complete".to_string();
    svc.publish(note);
    Ok(())
}

/// Stream the response body to disk with cancellation and throttled
/// progress events.
pub(crate) async fn download_with_http(
    svc: &TransferSvc,
    cancel: &CancellationToken,
    request: &DownloadRequest,
    destination: &Path,
) -> Result<()> {
    debug!(url = %request.url, dest = %destination.display(), "downloading via http");
    ensure_parent(destination).await?;

    let response = svc
        .http_client()
        .get(&request.url)
        .header(reqwest::header::USER_AGENT, svc.user_agent())
        .send()
        .await
        .map_err(|e| UpdraftError::NetworkFailure {
            operation: "download".to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if status.as_u16() >= 400 {
        // Nothing is written for error responses.
        return Err(UpdraftError::ProtocolError {
            url: request.url.clone(),
            detail: status.to_string(),
        });
    }

    let total = response.content_length().map(|l| l as i64).unwrap_or(-1);
    if total < 0 {
        debug!(url = %request.url, "unknown file size");
    }

    let mut file = tokio::fs::File::create(destination)
        .await
        .map_err(|e| UpdraftError::fs(destination.to_path_buf(), e))?;

    let mut stream = response.bytes_stream();
    let mut tracker = ProgressTracker::new(total, svc.callback_interval());

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                // Partial file is retained for resume/post-mortem.
                let note = notification(request, destination, TransferStatus::Stopped);
                svc.publish(note);
                return Err(UpdraftError::Cancelled);
            }
            chunk = stream.next() => chunk,
        };

        let Some(chunk) = chunk else { break };
        let chunk = chunk.map_err(|e| {
            let mut note = notification(request, destination, TransferStatus::Error);
            note.message = e.to_string();
            svc.publish(note);
            UpdraftError::NetworkFailure {
                operation: "download".to_string(),
                reason: e.to_string(),
            }
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| UpdraftError::fs(destination.to_path_buf(), e))?;

        if let Some(sample) = tracker.advance(chunk.len()) {
            let mut note = notification(request, destination, TransferStatus::InProgress);
            note.percentage = sample.percentage;
            note.total_size = sample.total;
            note.downloaded = sample.downloaded;
            note.message = format_rate(&sample);
            svc.publish(note);
        }
    }

    file.flush().await.map_err(|e| UpdraftError::fs(destination.to_path_buf(), e))?;
    drop(file);

    let written = if total >= 0 { total } else { tracker.downloaded() };
    verify_and_finish(svc, request, destination, written).await
}

/// Drive `curl -L --progress-bar -o <dest> <url>`, polling its stderr for
/// the trailing percentage token on each interval tick.
pub(crate) async fn download_with_curl(
    svc: &TransferSvc,
    cancel: &CancellationToken,
    request: &DownloadRequest,
    destination: &Path,
) -> Result<()> {
    debug!(url = %request.url, dest = %destination.display(), "downloading via curl");
    ensure_parent(destination).await?;

    let mut child = tokio::process::Command::new("curl")
        .arg("-L")
        .arg("--progress-bar")
        .arg("-o")
        .arg(destination)
        .arg(&request.url)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| UpdraftError::NetworkFailure {
            operation: "curl spawn".to_string(),
            reason: e.to_string(),
        })?;

    // curl redraws its bar with carriage returns; keep only the latest tail.
    let latest = Arc::new(Mutex::new(String::new()));
    if let Some(mut stderr) = child.stderr.take() {
        let latest = latest.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            while let Ok(n) = stderr.read(&mut buf).await {
                if n == 0 {
                    break;
                }
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                let mut latest = latest.lock().expect("curl progress lock poisoned");
                *latest = text;
            }
        });
    }

    let mut ticker = tokio::time::interval(svc.callback_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let tail = latest.lock().expect("curl progress lock poisoned").clone();
                let trimmed = tail.trim_end();
                if let Some(tail) = trimmed.len().checked_sub(6).and_then(|i| trimmed.get(i..)) {
                    if let Ok(parsed) = parse_percentage(tail) {
                        let mut note =
                            notification(request, destination, TransferStatus::InProgress);
                        note.percentage = parsed.min(100.0);
                        svc.publish(note);
                    }
                }
            }
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                let note = notification(request, destination, TransferStatus::Stopped);
                svc.publish(note);
                return Err(UpdraftError::Cancelled);
            }
            status = child.wait() => {
                let status = status.map_err(|e| UpdraftError::NetworkFailure {
                    operation: "curl wait".to_string(),
                    reason: e.to_string(),
                })?;
                if !status.success() {
                    let mut note = notification(request, destination, TransferStatus::Error);
                    note.message = format!("curl exited with {status}");
                    svc.publish(note);
                    return Err(UpdraftError::NetworkFailure {
                        operation: "curl".to_string(),
                        reason: format!("curl exited with {status}"),
                    });
                }

                let total = tokio::fs::metadata(destination)
                    .await
                    .map(|m| m.len() as i64)
                    .unwrap_or(-1);
                return verify_and_finish(svc, request, destination, total).await;
            }
        }
    }
}
