use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::crypto::sha256_file;
use crate::events::Relay;

fn service() -> TransferSvc {
    let cfg = TransferConfig {
        callback_interval: std::time::Duration::ZERO,
        max_retries: 0,
        ..Default::default()
    };
    TransferSvc::new(cfg, Arc::new(Relay::new()))
}

#[tokio::test]
async fn test_download_writes_file_and_notifies_complete() {
    let mut server = mockito::Server::new_async().await;
    let body = b"release artifact body".to_vec();
    let mock = server
        .mock("GET", "/assets/tool-linux-amd64.tar.gz")
        .with_status(200)
        .with_body(&body)
        .create_async()
        .await;

    let tmp = TempDir::new().unwrap();
    let svc = service();
    let url = format!("{}/assets/tool-linux-amd64.tar.gz", server.url());
    let mut listener = svc.transfer_listener(&url);

    let cancel = CancellationToken::new();
    let request = DownloadRequest::new(&url, tmp.path());
    let dest = svc.download_file(&cancel, &request).await.unwrap();

    assert_eq!(dest.file_name().unwrap(), "tool-linux-amd64.tar.gz");
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), body);
    mock.assert_async().await;

    // The terminal notification arrives, then the channel closes.
    let mut saw_complete = false;
    while let Some(note) = listener.recv().await {
        if note.status == TransferStatus::Complete {
            saw_complete = true;
        }
    }
    assert!(saw_complete);
}

#[tokio::test]
async fn test_download_with_matching_checksum() {
    let mut server = mockito::Server::new_async().await;
    let body = b"checksummed payload".to_vec();
    server.mock("GET", "/a.bin").with_status(200).with_body(&body).create_async().await;

    let expected = {
        use sha2::{Digest, Sha256};
        hex::encode(Sha256::digest(&body))
    };

    let tmp = TempDir::new().unwrap();
    let svc = service();
    let cancel = CancellationToken::new();
    let request =
        DownloadRequest::new(format!("{}/a.bin", server.url()), tmp.path()).with_checksum(expected);
    let dest = svc.download_file(&cancel, &request).await.unwrap();
    assert!(dest.exists());
}

#[tokio::test]
async fn test_checksum_mismatch_is_fatal_and_keeps_file() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/a.bin").with_status(200).with_body(b"actual body").create_async().await;

    let tmp = TempDir::new().unwrap();
    let svc = service();
    let url = format!("{}/a.bin", server.url());
    let mut listener = svc.transfer_listener(&url);

    let cancel = CancellationToken::new();
    let request = DownloadRequest::new(&url, tmp.path()).with_checksum("0".repeat(64));
    let err = svc.download_file(&cancel, &request).await.unwrap_err();
    assert!(matches!(err, UpdraftError::ChecksumMismatch { .. }));

    // File retained for post-mortem inspection.
    let dest = tmp.path().join("a.bin");
    assert!(dest.exists());
    assert_eq!(sha256_file(&dest).unwrap().len(), 64);

    let mut saw_error = false;
    while let Some(note) = listener.recv().await {
        if note.status == TransferStatus::Error {
            saw_error = true;
        }
    }
    assert!(saw_error, "listener must observe the ERROR notification");
}

#[tokio::test]
async fn test_4xx_is_fatal_without_writing() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/gone.bin").with_status(404).create_async().await;

    let tmp = TempDir::new().unwrap();
    let svc = service();
    let cancel = CancellationToken::new();
    let request = DownloadRequest::new(format!("{}/gone.bin", server.url()), tmp.path());
    let err = svc.download_file(&cancel, &request).await.unwrap_err();
    assert!(matches!(err, UpdraftError::ProtocolError { .. }));
    assert!(!tmp.path().join("gone.bin").exists());
}

#[tokio::test]
async fn test_5xx_retries_then_succeeds() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("GET", "/flaky.bin")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;
    let succeeding = server
        .mock("GET", "/flaky.bin")
        .with_status(200)
        .with_body(b"eventually")
        .create_async()
        .await;

    let tmp = TempDir::new().unwrap();
    let cfg = TransferConfig {
        callback_interval: std::time::Duration::ZERO,
        max_retries: 2,
        backoff: Backoff::Constant(std::time::Duration::from_millis(1)),
        ..Default::default()
    };
    let svc = TransferSvc::new(cfg, Arc::new(Relay::new()));

    let cancel = CancellationToken::new();
    let request = DownloadRequest::new(format!("{}/flaky.bin", server.url()), tmp.path());
    let dest = svc.download_file(&cancel, &request).await.unwrap();
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"eventually");
    failing.assert_async().await;
    succeeding.assert_async().await;
}

#[tokio::test]
async fn test_cancellation_notifies_stopped() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/slow.bin")
        .with_status(200)
        .with_body(vec![0u8; 1 << 20])
        .create_async()
        .await;

    let svc = service();
    let tmp = TempDir::new().unwrap();
    let url = format!("{}/slow.bin", server.url());
    let mut listener = svc.transfer_listener(&url);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let request = DownloadRequest::new(&url, tmp.path());
    let err = svc.download_file(&cancel, &request).await.unwrap_err();
    assert!(err.is_cancelled());

    let mut saw_stopped = false;
    while let Some(note) = listener.recv().await {
        if note.status == TransferStatus::Stopped {
            saw_stopped = true;
        }
    }
    assert!(saw_stopped);
}

#[tokio::test]
async fn test_output_name_derived_from_url() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/deep/path/artifact.zip").with_body(b"z").create_async().await;

    let tmp = TempDir::new().unwrap();
    let svc = service();
    let cancel = CancellationToken::new();
    let request =
        DownloadRequest::new(format!("{}/deep/path/artifact.zip", server.url()), tmp.path());
    let dest = svc.download_file(&cancel, &request).await.unwrap();
    assert_eq!(dest.file_name().unwrap(), "artifact.zip");
}

#[test]
fn test_backoff_delays() {
    let constant = Backoff::Constant(std::time::Duration::from_secs(2));
    assert_eq!(constant.delay(0), std::time::Duration::from_secs(2));
    assert_eq!(constant.delay(5), std::time::Duration::from_secs(2));

    let exp = Backoff::default();
    assert_eq!(exp.delay(0), std::time::Duration::from_secs(1));
    assert_eq!(exp.delay(1), std::time::Duration::from_secs(2));
    assert_eq!(exp.delay(10), crate::constants::MAX_RETRY_BACKOFF);
}

#[test]
fn test_terminal_statuses() {
    assert!(!TransferStatus::InProgress.is_terminal());
    assert!(TransferStatus::Complete.is_terminal());
    assert!(TransferStatus::Error.is_terminal());
    assert!(TransferStatus::Stopped.is_terminal());
}
