//! End-to-end publisher -> consumer pipeline: compress artifacts, scan and
//! sign them, serve the resulting manifest, and drive the updater through
//! check, download, and verification.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use updraft::archive::{compress, extract, CompressOptions, ExtractOptions};
use updraft::crypto::ecdsa;
use updraft::events::Relay;
use updraft::releaser::{ReleaserConfig, ReleaserSvc};
use updraft::updater::clients::JsonClient;
use updraft::updater::{UpdateStatus, UpdaterConfig, UpdaterSvc};

fn build_artifact(dir: &std::path::Path, name: &str, payload: &[u8]) {
    let staging = dir.join("staging");
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join("tool"), payload).unwrap();

    let cancel = CancellationToken::new();
    let opts = CompressOptions::new(dir.join(name)).with_path(staging.join("tool"));
    compress(&cancel, &opts).unwrap();
    fs::remove_dir_all(&staging).unwrap();
}

#[tokio::test]
async fn test_full_pipeline_check_download_verify() {
    let publish_dir = TempDir::new().unwrap();
    build_artifact(publish_dir.path(), "tool-linux-amd64-2.0.0.tar.gz", b"linux build v2");
    build_artifact(publish_dir.path(), "tool-darwin-arm64-2.0.0.tar.gz", b"darwin build v2");

    // Publisher side: scan, sign, summarise.
    let (private_pem, public_pem) = ecdsa::generate_keypair().unwrap();
    let config = ReleaserConfig::default()
        .with_target_path(publish_dir.path())
        .with_output_path(publish_dir.path())
        .with_file_pattern("tool-{platform}-{arch}{variant}{version}")
        .with_allow_any_extension(true)
        .with_version("2.0.0")
        .with_private_key(private_pem);
    let mut releaser = ReleaserSvc::new(config, Arc::new(Relay::new()));
    releaser.hydrate().unwrap();
    let summary = releaser.generate_release_summary().unwrap();
    assert_eq!(summary.assets.len(), 2);
    assert!(publish_dir.path().join("checksums.txt").exists());
    assert!(publish_dir.path().join("version.json").exists());

    // Serve the manifest and the artifact over HTTP.
    let mut server = mockito::Server::new_async().await;
    let mut served = summary.clone();
    for asset in &mut served.assets {
        asset.download_url = format!("{}/dl/{}", server.url(), asset.artefact_name);
    }
    server
        .mock("GET", "/version.json")
        .with_header("content-type", "application/json")
        .with_body(serde_json::to_string(&served).unwrap())
        .create_async()
        .await;
    let artifact_bytes =
        fs::read(publish_dir.path().join("tool-linux-amd64-2.0.0.tar.gz")).unwrap();
    server
        .mock("GET", "/dl/tool-linux-amd64-2.0.0.tar.gz")
        .with_body(&artifact_bytes)
        .create_async()
        .await;

    // Consumer side: check, download, verify checksum and signature.
    let download_dir = TempDir::new().unwrap();
    let cfg = UpdaterConfig::default()
        .with_platform("linux")
        .with_arch("amd64")
        .with_version("1.0.0")
        .with_temporary_path(download_dir.path())
        .with_public_key(public_pem)
        .with_last_update_check(chrono::Utc::now())
        .with_check_client(Arc::new(JsonClient::from_url(format!(
            "{}/version.json",
            server.url()
        ))));
    let updater = UpdaterSvc::new(cfg);
    updater.hydrate().await.unwrap();

    let cancel = CancellationToken::new();
    let asset = updater.check_latest(&cancel).await.unwrap();
    assert_eq!(asset.version, "2.0.0");
    assert_eq!(asset.platform, "linux");
    assert_eq!(updater.status(), UpdateStatus::UpdateAvailable);

    updater.download_update(&cancel, None).await.unwrap();
    assert_eq!(updater.status(), UpdateStatus::Downloaded);

    // The downloaded archive extracts back to the original payload.
    let selected = updater.selected_asset().unwrap();
    let local = std::path::PathBuf::from(&selected.artefact_name);
    assert!(local.exists());

    let out = download_dir.path().join("unpacked");
    extract(&cancel, &local, &out, &ExtractOptions::default()).unwrap();
    assert_eq!(fs::read(out.join("tool")).unwrap(), b"linux build v2");
}

#[tokio::test]
async fn test_pipeline_detects_tampered_artifact() {
    let publish_dir = TempDir::new().unwrap();
    build_artifact(publish_dir.path(), "tool-linux-amd64-2.0.0.tar.gz", b"genuine build");

    let config = ReleaserConfig::default()
        .with_target_path(publish_dir.path())
        .with_output_path(publish_dir.path())
        .with_file_pattern("tool-{platform}-{arch}{variant}{version}")
        .with_allow_any_extension(true)
        .with_generate_signatures(false)
        .with_version("2.0.0");
    let mut releaser = ReleaserSvc::new(config, Arc::new(Relay::new()));
    releaser.hydrate().unwrap();
    let summary = releaser.generate_release_summary().unwrap();

    // Serve a body that does not match the published checksum.
    let mut server = mockito::Server::new_async().await;
    let mut served = summary.clone();
    for asset in &mut served.assets {
        asset.download_url = format!("{}/dl/{}", server.url(), asset.artefact_name);
    }
    server
        .mock("GET", "/version.json")
        .with_body(serde_json::to_string(&served).unwrap())
        .create_async()
        .await;
    server
        .mock("GET", "/dl/tool-linux-amd64-2.0.0.tar.gz")
        .with_body(b"tampered body")
        .create_async()
        .await;

    let download_dir = TempDir::new().unwrap();
    let cfg = UpdaterConfig::default()
        .with_platform("linux")
        .with_arch("amd64")
        .with_version("1.0.0")
        .with_temporary_path(download_dir.path())
        .with_last_update_check(chrono::Utc::now())
        .with_check_client(Arc::new(JsonClient::from_url(format!(
            "{}/version.json",
            server.url()
        ))));
    let updater = UpdaterSvc::new(cfg);
    updater.hydrate().await.unwrap();

    let cancel = CancellationToken::new();
    updater.check_latest(&cancel).await.unwrap();
    let err = updater.download_update(&cancel, None).await.unwrap_err();
    assert!(matches!(err, updraft::UpdraftError::ChecksumMismatch { .. }));
    assert_eq!(updater.status(), UpdateStatus::Error);
}
