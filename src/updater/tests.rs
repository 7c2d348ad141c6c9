use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::clients::CheckClient;
use super::*;
use crate::crypto::ecdsa;
use crate::manifest::ReleaseAsset;

struct FixedClient {
    asset: ReleaseAsset,
}

#[async_trait]
impl CheckClient for FixedClient {
    fn client_ref(&self) -> &str {
        "fixed"
    }

    async fn check_update(
        &self,
        _cancel: &CancellationToken,
        _cfg: &UpdaterConfig,
    ) -> crate::Result<ReleaseAsset> {
        Ok(self.asset.clone())
    }
}

struct FailingClient;

#[async_trait]
impl CheckClient for FailingClient {
    fn client_ref(&self) -> &str {
        "failing"
    }

    async fn check_update(
        &self,
        _cancel: &CancellationToken,
        _cfg: &UpdaterConfig,
    ) -> crate::Result<ReleaseAsset> {
        Err(crate::UpdraftError::CheckFailed { reason: "network: refused".to_string() })
    }
}

fn remote_asset(version: &str) -> ReleaseAsset {
    ReleaseAsset::new()
        .with_artefact_name(format!("tool-linux-amd64-{version}.tar.gz"))
        .with_platform("linux")
        .with_arch("amd64")
        .with_version(version)
        .with_download_url("https://example.com/tool.tar.gz")
}

fn updater_for(version: &str, remote: &str, tmp: &TempDir) -> Arc<UpdaterSvc> {
    let cfg = UpdaterConfig::default()
        .with_version(version)
        .with_temporary_path(tmp.path())
        // A fresh check timestamp keeps the hydrate-time background check
        // quiet so tests drive the machine deterministically.
        .with_last_update_check(chrono::Utc::now())
        .with_check_client(Arc::new(FixedClient { asset: remote_asset(remote) }));
    UpdaterSvc::new(cfg)
}

#[tokio::test]
async fn test_check_latest_update_available() {
    let tmp = TempDir::new().unwrap();
    let updater = updater_for("1.0.0", "1.1.0", &tmp);
    updater.hydrate().await.unwrap();

    let cancel = CancellationToken::new();
    let asset = updater.check_latest(&cancel).await.unwrap();
    assert_eq!(asset.version, "1.1.0");
    assert_eq!(updater.status(), UpdateStatus::UpdateAvailable);
    assert_eq!(updater.selected_asset().unwrap().version, "1.1.0");
}

#[tokio::test]
async fn test_check_latest_equal_version_is_up_to_date() {
    let tmp = TempDir::new().unwrap();
    let updater = updater_for("1.1.0", "1.1.0", &tmp);
    updater.hydrate().await.unwrap();

    let cancel = CancellationToken::new();
    let asset = updater.check_latest(&cancel).await.unwrap();
    // The returned asset carries the (equal) remote version.
    assert_eq!(asset.version, "1.1.0");
    assert_eq!(updater.status(), UpdateStatus::UpToDate);
}

#[tokio::test]
async fn test_check_latest_older_version_without_downgrade() {
    let tmp = TempDir::new().unwrap();
    let updater = updater_for("2.0.0", "1.0.0", &tmp);
    updater.hydrate().await.unwrap();

    let cancel = CancellationToken::new();
    updater.check_latest(&cancel).await.unwrap();
    assert_eq!(updater.status(), UpdateStatus::UpToDate);
}

#[tokio::test]
async fn test_check_latest_downgrade_allowed() {
    let tmp = TempDir::new().unwrap();
    let cfg = UpdaterConfig::default()
        .with_version("2.0.0")
        .with_allow_downgrade(true)
        .with_temporary_path(tmp.path())
        .with_last_update_check(chrono::Utc::now())
        .with_check_client(Arc::new(FixedClient { asset: remote_asset("1.0.0") }));
    let updater = UpdaterSvc::new(cfg);
    updater.hydrate().await.unwrap();

    let cancel = CancellationToken::new();
    updater.check_latest(&cancel).await.unwrap();
    assert_eq!(updater.status(), UpdateStatus::UpdateAvailable);
}

#[tokio::test]
async fn test_check_failure_sets_error_status() {
    let tmp = TempDir::new().unwrap();
    let cfg = UpdaterConfig::default()
        .with_version("1.0.0")
        .with_temporary_path(tmp.path())
        .with_last_update_check(chrono::Utc::now())
        .with_check_client(Arc::new(FailingClient));
    let updater = UpdaterSvc::new(cfg);
    updater.hydrate().await.unwrap();

    let cancel = CancellationToken::new();
    let err = updater.check_latest(&cancel).await.unwrap_err();
    assert!(matches!(err, crate::UpdraftError::CheckFailed { .. }));
    assert_eq!(updater.status(), UpdateStatus::Error);
}

#[tokio::test]
async fn test_check_without_client_fails() {
    let tmp = TempDir::new().unwrap();
    let cfg = UpdaterConfig::default()
        .with_version("1.0.0")
        .with_temporary_path(tmp.path());
    let updater = UpdaterSvc::new(cfg);
    updater.hydrate().await.unwrap();

    let cancel = CancellationToken::new();
    let err = updater.check_latest(&cancel).await.unwrap_err();
    assert!(matches!(err, crate::UpdraftError::ConfigInvalid { .. }));
}

#[tokio::test]
async fn test_hydrate_reads_prior_update_log() {
    let tmp = TempDir::new().unwrap();
    let log_path = tmp.path().join("update.log");
    tokio::fs::write(&log_path, "2026-01-01 10:00:00: Helper finished.\n").await.unwrap();

    let cfg = UpdaterConfig::default()
        .with_version("1.0.0")
        .with_temporary_path(tmp.path())
        .with_log_path(&log_path);
    let updater = UpdaterSvc::new(cfg);
    updater.hydrate().await.unwrap();

    assert_eq!(updater.status(), UpdateStatus::Complete);
    assert!(updater.update_log().contains("Helper finished"));

    // Cleanup removes the log and resets the machine.
    updater.post_install_cleanup().await.unwrap();
    assert!(!log_path.exists());
    assert_eq!(updater.status(), UpdateStatus::Initial);
    assert!(updater.update_log().is_empty());
    assert!(updater.state().log_path.is_none());
}

#[tokio::test]
async fn test_hydrate_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let updater = updater_for("1.0.0", "1.1.0", &tmp);
    updater.hydrate().await.unwrap();
    updater.hydrate().await.unwrap();
    assert_eq!(updater.state().version, "1.0.0");
}

#[tokio::test]
async fn test_download_with_override_rewrites_artefact_path() {
    let tmp = TempDir::new().unwrap();
    let staged = tmp.path().join("staged-update.bin");
    tokio::fs::write(&staged, b"new build").await.unwrap();

    let staged_for_hook = staged.clone();
    let cfg = UpdaterConfig::default()
        .with_version("1.0.0")
        .with_temporary_path(tmp.path())
        .with_last_update_check(chrono::Utc::now())
        .with_check_client(Arc::new(FixedClient { asset: remote_asset("1.1.0") }))
        .with_download_fn(Arc::new(move |_ctx| {
            let path = staged_for_hook.clone();
            Box::pin(async move { Ok(path) })
        }));
    let updater = UpdaterSvc::new(cfg);
    updater.hydrate().await.unwrap();

    let cancel = CancellationToken::new();
    updater.check_latest(&cancel).await.unwrap();
    updater.download_update(&cancel, None).await.unwrap();

    assert_eq!(updater.status(), UpdateStatus::Downloaded);
    let selected = updater.selected_asset().unwrap();
    assert_eq!(selected.artefact_name, staged.display().to_string());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&staged).unwrap().permissions().mode();
        assert_eq!(mode & 0o770, 0o770);
    }
}

#[tokio::test]
async fn test_download_verifies_ecdsa_signature() {
    let tmp = TempDir::new().unwrap();
    let artifact = tmp.path().join("update.bin");
    tokio::fs::write(&artifact, b"signed update bytes").await.unwrap();

    let (private_pem, public_pem) = ecdsa::generate_keypair().unwrap();
    let signing = ecdsa::private_key_from_pem(&private_pem).unwrap();
    let signature = ecdsa::sign_file(&signing, &artifact).unwrap();

    let asset = remote_asset("1.1.0")
        .with_signature(signature.clone())
        .with_signature_type("X509");

    let artifact_for_hook = artifact.clone();
    let cfg = UpdaterConfig::default()
        .with_version("1.0.0")
        .with_temporary_path(tmp.path())
        .with_public_key(public_pem)
        .with_download_fn(Arc::new(move |_ctx| {
            let path = artifact_for_hook.clone();
            Box::pin(async move { Ok(path) })
        }));
    let updater = UpdaterSvc::new(cfg);
    updater.hydrate().await.unwrap();

    let cancel = CancellationToken::new();
    updater.download_update(&cancel, Some(asset.clone())).await.unwrap();
    assert_eq!(updater.status(), UpdateStatus::Downloaded);

    // A tampered artifact fails verification and the machine lands in Error.
    tokio::fs::write(&artifact, b"tampered bytes!!").await.unwrap();
    let err = updater.download_update(&cancel, Some(asset)).await.unwrap_err();
    assert!(matches!(err, crate::UpdraftError::SignatureMismatch { .. }));
    assert_eq!(updater.status(), UpdateStatus::Error);
}

#[tokio::test]
async fn test_signature_without_local_key_is_warning_only() {
    let tmp = TempDir::new().unwrap();
    let artifact = tmp.path().join("update.bin");
    tokio::fs::write(&artifact, b"bytes").await.unwrap();

    let (private_pem, _) = ecdsa::generate_keypair().unwrap();
    let signing = ecdsa::private_key_from_pem(&private_pem).unwrap();
    let signature = ecdsa::sign_file(&signing, &artifact).unwrap();
    let asset = remote_asset("1.1.0").with_signature(signature);

    let artifact_for_hook = artifact.clone();
    let cfg = UpdaterConfig::default()
        .with_version("1.0.0")
        .with_temporary_path(tmp.path())
        .with_download_fn(Arc::new(move |_ctx| {
            let path = artifact_for_hook.clone();
            Box::pin(async move { Ok(path) })
        }));
    let updater = UpdaterSvc::new(cfg);
    updater.hydrate().await.unwrap();

    let cancel = CancellationToken::new();
    updater.download_update(&cancel, Some(asset)).await.unwrap();
    assert_eq!(updater.status(), UpdateStatus::Downloaded);
}

#[tokio::test]
async fn test_download_without_selection_fails() {
    let tmp = TempDir::new().unwrap();
    let updater = updater_for("1.0.0", "1.1.0", &tmp);
    updater.hydrate().await.unwrap();

    let cancel = CancellationToken::new();
    let err = updater.download_update(&cancel, None).await.unwrap_err();
    assert!(matches!(err, crate::UpdraftError::ConfigInvalid { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_perform_update_spawns_helper_detached() {
    let tmp = TempDir::new().unwrap();

    // Stand-in helper that accepts any arguments and exits 0.
    let fake_helper = tmp.path().join("fake-helper");
    tokio::fs::write(&fake_helper, b"#!/bin/sh\nexit 0\n").await.unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&fake_helper, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let artifact = tmp.path().join("new-build.bin");
    tokio::fs::write(&artifact, b"new build").await.unwrap();

    let asset = remote_asset("1.1.0").with_artefact_name(artifact.display().to_string());

    let cfg = UpdaterConfig::default()
        .with_version("1.0.0")
        .with_temporary_path(tmp.path().join("staging"))
        .with_log_path(tmp.path().join("update.log"))
        .with_helper_source(HelperSource::Path(fake_helper))
        .with_launch_args(vec!["--resumed".to_string()]);
    let updater = UpdaterSvc::new(cfg);
    updater.hydrate().await.unwrap();

    {
        let mut inner = updater.inner.lock().unwrap();
        inner.selected = Some(asset);
    }

    let cancel = CancellationToken::new();
    updater.perform_update(&cancel).await.unwrap();
    assert_eq!(updater.status(), UpdateStatus::InProgress);
}

#[tokio::test]
async fn test_state_snapshot() {
    let tmp = TempDir::new().unwrap();
    let updater = updater_for("1.2.3", "1.3.0", &tmp);
    updater.hydrate().await.unwrap();

    let state = updater.state();
    assert_eq!(state.version, "1.2.3");
    assert_eq!(state.status, UpdateStatus::Initial);
    assert!(state.update_asset.is_none());

    let cancel = CancellationToken::new();
    updater.check_latest(&cancel).await.unwrap();
    let state = updater.state();
    assert!(state.last_update_check.is_some());
    assert_eq!(state.update_asset.unwrap().version, "1.3.0");
}
