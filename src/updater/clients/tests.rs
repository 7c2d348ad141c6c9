use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::manifest::{ReleaseAsset, ReleaseSummary};
use crate::updater::config::UpdaterConfig;
use crate::UpdraftError;

fn local_cfg(platform: &str, arch: &str) -> UpdaterConfig {
    UpdaterConfig::default()
        .with_platform(platform)
        .with_arch(arch)
        .with_version("1.0.0")
}

fn release_json(tag: &str, prerelease: bool, assets: &[(&str, &str)]) -> String {
    let assets: Vec<serde_json::Value> = assets
        .iter()
        .map(|(name, digest)| {
            serde_json::json!({
                "name": name,
                "browser_download_url": format!("https://example.com/dl/{name}"),
                "size": 4096,
                "digest": if digest.is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::Value::String(digest.to_string())
                },
            })
        })
        .collect();

    serde_json::json!({
        "tag_name": tag,
        "prerelease": prerelease,
        "html_url": format!("https://github.com/acme/tool/releases/{tag}"),
        "body": "release notes",
        "assets": assets,
    })
    .to_string()
}

mod github_client {
    use super::*;

    #[tokio::test]
    async fn test_default_selection_matches_platform_arch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/tool/releases/latest")
            .with_header("content-type", "application/json")
            .with_body(release_json(
                "v2.0.0",
                false,
                &[
                    ("checksums.txt", ""),
                    ("tool-src.tar.gz", ""),
                    ("tool-windows-amd64.zip", ""),
                    ("tool-linux-amd64.tar.gz", "sha256:abcd1234"),
                    ("tool-darwin-arm64.tar.gz", ""),
                ],
            ))
            .create_async()
            .await;

        let client = GithubClient::new("acme", "tool").with_api_base(server.url());
        let cancel = CancellationToken::new();
        let asset =
            client.check_update(&cancel, &local_cfg("linux", "amd64")).await.unwrap();

        assert_eq!(asset.artefact_name, "tool-linux-amd64.tar.gz");
        assert_eq!(asset.platform, "linux");
        assert_eq!(asset.arch, "amd64");
        assert_eq!(asset.version, "2.0.0");
        assert_eq!(asset.checksum, "abcd1234");
        assert_eq!(asset.size_bytes, 4096);
        assert!(asset.download_url.ends_with("tool-linux-amd64.tar.gz"));
    }

    #[tokio::test]
    async fn test_prerelease_rejected_by_default() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/tool/releases/latest")
            .with_body(release_json("v2.0.0-rc.1", true, &[("tool-linux-amd64.tar.gz", "")]))
            .create_async()
            .await;

        let client = GithubClient::new("acme", "tool").with_api_base(server.url());
        let cancel = CancellationToken::new();
        let err =
            client.check_update(&cancel, &local_cfg("linux", "amd64")).await.unwrap_err();
        assert!(matches!(err, UpdraftError::CheckFailed { ref reason } if reason.contains("prerelease")));
    }

    #[tokio::test]
    async fn test_prerelease_accepted_when_allowed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/tool/releases/latest")
            .with_body(release_json("v2.0.0-rc.1", true, &[("tool-linux-amd64.tar.gz", "")]))
            .create_async()
            .await;

        let client = GithubClient::new("acme", "tool").with_api_base(server.url());
        let cfg = local_cfg("linux", "amd64").with_allow_prerelease(true);
        let cancel = CancellationToken::new();
        let asset = client.check_update(&cancel, &cfg).await.unwrap();
        assert_eq!(asset.version, "2.0.0-rc.1");
    }

    #[tokio::test]
    async fn test_empty_platform_is_config_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/tool/releases/latest")
            .with_body(release_json("v2.0.0", false, &[("tool-linux-amd64.tar.gz", "")]))
            .create_async()
            .await;

        let client = GithubClient::new("acme", "tool").with_api_base(server.url());
        let cfg = local_cfg("", "amd64");
        let cancel = CancellationToken::new();
        let err = client.check_update(&cancel, &cfg).await.unwrap_err();
        assert!(matches!(err, UpdraftError::ConfigInvalid { .. }));
    }

    #[tokio::test]
    async fn test_tagged_release_fetch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/tool/releases/tags/v1.5.0")
            .with_body(release_json("v1.5.0", false, &[("tool-linux-amd64.tar.gz", "")]))
            .create_async()
            .await;

        let client =
            GithubClient::new("acme", "tool").with_api_base(server.url()).with_tag("v1.5.0");
        let cancel = CancellationToken::new();
        let asset =
            client.check_update(&cancel, &local_cfg("linux", "amd64")).await.unwrap();
        assert_eq!(asset.version, "1.5.0");
    }

    #[tokio::test]
    async fn test_missing_release_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/tool/releases/latest")
            .with_status(404)
            .create_async()
            .await;

        let client = GithubClient::new("acme", "tool").with_api_base(server.url());
        let cancel = CancellationToken::new();
        let err =
            client.check_update(&cancel, &local_cfg("linux", "amd64")).await.unwrap_err();
        assert!(matches!(err, UpdraftError::CheckFailed { ref reason } if reason.contains("not-found")));
    }

    #[tokio::test]
    async fn test_pattern_selection_matches_variant() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/tool/releases/latest")
            .with_body(release_json(
                "v3.0.0",
                false,
                &[
                    ("tool-linux-amd64.tar.gz", ""),
                    ("tool-linux-amd64-webkit241.tar.gz", ""),
                ],
            ))
            .create_async()
            .await;

        let client = GithubClient::new("acme", "tool")
            .with_api_base(server.url())
            .with_select_asset_pattern("tool-{platform}-{arch}{variant}");
        let cfg = local_cfg("linux", "amd64").with_variant("webkit241");
        let cancel = CancellationToken::new();
        let asset = client.check_update(&cancel, &cfg).await.unwrap();
        assert_eq!(asset.artefact_name, "tool-linux-amd64-webkit241.tar.gz");
        assert_eq!(asset.variant, "webkit241");
    }

    #[tokio::test]
    async fn test_selection_closure_wins() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/tool/releases/latest")
            .with_body(release_json(
                "v3.0.0",
                false,
                &[("a-linux-amd64.zip", ""), ("b-linux-amd64.zip", "")],
            ))
            .create_async()
            .await;

        let client = GithubClient::new("acme", "tool")
            .with_api_base(server.url())
            .with_select_asset_fn(Box::new(|release| {
                release
                    .assets
                    .iter()
                    .find(|a| a.name.starts_with("b-"))
                    .cloned()
                    .map(|a| (a, String::new()))
            }));
        let cancel = CancellationToken::new();
        let asset =
            client.check_update(&cancel, &local_cfg("linux", "amd64")).await.unwrap();
        assert_eq!(asset.artefact_name, "b-linux-amd64.zip");
    }
}

mod json_client {
    use super::*;

    fn summary(version: &str) -> ReleaseSummary {
        ReleaseSummary {
            version: version.to_string(),
            published_at: Some(chrono::Utc::now()),
            assets: vec![
                ReleaseAsset::new()
                    .with_artefact_name("tool-linux-amd64.tar.gz")
                    .with_platform("linux")
                    .with_arch("amd64")
                    .with_version(version)
                    .with_download_url("https://example.com/dl/tool-linux-amd64.tar.gz"),
                ReleaseAsset::new()
                    .with_artefact_name("tool-darwin-arm64.tar.gz")
                    .with_platform("darwin")
                    .with_arch("arm64")
                    .with_version(version)
                    .with_download_url("https://example.com/dl/tool-darwin-arm64.tar.gz"),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_from_url_selects_matching_asset() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/version.json")
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&summary("2.2.0")).unwrap())
            .create_async()
            .await;

        let client = JsonClient::from_url(format!("{}/version.json", server.url()));
        let cancel = CancellationToken::new();
        let asset =
            client.check_update(&cancel, &local_cfg("darwin", "arm64")).await.unwrap();
        assert_eq!(asset.artefact_name, "tool-darwin-arm64.tar.gz");
        assert_eq!(asset.version, "2.2.0");
    }

    #[tokio::test]
    async fn test_from_url_no_match_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/version.json")
            .with_body(serde_json::to_string(&summary("2.2.0")).unwrap())
            .create_async()
            .await;

        let client = JsonClient::from_url(format!("{}/version.json", server.url()));
        let cancel = CancellationToken::new();
        let err =
            client.check_update(&cancel, &local_cfg("windows", "amd64")).await.unwrap_err();
        assert!(matches!(err, UpdraftError::CheckFailed { ref reason } if reason.contains("not-found")));
    }

    #[tokio::test]
    async fn test_custom_fetch_closure() {
        let client = JsonClient::new(Box::new(|_cancel, query| {
            Box::pin(async move {
                select_matching_asset(
                    &super::summary_for_closure(),
                    &query,
                )
            })
        }));

        let cancel = CancellationToken::new();
        let asset =
            client.check_update(&cancel, &local_cfg("linux", "amd64")).await.unwrap();
        assert_eq!(asset.platform, "linux");
    }

    #[test]
    fn test_select_requires_parsable_version() {
        let mut bad = summary("2.2.0");
        bad.version = "not-a-version".to_string();
        let query = UpdateQuery {
            platform: "linux".to_string(),
            arch: "amd64".to_string(),
            variant: String::new(),
        };
        let err = select_matching_asset(&bad, &query).unwrap_err();
        assert!(matches!(err, UpdraftError::CheckFailed { ref reason } if reason.contains("parse")));
    }

    #[test]
    fn test_select_fills_missing_asset_version() {
        let mut summary = summary("2.2.0");
        summary.assets[0].version = String::new();
        let query = UpdateQuery {
            platform: "linux".to_string(),
            arch: "amd64".to_string(),
            variant: String::new(),
        };
        let asset = select_matching_asset(&summary, &query).unwrap();
        assert_eq!(asset.version, "2.2.0");
    }
}

fn summary_for_closure() -> ReleaseSummary {
    ReleaseSummary {
        version: "9.0.0".to_string(),
        assets: vec![ReleaseAsset::new()
            .with_artefact_name("tool-linux-amd64.tar.gz")
            .with_platform("linux")
            .with_arch("amd64")
            .with_version("9.0.0")],
        ..Default::default()
    }
}
