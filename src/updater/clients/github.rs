//! GitHub Releases check client.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::{Result, UpdraftError};
use crate::manifest::ReleaseAsset;
use crate::releaser::compile_release_template;
use crate::releaser::ReleaserConfig;
use crate::updater::config::UpdaterConfig;
use crate::utils::platform::guess_asset_platform_arch;

use super::CheckClient;

/// One asset of a GitHub release, as the API returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubReleaseAsset {
    /// Asset file name.
    pub name: String,
    /// Direct download link.
    pub browser_download_url: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: i64,
    /// Content digest (`sha256:<hex>`) when the API supplies one.
    #[serde(default)]
    pub digest: Option<String>,
}

impl GithubReleaseAsset {
    /// The hex checksum from the API digest, when present.
    fn checksum(&self) -> String {
        self.digest
            .as_deref()
            .map(|d| d.strip_prefix("sha256:").unwrap_or(d).to_string())
            .unwrap_or_default()
    }
}

/// A GitHub release, as the API returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    /// Release tag (`v1.2.3`).
    pub tag_name: String,
    /// Whether the release is marked as a pre-release.
    #[serde(default)]
    pub prerelease: bool,
    /// Release web page.
    #[serde(default)]
    pub html_url: String,
    /// Release notes body.
    #[serde(default)]
    pub body: String,
    /// The release's assets.
    #[serde(default)]
    pub assets: Vec<GithubReleaseAsset>,
}

/// User-supplied asset selection: return the chosen asset and the variant
/// tag it satisfies.
pub type SelectAssetFn =
    Box<dyn Fn(&GithubRelease) -> Option<(GithubReleaseAsset, String)> + Send + Sync>;

/// Check client over the GitHub Releases API.
///
/// Asset selection precedence: the user closure, then a reverse-template
/// pattern, then a name heuristic that guesses platform and architecture
/// from each asset name while skipping checksum files and source archives.
pub struct GithubClient {
    owner: String,
    repo: String,
    tag: Option<String>,
    api_base: String,
    client: reqwest::Client,
    select_asset_fn: Option<SelectAssetFn>,
    select_asset_pattern: Option<String>,
}

impl GithubClient {
    /// A client fetching the latest release of `owner/repo`.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            tag: None,
            api_base: "https://api.github.com".to_string(),
            client: reqwest::Client::new(),
            select_asset_fn: None,
            select_asset_pattern: None,
        }
    }

    /// Pin the check to a specific release tag instead of the latest.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Override the API base URL (self-hosted GitHub, tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Select assets with a custom closure.
    pub fn with_select_asset_fn(mut self, f: SelectAssetFn) -> Self {
        self.select_asset_fn = Some(f);
        self
    }

    /// Select assets by matching their names against a reverse-template
    /// pattern (`myapp-{platform}-{arch}{variant}{version}`).
    pub fn with_select_asset_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.select_asset_pattern = Some(pattern.into());
        self
    }

    async fn fetch_release(&self, cancel: &CancellationToken) -> Result<GithubRelease> {
        let url = match &self.tag {
            Some(tag) => format!(
                "{}/repos/{}/{}/releases/tags/{tag}",
                self.api_base, self.owner, self.repo
            ),
            None => format!(
                "{}/repos/{}/{}/releases/latest",
                self.api_base, self.owner, self.repo
            ),
        };

        let request = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, concat!("updraft/", env!("CARGO_PKG_VERSION")))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(UpdraftError::Cancelled),
            response = request.send() => response,
        }
        .map_err(|e| UpdraftError::CheckFailed { reason: format!("network: {e}") })?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(UpdraftError::CheckFailed {
                reason: format!("not-found: no release at {url}"),
            });
        }
        if !status.is_success() {
            return Err(UpdraftError::CheckFailed {
                reason: format!("protocol: {status} from {url}"),
            });
        }

        response
            .json::<GithubRelease>()
            .await
            .map_err(|e| UpdraftError::CheckFailed { reason: format!("parse: {e}") })
    }

    /// Selection via the reverse-template pattern: accept the first asset
    /// whose captured platform, arch, and variant match the configuration.
    fn select_by_pattern(
        &self,
        pattern: &str,
        release: &GithubRelease,
        cfg: &UpdaterConfig,
    ) -> Result<Option<ReleaseAsset>> {
        let template_cfg = ReleaserConfig::default()
            .with_file_pattern(pattern)
            .with_allow_any_extension(true);
        let re = compile_release_template(&template_cfg)?;

        let version = release.tag_name.trim_start_matches('v').to_string();

        for asset in &release.assets {
            if asset.name.ends_with(".asc") || asset.name.ends_with(".asc.sig") {
                continue;
            }
            let Some(caps) = re.captures(&asset.name) else { continue };

            let capture = |field: &str| {
                caps.name(field).map(|m| m.as_str()).unwrap_or_default()
            };
            let platform = capture("platform").to_string();
            let arch = capture("arch").to_string();
            let variant =
                capture("variant").trim_start_matches(['-', '_', '/']).to_string();

            if cfg.platform != platform || cfg.architecture != arch || cfg.variant != variant {
                continue;
            }

            return Ok(Some(
                ReleaseAsset::new()
                    .with_artefact_name(&asset.name)
                    .with_platform(platform)
                    .with_arch(arch)
                    .with_variant(variant)
                    .with_version(&version)
                    .with_download_url(&asset.browser_download_url)
                    .with_checksum(asset.checksum())
                    .with_size(asset.size),
            ));
        }
        Ok(None)
    }

    /// The default heuristic: guess platform and arch from each asset name,
    /// skip checksum files and source archives, honour the variant filter,
    /// and take the first survivor.
    fn select_default(
        release: &GithubRelease,
        cfg: &UpdaterConfig,
    ) -> Result<(GithubReleaseAsset, String)> {
        let want_os = cfg.platform.to_ascii_lowercase();
        let want_arch = cfg.architecture.to_ascii_lowercase();

        // Selection needs both coordinates; refuse to guess with half a key.
        if want_os.is_empty() || want_arch.is_empty() {
            return Err(UpdraftError::config("platform/arch cannot be empty"));
        }

        for asset in &release.assets {
            let name = asset.name.to_ascii_lowercase();
            let (platform, arch) = guess_asset_platform_arch(&name);
            if platform != want_os || arch != want_arch {
                continue;
            }
            if is_checksum_name(&name) || is_source_archive(&name) {
                continue;
            }

            let mut variant = String::new();
            if !cfg.variant.is_empty() {
                if name.contains(&cfg.variant.to_ascii_lowercase()) {
                    variant = cfg.variant.clone();
                } else {
                    continue;
                }
            }

            return Ok((asset.clone(), variant));
        }

        Err(UpdraftError::CheckFailed {
            reason: format!("not-found: no asset for {want_os}/{want_arch}"),
        })
    }
}

#[async_trait]
impl CheckClient for GithubClient {
    fn client_ref(&self) -> &str {
        "from_github"
    }

    async fn check_update(
        &self,
        cancel: &CancellationToken,
        cfg: &UpdaterConfig,
    ) -> Result<ReleaseAsset> {
        let release = self.fetch_release(cancel).await?;

        if release.prerelease && !cfg.allow_prerelease {
            return Err(UpdraftError::CheckFailed {
                reason: format!(
                    "policy: latest is prerelease ({}), but prereleases not allowed",
                    release.tag_name
                ),
            });
        }

        let version = release.tag_name.trim_start_matches('v').to_string();
        debug!(tag = %release.tag_name, assets = release.assets.len(), "fetched release");

        if let Some(select) = &self.select_asset_fn {
            let (chosen, variant) = select(&release).ok_or_else(|| {
                UpdraftError::CheckFailed {
                    reason: "not-found: selection closure matched no asset".to_string(),
                }
            })?;
            return finish_selection(&chosen, variant, &version);
        }

        if let Some(pattern) = &self.select_asset_pattern {
            if let Some(asset) = self.select_by_pattern(pattern, &release, cfg)? {
                return Ok(asset);
            }
            return Err(UpdraftError::CheckFailed {
                reason: format!("not-found: no asset matched pattern {pattern:?}"),
            });
        }

        let (chosen, variant) = Self::select_default(&release, cfg)?;
        finish_selection(&chosen, variant, &version)
    }
}

/// Build the returned [`ReleaseAsset`] from a chosen GitHub asset, guessing
/// platform and arch from the name.
fn finish_selection(
    chosen: &GithubReleaseAsset,
    variant: String,
    version: &str,
) -> Result<ReleaseAsset> {
    let (platform, arch) = guess_asset_platform_arch(&chosen.name);
    if platform.is_empty() || arch.is_empty() {
        return Err(UpdraftError::CheckFailed {
            reason: format!(
                "not-found: cannot determine platform/arch from asset {:?}",
                chosen.name
            ),
        });
    }

    let asset = ReleaseAsset::new()
        .with_artefact_name(&chosen.name)
        .with_platform(platform)
        .with_arch(arch)
        .with_variant(variant)
        .with_version(version)
        .with_download_url(&chosen.browser_download_url)
        .with_checksum(chosen.checksum())
        .with_size(chosen.size);

    asset.validate_installable()?;
    Ok(asset)
}

fn is_checksum_name(name: &str) -> bool {
    name.contains("sha256")
        || name.ends_with(".sha256")
        || name.ends_with(".sha256sum")
        || name.ends_with(".sha256sums")
        || name.ends_with(".checksums")
        || name.contains("checksums.txt")
}

fn is_source_archive(name: &str) -> bool {
    if !(name.contains("source") || name.contains("src")) {
        return false;
    }
    name.ends_with(".zip")
        || name.ends_with(".tar")
        || name.ends_with(".tar.gz")
        || name.ends_with(".tar.xz")
        || name.ends_with(".tgz")
        || name.ends_with(".txz")
}
