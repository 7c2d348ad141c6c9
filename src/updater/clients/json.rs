//! Generic HTTP-JSON check client.

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::core::{Result, UpdraftError};
use crate::manifest::{ReleaseAsset, ReleaseSummary};
use crate::updater::config::UpdaterConfig;

use super::CheckClient;

/// The local coordinates a fetch closure selects against.
#[derive(Debug, Clone)]
pub struct UpdateQuery {
    /// Platform tag.
    pub platform: String,
    /// Architecture tag.
    pub arch: String,
    /// Required variant; empty accepts variant-less builds.
    pub variant: String,
}

/// User-supplied fetch: retrieve and parse the remote manifest, then return
/// the asset matching the query.
pub type FetchFn = Box<
    dyn Fn(CancellationToken, UpdateQuery) -> BoxFuture<'static, Result<ReleaseAsset>>
        + Send
        + Sync,
>;

/// Check client delegating the fetch to a closure. The updater treats the
/// returned asset opaquely.
///
/// [`JsonClient::from_url`] covers the common case: a `version.json`
/// manifest served from any HTTP endpoint.
pub struct JsonClient {
    fetch: FetchFn,
}

impl JsonClient {
    /// A client around a custom fetch closure.
    pub fn new(fetch: FetchFn) -> Self {
        Self { fetch }
    }

    /// A client that GETs a [`ReleaseSummary`] manifest from `url` and
    /// selects the first asset matching the local coordinates.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::new(Box::new(move |cancel, query| {
            let url = url.clone();
            Box::pin(async move {
                let client = reqwest::Client::new();
                let request = client.get(&url).header(
                    reqwest::header::USER_AGENT,
                    concat!("updraft/", env!("CARGO_PKG_VERSION")),
                );

                let response = tokio::select! {
                    _ = cancel.cancelled() => return Err(UpdraftError::Cancelled),
                    response = request.send() => response,
                }
                .map_err(|e| UpdraftError::CheckFailed { reason: format!("network: {e}") })?;

                let status = response.status();
                if !status.is_success() {
                    return Err(UpdraftError::CheckFailed {
                        reason: format!("protocol: {status} from {url}"),
                    });
                }

                let summary: ReleaseSummary = response
                    .json()
                    .await
                    .map_err(|e| UpdraftError::CheckFailed { reason: format!("parse: {e}") })?;

                select_matching_asset(&summary, &query)
            })
        }))
    }
}

/// Pick the first asset of `summary` matching the query, stamping the
/// summary's version onto assets that do not carry their own.
pub fn select_matching_asset(
    summary: &ReleaseSummary,
    query: &UpdateQuery,
) -> Result<ReleaseAsset> {
    // The manifest version must parse; asset selection relies on it.
    semver::Version::parse(summary.version.trim_start_matches('v'))
        .map_err(|e| UpdraftError::CheckFailed {
            reason: format!("parse: manifest version {:?}: {e}", summary.version),
        })?;

    for asset in &summary.assets {
        if asset.platform == query.platform
            && asset.arch == query.arch
            && asset.variant == query.variant
        {
            let mut chosen = asset.clone();
            if chosen.version.is_empty() {
                chosen.version = summary.version.clone();
            }
            chosen.validate_installable()?;
            return Ok(chosen);
        }
    }

    Err(UpdraftError::CheckFailed {
        reason: format!(
            "not-found: no asset for {}/{}{}",
            query.platform,
            query.arch,
            if query.variant.is_empty() {
                String::new()
            } else {
                format!(" variant {}", query.variant)
            }
        ),
    })
}

#[async_trait]
impl CheckClient for JsonClient {
    fn client_ref(&self) -> &str {
        "from_net"
    }

    async fn check_update(
        &self,
        cancel: &CancellationToken,
        cfg: &UpdaterConfig,
    ) -> Result<ReleaseAsset> {
        let query = UpdateQuery {
            platform: cfg.platform.clone(),
            arch: cfg.architecture.clone(),
            variant: cfg.variant.clone(),
        };
        (self.fetch)(cancel.clone(), query).await
    }
}
