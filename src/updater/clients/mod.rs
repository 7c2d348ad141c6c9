//! Release-channel clients.
//!
//! A check client answers one question: given the local configuration, what
//! is the asset I should install? Two implementations ship with the crate:
//!
//! - [`GithubClient`] - fetches a tagged or latest release from the GitHub
//!   Releases API and selects an asset by closure, reverse-template pattern,
//!   or a name heuristic
//! - [`JsonClient`] - delegates to a user-supplied fetch closure, typically
//!   one that reads a `version.json` manifest from any HTTP endpoint
//!
//! The updater treats the returned [`ReleaseAsset`] opaquely; it only
//! requires `platform`, `arch`, and `version` to be populated.

mod github;
mod json;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::Result;
use crate::manifest::ReleaseAsset;

use super::config::UpdaterConfig;

pub use github::{GithubClient, GithubRelease, GithubReleaseAsset, SelectAssetFn};
pub use json::{select_matching_asset, FetchFn, JsonClient, UpdateQuery};

/// A source of release information.
#[async_trait]
pub trait CheckClient: Send + Sync {
    /// Stable identifier for logging.
    fn client_ref(&self) -> &str;

    /// Fetch the channel and return the asset matching the local
    /// configuration.
    async fn check_update(
        &self,
        cancel: &CancellationToken,
        cfg: &UpdaterConfig,
    ) -> Result<ReleaseAsset>;
}
