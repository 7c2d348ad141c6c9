//! The release manifest data model.
//!
//! [`ReleaseAsset`] describes one installable build; [`ReleaseSummary`] is
//! the envelope listing every asset of a release. The releaser produces
//! these, serializes them to `version.json` / `version.yaml`, and the update
//! check clients reconstruct them from the remote side.
//!
//! Serialized field names are part of the external interface and must not
//! change: `artefact_name`, `download_url`, `size_bytes`, `signature_type`,
//! `published_at`, `release_url`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Result, UpdraftError};

/// One installable build artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// Filesystem base name; rewritten to the local download path once the
    /// artifact has been fetched.
    pub artefact_name: String,
    /// Lowercased platform tag (`linux`, `darwin`, `windows`, ...).
    pub platform: String,
    /// Normalized architecture tag (`amd64`, `arm64`, `386`, ...).
    pub arch: String,
    /// Build flavour tag; empty when the build has no variants.
    #[serde(default)]
    pub variant: String,
    /// Semantic version of the build.
    pub version: String,
    /// Direct link to the artifact bytes.
    #[serde(default)]
    pub download_url: String,
    /// Hex SHA-256 of the artifact bytes.
    #[serde(default)]
    pub checksum: String,
    /// Artifact size in bytes.
    #[serde(default)]
    pub size_bytes: i64,
    /// ASCII-armored detached signature, when the release is signed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
    /// `PGP`, `X509`, or empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature_type: String,
}

impl ReleaseAsset {
    /// An empty asset; populate it with the `with_*` builders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the artefact name.
    pub fn with_artefact_name(mut self, name: impl Into<String>) -> Self {
        self.artefact_name = name.into();
        self
    }

    /// Set the platform tag.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Set the architecture tag.
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    /// Set the variant tag.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    /// Set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the download URL.
    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = url.into();
        self
    }

    /// Set the checksum.
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = checksum.into();
        self
    }

    /// Set the size in bytes.
    pub fn with_size(mut self, size_bytes: i64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Set the detached signature.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Set the signature type tag.
    pub fn with_signature_type(mut self, signature_type: impl Into<String>) -> Self {
        self.signature_type = signature_type.into();
        self
    }

    /// An asset the updater may install must carry a platform, an
    /// architecture, and a version.
    pub fn validate_installable(&self) -> Result<()> {
        if self.platform.is_empty() || self.arch.is_empty() || self.version.is_empty() {
            return Err(UpdraftError::config(format!(
                "asset {:?} is missing platform, arch, or version",
                self.artefact_name
            )));
        }
        Ok(())
    }
}

/// The envelope for one release: version, publication time, assets, and
/// changelog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseSummary {
    /// Free-text changelog.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub changelog: String,
    /// Assets, in scan order.
    pub assets: Vec<ReleaseAsset>,
    /// Publication timestamp.
    pub published_at: Option<DateTime<Utc>>,
    /// Web page for the release.
    #[serde(default)]
    pub release_url: String,
    /// Canonical version; every asset listed carries the same one.
    pub version: String,
}
