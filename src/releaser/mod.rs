//! The release manifest builder - the publisher side of the pipeline.
//!
//! [`ReleaserSvc`] scans a directory of built artifacts, identifies them via
//! the filename template dialect, hashes them, optionally signs them with a
//! PGP or ECDSA private key, and emits the release summary (`version.json`
//! or `version.yaml`) plus `checksums.txt` and `<artefact>.asc` signature
//! files alongside.
//!
//! # Example
//!
//! ```rust,no_run
//! use updraft::releaser::{ReleaserConfig, ReleaserSvc};
//! use updraft::events::Relay;
//! use std::sync::Arc;
//!
//! # fn example() -> updraft::Result<()> {
//! let config = ReleaserConfig::default()
//!     .with_target_path("dist")
//!     .with_output_path("dist")
//!     .with_file_pattern("myapp-{platform}-{arch}{variant}{version}")
//!     .with_allow_any_extension(true)
//!     .with_version("1.4.0");
//!
//! let mut releaser = ReleaserSvc::new(config, Arc::new(Relay::with_tracing()));
//! releaser.hydrate()?;
//! let summary = releaser.generate_release_summary()?;
//! println!("published {} assets", summary.assets.len());
//! # Ok(())
//! # }
//! ```

mod scan;


use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::core::{Result, UpdraftError};
use crate::crypto::{detect_key_info, ecdsa, pgp, KeyFormat, SignatureKind};
use crate::events::{Relay, RelayEvent};
use crate::manifest::{ReleaseAsset, ReleaseSummary};

pub use scan::compile_release_template;

/// Relay channel used by the releaser.
pub const RELAY_RELEASER_CHANNEL: &str = "releaser";
/// Relay ref for releaser log lines.
pub const RELAY_RELEASER_LOG: &str = "releaser.log";

/// Hook invoked with the scanned assets before the summary is written.
pub type ProcessReleasesFn = Box<dyn Fn(&[ReleaseAsset]) -> Result<()> + Send + Sync>;

/// Release summary serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryOutput {
    /// Compact `version.json`.
    Json,
    /// Pretty-printed `version.json`.
    #[default]
    JsonIndented,
    /// `version.yaml`.
    Yaml,
}

/// Configuration for [`ReleaserSvc`].
pub struct ReleaserConfig {
    /// Directory holding the built artifacts (scanned non-recursively).
    pub target_path: PathBuf,
    /// Directory receiving `version.*`, `checksums.txt`, and signatures.
    pub output_path: PathBuf,
    /// Filename template in the releaser dialect.
    pub file_pattern: String,
    /// Prefix stamped onto every asset's `download_url`
    /// (`prefix + artefact_name`); empty leaves URLs unset.
    pub download_prefix: String,
    /// Write `checksums.txt`.
    pub generate_checksums: bool,
    /// Sign artifacts when a private key is available.
    pub generate_signatures: bool,
    /// ASCII private key material (PGP or ECDSA PEM).
    pub private_key: String,
    /// Path to the private key; read at hydrate when `private_key` is empty.
    pub private_key_path: Option<PathBuf>,
    /// Summary format.
    pub summary_output_type: SummaryOutput,
    /// Accept an archive extension after the pattern.
    pub allow_any_extension: bool,
    /// Error on non-matching files instead of skipping them.
    pub strict: bool,
    /// Require `{version}` to be present in matching names.
    pub require_version: bool,
    /// Release version used when a filename does not carry one.
    pub version: String,
    /// Hook invoked with the scanned assets.
    pub process_releases: Option<ProcessReleasesFn>,
}

impl Default for ReleaserConfig {
    fn default() -> Self {
        Self {
            target_path: PathBuf::from("."),
            output_path: PathBuf::from("."),
            file_pattern: String::new(),
            download_prefix: String::new(),
            generate_checksums: true,
            generate_signatures: true,
            private_key: String::new(),
            private_key_path: None,
            summary_output_type: SummaryOutput::default(),
            allow_any_extension: false,
            strict: false,
            require_version: false,
            version: String::new(),
            process_releases: None,
        }
    }
}

impl ReleaserConfig {
    /// Set the scanned directory.
    pub fn with_target_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.target_path = path.into();
        self
    }

    /// Set the output directory.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    /// Set the filename template.
    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = pattern.into();
        self
    }

    /// Set the download URL prefix.
    pub fn with_download_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.download_prefix = prefix.into();
        self
    }

    /// Toggle `checksums.txt` generation.
    pub fn with_generate_checksums(mut self, enabled: bool) -> Self {
        self.generate_checksums = enabled;
        self
    }

    /// Toggle signing.
    pub fn with_generate_signatures(mut self, enabled: bool) -> Self {
        self.generate_signatures = enabled;
        self
    }

    /// Provide private key material inline.
    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = key.into();
        self
    }

    /// Provide the private key via a file path.
    pub fn with_private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Set the summary output format.
    pub fn with_summary_output_type(mut self, output: SummaryOutput) -> Self {
        self.summary_output_type = output;
        self
    }

    /// Accept an archive extension after the pattern.
    pub fn with_allow_any_extension(mut self, enabled: bool) -> Self {
        self.allow_any_extension = enabled;
        self
    }

    /// Error on non-matching files.
    pub fn with_strict(mut self, enabled: bool) -> Self {
        self.strict = enabled;
        self
    }

    /// Require `{version}` in matching names.
    pub fn with_require_version(mut self, enabled: bool) -> Self {
        self.require_version = enabled;
        self
    }

    /// Set the fallback release version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Register the post-scan hook.
    pub fn with_process_releases(mut self, hook: ProcessReleasesFn) -> Self {
        self.process_releases = Some(hook);
        self
    }
}

/// The loaded signing method, routed by key detection at hydrate.
enum SigningMethod {
    Pgp(Vec<pgp::SignedSecretKey>),
    Ecdsa(Box<p256::ecdsa::SigningKey>),
}

pub(crate) struct ScanOutput {
    pub(crate) assets: Vec<ReleaseAsset>,
    pub(crate) checksum_lines: String,
}

/// Scans, signs, and summarises a directory of release artifacts.
pub struct ReleaserSvc {
    cfg: ReleaserConfig,
    relay: Arc<Relay>,
    signing: Option<SigningMethod>,
    version: Option<semver::Version>,
    assets: Vec<ReleaseAsset>,
    checksum_lines: String,
}

impl ReleaserSvc {
    /// Create the service. Call [`hydrate`](Self::hydrate) before use.
    pub fn new(cfg: ReleaserConfig, relay: Arc<Relay>) -> Self {
        Self {
            cfg,
            relay,
            signing: None,
            version: None,
            assets: Vec::new(),
            checksum_lines: String::new(),
        }
    }

    fn log(&self, message: String) {
        self.relay.info(RelayEvent::new(RELAY_RELEASER_CHANNEL, RELAY_RELEASER_LOG, message));
    }

    fn warn_event(&self, message: String) {
        self.relay.warn(RelayEvent::new(RELAY_RELEASER_CHANNEL, RELAY_RELEASER_LOG, message));
    }

    /// Load the private key (if configured) and parse the release version.
    /// Idempotent.
    pub fn hydrate(&mut self) -> Result<()> {
        let mut key_material = self.cfg.private_key.clone();
        if key_material.is_empty() {
            if let Some(path) = &self.cfg.private_key_path {
                key_material = fs::read_to_string(path)
                    .map_err(|e| UpdraftError::fs(path.clone(), e))?;
            }
        }

        if !key_material.is_empty() {
            let info = detect_key_info(key_material.as_bytes())?;
            match info.format {
                KeyFormat::Pgp => {
                    let keys = pgp::load_secret_keys(key_material.as_bytes())?;
                    self.signing = Some(SigningMethod::Pgp(keys));
                    debug!("loaded PGP signing key");
                }
                KeyFormat::X509 => {
                    let key = ecdsa::private_key_from_pem(&key_material)?;
                    self.signing = Some(SigningMethod::Ecdsa(Box::new(key)));
                    debug!("loaded ECDSA signing key");
                }
                KeyFormat::Ssh => {
                    return Err(UpdraftError::KeyError {
                        reason: "SSH keys cannot sign releases".to_string(),
                    });
                }
            }
        }

        if !self.cfg.version.is_empty() {
            self.version = Some(semver::Version::parse(&self.cfg.version)?);
        }

        Ok(())
    }

    /// Scan the target directory and cache the result.
    pub fn scan_dir(&mut self) -> Result<Vec<ReleaseAsset>> {
        self.log(format!("starting scan: {}", self.cfg.target_path.display()));
        let fallback = self.version.as_ref().map(|v| v.to_string());
        let output = scan::scan_dir(&self.cfg, fallback.as_deref())?;
        self.assets = output.assets.clone();
        self.checksum_lines = output.checksum_lines;
        Ok(output.assets)
    }

    /// The full publisher pipeline: scan, sign, write checksum and summary
    /// files, and return the summary.
    pub fn generate_release_summary(&mut self) -> Result<ReleaseSummary> {
        let mut assets = self.scan_dir()?;

        self.log(format!("found {} releases", assets.len()));
        if assets.is_empty() {
            return Err(UpdraftError::NoMatch {
                input: self.cfg.target_path.display().to_string(),
            });
        }

        if !self.cfg.download_prefix.is_empty() {
            for asset in &mut assets {
                asset.download_url =
                    format!("{}{}", self.cfg.download_prefix, asset.artefact_name);
            }
        }

        if self.cfg.generate_signatures {
            if self.signing.is_some() {
                self.sign_assets(&mut assets)?;
            } else {
                debug!("signing enabled but no private key loaded");
            }
        }
        self.assets = assets.clone();

        if self.cfg.generate_checksums {
            let path = self.cfg.output_path.join("checksums.txt");
            self.log(format!("writing checksums to: {}", path.display()));
            fs::write(&path, &self.checksum_lines).map_err(|e| UpdraftError::fs(path, e))?;
        }

        if let Some(hook) = &self.cfg.process_releases {
            if let Err(e) = hook(&assets) {
                self.warn_event(format!("failed to process releases: {e}"));
            }
        }

        let summary = ReleaseSummary {
            changelog: String::new(),
            assets,
            published_at: Some(Utc::now()),
            release_url: String::new(),
            version: self.cfg.version.clone(),
        };

        self.write_summary(&summary)?;
        Ok(summary)
    }

    /// Sign every asset, stamping `signature`/`signature_type` and writing
    /// the `.asc` companion into the output directory. Per-asset failures
    /// are warnings; the release proceeds unsigned for that artifact.
    fn sign_assets(&self, assets: &mut [ReleaseAsset]) -> Result<()> {
        let method = match &self.signing {
            Some(m) => m,
            None => return Ok(()),
        };

        let kind = match method {
            SigningMethod::Pgp(_) => SignatureKind::Pgp,
            SigningMethod::Ecdsa(_) => SignatureKind::X509,
        };
        self.log(format!("signing releases by: {kind}"));

        for asset in assets.iter_mut() {
            let artefact_path = self.cfg.target_path.join(&asset.artefact_name);

            let signature = match method {
                SigningMethod::Pgp(keys) => pgp::sign_file_detached(keys, &artefact_path),
                SigningMethod::Ecdsa(key) => ecdsa::sign_file(key, &artefact_path),
            };

            let signature = match signature {
                Ok(s) => s,
                Err(e) => {
                    self.warn_event(format!(
                        "failed to sign {}: {e}",
                        artefact_path.display()
                    ));
                    continue;
                }
            };

            asset.signature_type = kind.as_str().to_string();
            asset.signature = signature.clone();

            let sig_path =
                self.cfg.output_path.join(format!("{}.asc", asset.artefact_name));
            if let Err(e) = fs::write(&sig_path, &signature) {
                self.warn_event(format!(
                    "failed to write signature {}: {e}",
                    sig_path.display()
                ));
            }
        }

        Ok(())
    }

    fn write_summary(&self, summary: &ReleaseSummary) -> Result<()> {
        let (name, body) = match self.cfg.summary_output_type {
            SummaryOutput::Json => ("version.json", serde_json::to_string(summary)?),
            SummaryOutput::JsonIndented => {
                ("version.json", serde_json::to_string_pretty(summary)?)
            }
            SummaryOutput::Yaml => ("version.yaml", serde_yaml::to_string(summary)?),
        };

        let path = self.cfg.output_path.join(name);
        info!(path = %path.display(), "writing release summary");
        self.log(format!("outputting release summary to: {}", path.display()));
        fs::write(&path, body).map_err(|e| UpdraftError::fs(path, e))
    }

    /// The assets produced by the most recent scan.
    pub fn assets(&self) -> &[ReleaseAsset] {
        &self.assets
    }
}
