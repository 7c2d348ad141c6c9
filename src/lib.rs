//! updraft - self-update toolkit for single-binary applications and bundles
//!
//! updraft lets an installed application detect, authenticate, and atomically
//! install its own replacement from a remote release channel. It covers both
//! sides of the pipeline: the publisher scans and signs built artifacts into a
//! release manifest, and the installed application consumes that manifest to
//! check, download, verify, and swap itself.
//!
//! # Architecture Overview
//!
//! Four subsystems cooperate on the update path:
//!
//! - [`template`] - compiles human-friendly reverse templates
//!   (`"{name}-{version}-{arch}.tar.gz"`) into matchers that parse artifact
//!   filenames back into structured fields
//! - [`archive`] - extracts and creates tar (raw/gzip/zstd) and zip archives
//!   with path-containment checks, byte budgets, and cancellation cleanup
//! - [`crypto`] - SHA-256 checksums, key-format detection, and detached
//!   PGP / ECDSA signatures over artifact bytes
//! - [`net`] - streaming downloads with progress fan-out, an optional external
//!   `curl` backend, and checksum verification at completion
//!
//! On top of those sit the role-specific services:
//!
//! - [`releaser`] - publisher side: scan a directory of built artifacts,
//!   hash and sign them, emit `version.json`/`version.yaml` and `checksums.txt`
//! - [`updater`] - application side: the check -> download -> verify ->
//!   swap state machine, with pluggable release-channel clients in
//!   [`updater::clients`]
//!
//! The on-disk swap itself is never performed in-process: the updater stages
//! the `updraft-helper` executable, spawns it with the old path, new path, and
//! log path, and exits. The helper backs up the target, swaps the new build
//! in with retries, relaunches, and rolls back on any failure. A running
//! process cannot atomically replace itself on Windows, nor reliably replace
//! a macOS `.app` bundle, so the helper is the only component that touches
//! the installed binary.
//!
//! # Example
//!
//! ```rust,no_run
//! use updraft::updater::{UpdaterConfig, UpdaterSvc, UpdateStatus};
//! use updraft::updater::clients::GithubClient;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = GithubClient::new("updraft-rs", "updraft");
//! let config = UpdaterConfig::default()
//!     .with_version(env!("CARGO_PKG_VERSION"))
//!     .with_check_client(Arc::new(client));
//!
//! let updater = UpdaterSvc::new(config);
//! updater.hydrate().await?;
//!
//! let cancel = CancellationToken::new();
//! let asset = updater.check_latest(&cancel).await?;
//! if updater.status() == UpdateStatus::UpdateAvailable {
//!     println!("update available: {}", asset.version);
//!     updater.download_update(&cancel, None).await?;
//!     updater.perform_update(&cancel).await?;
//!     // perform_update spawns the helper; the caller exits now.
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Events
//!
//! Subsystems publish structured events to the [`events`] relay, which fans
//! them out to registered sinks. [`events::TracingSink`] forwards everything
//! to `tracing`; GUI hosts register their own sink. Transfer progress
//! additionally flows through per-URL listener channels on
//! [`net::TransferSvc`].

#![warn(missing_docs)]

pub mod archive;
pub mod constants;
pub mod core;
pub mod crypto;
pub mod events;
pub mod manifest;
pub mod net;
pub mod providers;
pub mod releaser;
pub mod template;
pub mod updater;
pub mod utils;

pub use core::error::{Result, UpdraftError};
pub use manifest::{ReleaseAsset, ReleaseSummary};
