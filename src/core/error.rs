//! Error handling for updraft.
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** for precise handling in code
//! 2. **Actionable messages** that name the offending path, URL, or entry
//!
//! [`UpdraftError`] enumerates every failure mode in the crate. Subsystems
//! construct the specific variant for their failure; operation-level code
//! composes them with `anyhow::Context` where extra call-site detail helps.
//!
//! # Error Categories
//!
//! - **Configuration**: [`UpdraftError::ConfigInvalid`]
//! - **Network**: [`UpdraftError::NetworkFailure`], [`UpdraftError::ProtocolError`],
//!   [`UpdraftError::CheckFailed`]
//! - **Verification**: [`UpdraftError::ChecksumMismatch`],
//!   [`UpdraftError::SignatureMismatch`], [`UpdraftError::KeyError`]
//! - **Archives**: [`UpdraftError::IllegalPath`], [`UpdraftError::SizeLimitExceeded`],
//!   [`UpdraftError::UnsupportedFormat`]
//! - **Templates**: [`UpdraftError::TemplateSyntax`],
//!   [`UpdraftError::TemplateTooComplex`], [`UpdraftError::NoMatch`],
//!   [`UpdraftError::InputRejected`]
//! - **Lifecycle**: [`UpdraftError::Cancelled`], [`UpdraftError::FilesystemError`],
//!   [`UpdraftError::SwapFailed`]
//!
//! Cancellation is deliberately its own variant so callers can distinguish a
//! user-initiated stop from a real failure and skip error logging for it.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for updraft operations.
#[derive(Error, Debug)]
pub enum UpdraftError {
    /// Configuration is missing a required field or carries an invalid value.
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what is missing or malformed
        message: String,
    },

    /// A network operation failed before an HTTP status was received.
    #[error("network failure during {operation}: {reason}")]
    NetworkFailure {
        /// The operation that failed (e.g. "download", "release fetch")
        operation: String,
        /// Underlying cause
        reason: String,
    },

    /// The remote answered with a non-2xx status or a malformed body.
    #[error("protocol error from {url}: {detail}")]
    ProtocolError {
        /// The URL that produced the response
        url: String,
        /// Status line or parse failure description
        detail: String,
    },

    /// An update check client could not produce a release asset.
    #[error("update check failed: {reason}")]
    CheckFailed {
        /// Cause category and detail (network, parse, policy, not-found)
        reason: String,
    },

    /// Downloaded or scanned bytes do not hash to the expected checksum.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// File that failed verification
        path: String,
        /// Expected hex digest
        expected: String,
        /// Computed hex digest
        actual: String,
    },

    /// A detached signature did not verify against the pinned key.
    #[error("signature verification failed for {path}: {reason}")]
    SignatureMismatch {
        /// File that failed verification
        path: String,
        /// Verifier detail
        reason: String,
    },

    /// Key material could not be parsed or routed to a handler.
    #[error("key error: {reason}")]
    KeyError {
        /// Parse or classification failure detail
        reason: String,
    },

    /// An archive entry or symlink target resolves outside the destination.
    #[error("illegal path traversal detected: {name}")]
    IllegalPath {
        /// The offending entry name as stored in the archive
        name: String,
    },

    /// A per-file or total byte budget was exceeded.
    #[error("size limit exceeded ({limit} bytes) while processing {name}")]
    SizeLimitExceeded {
        /// The entry being written when the budget ran out
        name: String,
        /// The configured limit in bytes
        limit: u64,
    },

    /// The file suffix maps to no supported archive codec.
    #[error("unsupported archive type: {path}")]
    UnsupportedFormat {
        /// The path whose suffix failed dispatch
        path: String,
    },

    /// A reverse template failed to compile.
    #[error("template syntax error at position {position}: {message}")]
    TemplateSyntax {
        /// Byte offset of the offending character in the template
        position: usize,
        /// What went wrong (unclosed brace, bad field name, ...)
        message: String,
    },

    /// A template exceeded a length budget or stalled on probe inputs.
    #[error("template too complex: {detail}")]
    TemplateTooComplex {
        /// Which budget was exceeded
        detail: String,
    },

    /// No registered template matched the input.
    #[error("no template matched input {input:?}")]
    NoMatch {
        /// The rejected input
        input: String,
    },

    /// Parse input violated a precondition (length, emptiness, NUL bytes).
    #[error("input rejected: {reason}")]
    InputRejected {
        /// Which precondition failed
        reason: String,
    },

    /// The operation was cancelled via its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// A filesystem operation failed.
    #[error("filesystem error on {path}: {source}")]
    FilesystemError {
        /// The path being operated on
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The swap helper could not be staged or spawned.
    #[error("swap failed: {reason}")]
    SwapFailed {
        /// Staging or spawn failure detail
        reason: String,
    },

    /// Semantic version parsing failed.
    #[error("invalid version: {0}")]
    SemverError(#[from] semver::Error),

    /// An I/O error without a more specific home.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// An HTTP client error from reqwest.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML serialization failed.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl UpdraftError {
    /// True when the error represents cooperative cancellation rather than a
    /// real failure. Callers use this to skip error-level logging.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Wrap an I/O error with the path it occurred on.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FilesystemError { path: path.into(), source }
    }

    /// Shorthand for a [`UpdraftError::ConfigInvalid`] with a formatted message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigInvalid { message: message.into() }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, UpdraftError>;
