//! Safe archive extraction and creation.
//!
//! Supports tar (raw, gzip, zstd) and zip, dispatching on the lowercased
//! suffix of the archive path. Every entry written during extraction is
//! verified to resolve inside the destination; per-file and total byte
//! budgets are enforced mid-stream; symlinks are refused unless explicitly
//! allowed and are then contained to the destination root. Extraction and
//! compression both check a [`CancellationToken`] between entries and between
//! 32 KiB blocks, and can clean up partial output when cancelled.
//!
//! The functions here are synchronous: they are CPU- and disk-bound, and the
//! async callers in this crate run them under `tokio::task::spawn_blocking`.
//!
//! # Example
//!
//! ```rust,no_run
//! use updraft::archive::{extract, ExtractOptions};
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! # fn example() -> updraft::Result<()> {
//! let cancel = CancellationToken::new();
//! let opts = ExtractOptions::default();
//! extract(&cancel, Path::new("release.tar.gz"), Path::new("staging"), &opts)?;
//! # Ok(())
//! # }
//! ```

mod compress;
mod extract;
mod paths;

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::constants::{DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_TOTAL_SIZE};
use crate::core::{Result, UpdraftError};

pub use compress::compress;
pub use extract::extract_into;

/// Callback invoked after each file is written (extraction) or added
/// (compression). Returning an error aborts the operation.
pub type FileCallback = Box<dyn Fn(&Path, u64) -> Result<()> + Send + Sync>;

/// Configuration for archive extraction.
pub struct ExtractOptions {
    /// Cap on cumulative bytes written. 0 disables the check.
    pub max_total_size: u64,
    /// Cap on any single extracted file. 0 disables the check.
    pub max_file_size: u64,
    /// Create symlink entries. Off by default; even when on, absolute
    /// targets are skipped and escaping targets are rejected.
    pub allow_symlinks: bool,
    /// Apply archive-recorded modes instead of 0755/0644 defaults.
    pub preserve_permissions: bool,
    /// Truncate existing files instead of failing on them.
    pub overwrite: bool,
    /// When non-empty, only entries matching at least one glob are kept.
    pub include_patterns: Vec<String>,
    /// Entries matching any of these globs are skipped.
    pub exclude_patterns: Vec<String>,
    /// Per-file callback.
    pub on_file: Option<FileCallback>,
    /// Remove already-extracted paths when the operation is cancelled.
    pub on_cancel_cleanup: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allow_symlinks: false,
            preserve_permissions: true,
            overwrite: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            on_file: None,
            on_cancel_cleanup: false,
        }
    }
}

/// Configuration for archive creation.
pub struct CompressOptions {
    /// Output archive path; its suffix selects the codec.
    pub destination: PathBuf,
    /// Files and directories to add; directories are walked recursively.
    pub file_list: Vec<PathBuf>,
    /// Cap on cumulative bytes added. 0 disables the check.
    pub max_total_size: u64,
    /// Cap on any single input file. 0 disables the check.
    pub max_file_size: u64,
    /// Skip symlinks encountered during the walk.
    pub skip_symlinks: bool,
    /// Record source modes instead of 0644.
    pub preserve_permissions: bool,
    /// When non-empty, only files whose base name matches at least one glob
    /// are added.
    pub include_patterns: Vec<String>,
    /// Files whose base name matches any of these globs are skipped.
    pub exclude_patterns: Vec<String>,
    /// Per-file callback.
    pub on_file: Option<FileCallback>,
    /// Remove the partially written archive when the operation is cancelled.
    pub on_cancel_cleanup: bool,
}

impl CompressOptions {
    /// Options writing to `destination` with default caps.
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            file_list: Vec::new(),
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            skip_symlinks: false,
            preserve_permissions: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            on_file: None,
            on_cancel_cleanup: false,
        }
    }

    /// Add an input path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_list.push(path.into());
        self
    }
}

/// The archive codec selected by a path suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Uncompressed `.tar`
    Tar,
    /// Gzip-compressed tar: `.tar.gz`, `.tgz`, `.gz`
    TarGz,
    /// Zstd-compressed tar: `.tar.zst`, `.zst`
    TarZstd,
    /// `.zip`
    Zip,
}

/// Map a path's lowercased suffix to a codec.
pub fn detect_format(path: &Path) -> Option<ArchiveFormat> {
    let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".gz") {
        Some(ArchiveFormat::TarGz)
    } else if name.ends_with(".tar.zst") || name.ends_with(".zst") {
        Some(ArchiveFormat::TarZstd)
    } else if name.ends_with(".tar") {
        Some(ArchiveFormat::Tar)
    } else if name.ends_with(".zip") {
        Some(ArchiveFormat::Zip)
    } else {
        None
    }
}

/// Extract `src` into `dest`, creating `dest` if needed.
pub fn extract(
    cancel: &CancellationToken,
    src: &Path,
    dest: &Path,
    opts: &ExtractOptions,
) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| UpdraftError::fs(dest.to_path_buf(), e))?;

    let format = detect_format(src)
        .ok_or_else(|| UpdraftError::UnsupportedFormat { path: src.display().to_string() })?;
    extract_into(cancel, format, src, dest, opts)
}
