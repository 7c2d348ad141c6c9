//! Streaming extraction for tar and zip archives.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::{Result, UpdraftError};

use super::paths::{cleanup_extraction, entry_selected, safe_write_file, verified_path};
use super::{ArchiveFormat, ExtractOptions};

/// Extract an archive whose format has already been detected.
pub fn extract_into(
    cancel: &CancellationToken,
    format: ArchiveFormat,
    src: &Path,
    dest: &Path,
    opts: &ExtractOptions,
) -> Result<()> {
    let mut extracted: Vec<PathBuf> = Vec::new();

    let result = match format {
        ArchiveFormat::Tar => {
            let file = open(src)?;
            untar_stream(cancel, file, dest, opts, &mut extracted)
        }
        ArchiveFormat::TarGz => {
            let file = open(src)?;
            let gz = flate2::read::GzDecoder::new(file);
            untar_stream(cancel, gz, dest, opts, &mut extracted)
        }
        ArchiveFormat::TarZstd => {
            let file = open(src)?;
            let zst = zstd::stream::read::Decoder::new(file)
                .map_err(|e| UpdraftError::fs(src.to_path_buf(), e))?;
            untar_stream(cancel, zst, dest, opts, &mut extracted)
        }
        ArchiveFormat::Zip => unzip(cancel, src, dest, opts, &mut extracted),
    };

    if let Err(err) = &result {
        if err.is_cancelled() && opts.on_cancel_cleanup && !extracted.is_empty() {
            cleanup_extraction(dest, &extracted);
        }
    }

    result
}

fn open(src: &Path) -> Result<File> {
    File::open(src).map_err(|e| UpdraftError::fs(src.to_path_buf(), e))
}

fn untar_stream<R: Read>(
    cancel: &CancellationToken,
    reader: R,
    dest: &Path,
    opts: &ExtractOptions,
    extracted: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    let mut total: u64 = 0;

    for entry in archive.entries().map_err(UpdraftError::IoError)? {
        if cancel.is_cancelled() {
            return Err(UpdraftError::Cancelled);
        }

        let mut entry = entry.map_err(UpdraftError::IoError)?;
        let raw_name = entry.path().map_err(UpdraftError::IoError)?.display().to_string();
        let name = raw_name.strip_prefix("./").unwrap_or(&raw_name).to_string();
        if name.is_empty() {
            continue;
        }

        if !entry_selected(&name, &opts.include_patterns, &opts.exclude_patterns) {
            continue;
        }

        let header = entry.header();
        let mode = header.mode().unwrap_or(0o644);

        match header.entry_type() {
            tar::EntryType::Directory => {
                let target = verified_path(dest, &name)?;
                let perm = if opts.preserve_permissions { mode } else { 0o755 };
                create_dir(&target, perm)?;
                extracted.push(target);
            }

            tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::GNUSparse => {
                let target = verified_path(dest, &name)?;
                extracted.push(target);
                let path =
                    safe_write_file(cancel, &mut entry, &name, mode, dest, opts, &mut total)?;
                // safe_write_file may normalize the path; keep the real one
                // so cleanup removes what was written.
                if let Some(last) = extracted.last_mut() {
                    *last = path;
                }
            }

            tar::EntryType::Symlink => {
                let target = verified_path(dest, &name)?;
                // Create the parent even when the link itself is skipped;
                // later entries may address paths beneath it.
                if let Some(parent) = target.parent() {
                    if !parent.exists() {
                        create_dir(parent, 0o755)?;
                    }
                }

                if !opts.allow_symlinks {
                    continue;
                }

                let link_target = match entry.link_name().ok().flatten() {
                    Some(t) => t.into_owned(),
                    None => continue,
                };

                if link_target.is_absolute() {
                    warn!(entry = %name, target = %link_target.display(),
                        "skipping absolute symlink");
                    continue;
                }

                let resolved = super::paths::clean_path(
                    &target.parent().unwrap_or(dest).join(&link_target),
                );
                let dest_clean = super::paths::clean_path(dest);
                if !resolved.starts_with(&dest_clean) {
                    return Err(UpdraftError::IllegalPath { name });
                }

                if target.exists() || fs::symlink_metadata(&target).is_ok() {
                    remove_existing(&target)?;
                }

                #[cfg(unix)]
                std::os::unix::fs::symlink(&link_target, &target)
                    .map_err(|e| UpdraftError::fs(target.clone(), e))?;
                #[cfg(not(unix))]
                {
                    warn!(entry = %name, "symlink creation unsupported on this platform");
                    continue;
                }

                #[cfg(unix)]
                extracted.push(target);
            }

            other => {
                warn!(entry = %name, kind = ?other, "skipping unsupported tar entry");
            }
        }
    }

    Ok(())
}

fn unzip(
    cancel: &CancellationToken,
    src: &Path,
    dest: &Path,
    opts: &ExtractOptions,
    extracted: &mut Vec<PathBuf>,
) -> Result<()> {
    let file = open(src)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| UpdraftError::UnsupportedFormat { path: format!("{}: {e}", src.display()) })?;

    let mut total: u64 = 0;

    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(UpdraftError::Cancelled);
        }

        let mut entry = archive
            .by_index(i)
            .map_err(|e| UpdraftError::UnsupportedFormat { path: format!("{}: {e}", src.display()) })?;
        let name = entry.name().to_string();

        if !entry_selected(&name, &opts.include_patterns, &opts.exclude_patterns) {
            continue;
        }

        if entry.is_dir() {
            let target = verified_path(dest, &name)?;
            create_dir(&target, 0o755)?;
            extracted.push(target);
            continue;
        }

        let mode = entry.unix_mode().unwrap_or(0o644);
        let target = verified_path(dest, &name)?;
        extracted.push(target);
        let path = safe_write_file(cancel, &mut entry, &name, mode, dest, opts, &mut total)?;
        if let Some(last) = extracted.last_mut() {
            *last = path;
        }
    }

    Ok(())
}

fn create_dir(path: &Path, mode: u32) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777));
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}

fn remove_existing(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path).map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;
    let result = if meta.is_dir() { fs::remove_dir_all(path) } else { fs::remove_file(path) };
    result.map_err(|e| UpdraftError::fs(path.to_path_buf(), e))
}
