//! Path containment and streaming-write guards shared by the extractors.

use std::fs;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::constants::EXTRACT_BUFFER_SIZE;
use crate::core::{Result, UpdraftError};

use super::ExtractOptions;

/// Lexically normalize a path: resolve `.` and `..` components without
/// touching the filesystem. A `..` that would climb past the start of the
/// path is preserved so the containment check can catch it.
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if popped {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Join an archive entry name onto the destination and verify the absolute
/// resolved result stays inside the absolute destination. Fails with
/// [`UpdraftError::IllegalPath`] naming the entry otherwise.
pub(crate) fn verified_path(dest: &Path, name: &str) -> Result<PathBuf> {
    let dest_abs = std::path::absolute(clean_path(dest))
        .map_err(|e| UpdraftError::fs(dest.to_path_buf(), e))?;

    let target = clean_path(&dest.join(name));
    let target_abs = std::path::absolute(&target)
        .map_err(|_| UpdraftError::IllegalPath { name: name.to_string() })?;

    if !target_abs.starts_with(&dest_abs) {
        return Err(UpdraftError::IllegalPath { name: name.to_string() });
    }

    Ok(target)
}

/// Glob matching for extraction entries: patterns apply to the full entry
/// name as stored in the archive.
pub(crate) fn entry_selected(name: &str, includes: &[String], excludes: &[String]) -> bool {
    for pattern in excludes {
        if glob::Pattern::new(pattern).map(|p| p.matches(name)).unwrap_or(false) {
            return false;
        }
    }
    if includes.is_empty() {
        return true;
    }
    includes
        .iter()
        .any(|pattern| glob::Pattern::new(pattern).map(|p| p.matches(name)).unwrap_or(false))
}

/// Glob matching for compression inputs: patterns apply to the base name.
pub(crate) fn base_matches_any(path: &Path, patterns: &[String]) -> bool {
    let base = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    patterns
        .iter()
        .any(|pattern| glob::Pattern::new(pattern).map(|p| p.matches(&base)).unwrap_or(false))
}

/// Stream one archive entry to disk with cancellation, per-file, and total
/// byte budgets enforced between blocks. On any failure the partial file is
/// closed and removed before the error is returned.
pub(crate) fn safe_write_file(
    cancel: &CancellationToken,
    reader: &mut dyn Read,
    name: &str,
    mode: u32,
    dest: &Path,
    opts: &ExtractOptions,
    total: &mut u64,
) -> Result<PathBuf> {
    let path = verified_path(dest, name)?;

    if opts.max_total_size > 0 && *total > opts.max_total_size {
        return Err(UpdraftError::SizeLimitExceeded {
            name: name.to_string(),
            limit: opts.max_total_size,
        });
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| UpdraftError::fs(parent.to_path_buf(), e))?;
    }

    let mut open = fs::OpenOptions::new();
    open.write(true);
    if opts.overwrite {
        open.create(true).truncate(true);
    } else {
        open.create_new(true);
    }
    let mut file = open.open(&path).map_err(|e| UpdraftError::fs(path.clone(), e))?;

    #[cfg(unix)]
    if opts.preserve_permissions {
        use std::os::unix::fs::PermissionsExt;
        let _ = file.set_permissions(fs::Permissions::from_mode(mode & 0o7777));
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut buf = vec![0u8; EXTRACT_BUFFER_SIZE];
    let mut written: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(UpdraftError::Cancelled);
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&path);
                return Err(UpdraftError::fs(path, e));
            }
        };

        if let Err(e) = file.write_all(&buf[..n]) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(UpdraftError::fs(path, e));
        }
        written += n as u64;

        if opts.max_file_size > 0 && written > opts.max_file_size {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(UpdraftError::SizeLimitExceeded {
                name: name.to_string(),
                limit: opts.max_file_size,
            });
        }
        if opts.max_total_size > 0 && *total + written > opts.max_total_size {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(UpdraftError::SizeLimitExceeded {
                name: name.to_string(),
                limit: opts.max_total_size,
            });
        }
    }

    *total += written;

    if let Some(on_file) = &opts.on_file {
        on_file(&path, written)?;
    }

    debug!(name, written, "extracted entry");
    Ok(path)
}

/// Remove everything a cancelled extraction already wrote, newest first, then
/// prune any parent directories the removal left empty.
pub(crate) fn cleanup_extraction(dest: &Path, extracted: &[PathBuf]) {
    for path in extracted.iter().rev() {
        if let Err(e) = remove_path(path) {
            warn!(path = %path.display(), error = %e, "cleanup failed");
        }
    }

    for path in extracted {
        let mut dir = path.parent().map(Path::to_path_buf);
        while let Some(d) = dir {
            if d == dest || !d.starts_with(dest) {
                break;
            }
            // remove_dir only succeeds on empty directories.
            if fs::remove_dir(&d).is_err() {
                break;
            }
            dir = d.parent().map(Path::to_path_buf);
        }
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
