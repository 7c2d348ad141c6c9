//! Archive creation for tar and zip.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::core::{Result, UpdraftError};

use super::paths::base_matches_any;
use super::{ArchiveFormat, CompressOptions};

/// Create the archive described by `opts.destination` from `opts.file_list`.
///
/// Entry names are stored relative to the parent of each top-level input
/// path, so compressing `/build/out` yields entries under `out/...`.
pub fn compress(cancel: &CancellationToken, opts: &CompressOptions) -> Result<()> {
    if let Some(parent) = opts.destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| UpdraftError::fs(parent.to_path_buf(), e))?;
        }
    }

    let format = super::detect_format(&opts.destination).ok_or_else(|| {
        UpdraftError::UnsupportedFormat { path: opts.destination.display().to_string() }
    })?;

    let result = match format {
        ArchiveFormat::Tar => {
            let out = create_dest(&opts.destination)?;
            let mut builder = tar::Builder::new(out);
            add_files_to_tar(cancel, &mut builder, opts)
                .and_then(|()| builder.into_inner().map_err(UpdraftError::IoError).map(|_| ()))
        }
        ArchiveFormat::TarGz => {
            let out = create_dest(&opts.destination)?;
            let gz = flate2::write::GzEncoder::new(out, flate2::Compression::best());
            let mut builder = tar::Builder::new(gz);
            add_files_to_tar(cancel, &mut builder, opts).and_then(|()| {
                let gz = builder.into_inner().map_err(UpdraftError::IoError)?;
                gz.finish().map_err(UpdraftError::IoError)?;
                Ok(())
            })
        }
        ArchiveFormat::TarZstd => {
            let out = create_dest(&opts.destination)?;
            let zst = zstd::stream::write::Encoder::new(out, zstd::DEFAULT_COMPRESSION_LEVEL)
                .map_err(UpdraftError::IoError)?;
            let mut builder = tar::Builder::new(zst);
            add_files_to_tar(cancel, &mut builder, opts).and_then(|()| {
                let zst = builder.into_inner().map_err(UpdraftError::IoError)?;
                zst.finish().map_err(UpdraftError::IoError)?;
                Ok(())
            })
        }
        ArchiveFormat::Zip => compress_zip(cancel, opts),
    };

    if let Err(err) = &result {
        if err.is_cancelled() && opts.on_cancel_cleanup {
            let _ = fs::remove_file(&opts.destination);
        }
    }

    result
}

fn create_dest(path: &Path) -> Result<File> {
    File::create(path).map_err(|e| UpdraftError::fs(path.to_path_buf(), e))
}

/// Reject inputs that are neither absolute nor local (escape upward from the
/// working tree).
fn reject_unsafe_source(path: &Path) -> Result<()> {
    if path.is_absolute() {
        return Ok(());
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(UpdraftError::IllegalPath { name: path.display().to_string() });
    }
    Ok(())
}

/// Entry name relative to the parent of the top-level input path.
fn entry_name(top: &Path, file: &Path) -> Result<PathBuf> {
    let anchor = top.parent().unwrap_or(Path::new(""));
    file.strip_prefix(anchor)
        .map(Path::to_path_buf)
        .map_err(|_| UpdraftError::IllegalPath { name: file.display().to_string() })
}

struct WalkState<'a> {
    opts: &'a CompressOptions,
    total: u64,
}

impl WalkState<'_> {
    /// Budget and filter checks shared by the tar and zip writers. Returns
    /// `None` when the entry should be skipped.
    fn admit(&mut self, path: &Path, meta: &fs::Metadata) -> Result<Option<()>> {
        if !self.opts.include_patterns.is_empty()
            && !base_matches_any(path, &self.opts.include_patterns)
        {
            return Ok(None);
        }
        if !self.opts.exclude_patterns.is_empty()
            && base_matches_any(path, &self.opts.exclude_patterns)
        {
            return Ok(None);
        }

        if meta.is_file() {
            if self.opts.max_file_size > 0 && meta.len() > self.opts.max_file_size {
                return Err(UpdraftError::SizeLimitExceeded {
                    name: path.display().to_string(),
                    limit: self.opts.max_file_size,
                });
            }
            self.total += meta.len();
            if self.opts.max_total_size > 0 && self.total > self.opts.max_total_size {
                return Err(UpdraftError::SizeLimitExceeded {
                    name: path.display().to_string(),
                    limit: self.opts.max_total_size,
                });
            }
        }

        if let Some(on_file) = &self.opts.on_file {
            on_file(path, meta.len())?;
        }

        Ok(Some(()))
    }
}

fn add_files_to_tar<W: Write>(
    cancel: &CancellationToken,
    builder: &mut tar::Builder<W>,
    opts: &CompressOptions,
) -> Result<()> {
    let mut state = WalkState { opts, total: 0 };

    for top in &opts.file_list {
        for entry in WalkDir::new(top).follow_links(false) {
            if cancel.is_cancelled() {
                return Err(UpdraftError::Cancelled);
            }

            let entry = entry.map_err(|e| {
                UpdraftError::IoError(
                    e.into_io_error().unwrap_or_else(|| io::Error::other("walk failed")),
                )
            })?;
            let path = entry.path();
            let meta = fs::symlink_metadata(path)
                .map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;

            if meta.file_type().is_symlink() && opts.skip_symlinks {
                continue;
            }
            reject_unsafe_source(path)?;

            if state.admit(path, &meta)?.is_none() {
                continue;
            }

            let rel = entry_name(top, path)?;
            if rel.as_os_str().is_empty() {
                continue;
            }

            let mode = entry_mode(&meta, opts.preserve_permissions);

            if meta.file_type().is_symlink() {
                let target = fs::read_link(path)
                    .map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(mode);
                builder
                    .append_link(&mut header, &rel, &target)
                    .map_err(UpdraftError::IoError)?;
            } else if meta.is_dir() {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(mode);
                header.set_mtime(mtime(&meta));
                let mut dir_name = rel.clone();
                dir_name.push("");
                builder
                    .append_data(&mut header, &dir_name, io::empty())
                    .map_err(UpdraftError::IoError)?;
            } else {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(meta.len());
                header.set_mode(mode);
                header.set_mtime(mtime(&meta));
                let file =
                    File::open(path).map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;
                let limited = limit_reader(file, opts.max_file_size);
                builder
                    .append_data(&mut header, &rel, limited)
                    .map_err(UpdraftError::IoError)?;
            }
        }
    }

    Ok(())
}

fn compress_zip(cancel: &CancellationToken, opts: &CompressOptions) -> Result<()> {
    use zip::write::SimpleFileOptions;

    let out = create_dest(&opts.destination)?;
    let mut writer = zip::ZipWriter::new(out);
    let mut state = WalkState { opts, total: 0 };

    for top in &opts.file_list {
        for entry in WalkDir::new(top).follow_links(false) {
            if cancel.is_cancelled() {
                return Err(UpdraftError::Cancelled);
            }

            let entry = entry.map_err(|e| {
                UpdraftError::IoError(
                    e.into_io_error().unwrap_or_else(|| io::Error::other("walk failed")),
                )
            })?;
            let path = entry.path();
            let meta = fs::symlink_metadata(path)
                .map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;

            if meta.file_type().is_symlink() && opts.skip_symlinks {
                continue;
            }
            reject_unsafe_source(path)?;

            // zip archives need no explicit directory entries
            if meta.is_dir() || meta.file_type().is_symlink() {
                continue;
            }

            if state.admit(path, &meta)?.is_none() {
                continue;
            }

            let rel = entry_name(top, path)?;
            let name = rel.to_string_lossy().replace('\\', "/");

            let mut file_opts = SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .large_file(meta.len() > u32::MAX as u64);
            #[cfg(unix)]
            {
                file_opts =
                    file_opts.unix_permissions(entry_mode(&meta, opts.preserve_permissions));
            }

            writer.start_file(name, file_opts).map_err(|e| UpdraftError::UnsupportedFormat {
                path: format!("{}: {e}", opts.destination.display()),
            })?;
            let file = File::open(path).map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;
            let mut limited = limit_reader(file, opts.max_file_size);
            io::copy(&mut limited, &mut writer).map_err(UpdraftError::IoError)?;
        }
    }

    writer.finish().map_err(|e| UpdraftError::UnsupportedFormat {
        path: format!("{}: {e}", opts.destination.display()),
    })?;
    Ok(())
}

fn entry_mode(meta: &fs::Metadata, preserve: bool) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if preserve {
            return meta.mode() & 0o7777;
        }
    }
    let _ = (meta, preserve);
    0o644
}

fn mtime(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn limit_reader<R: Read>(reader: R, limit: u64) -> io::Take<R> {
    let cap = if limit == 0 { u64::MAX } else { limit };
    reader.take(cap)
}
