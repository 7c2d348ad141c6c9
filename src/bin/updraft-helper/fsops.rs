//! File operations: backup copies, recursive directory copies that keep
//! symlinks symbolic, and target removal.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
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

/// Copy a file, a directory tree, or a symlink. Symlinks are recreated via
/// read-link + symlink, never dereferenced - a macOS `.app` bundle relies
/// on its internal links staying symbolic.
pub fn copy_path(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if meta.file_type().is_symlink() {
        copy_symlink(src, dst)
    } else if meta.is_dir() {
        copy_dir(src, dst)
    } else {
        copy_file(src, dst)
    }
}

/// Streamed byte copy preserving the source mode on POSIX. On Windows the
/// read-only attribute on the destination is cleared first.
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    let src_meta = fs::metadata(src)?;

    let _ = clear_readonly(dst);

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut reader = fs::File::open(src)?;
    let mut writer = fs::File::create(dst)?;
    io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    drop(writer);

    #[cfg(unix)]
    {
        fs::set_permissions(dst, src_meta.permissions())?;
    }
    #[cfg(not(unix))]
    let _ = src_meta;

    Ok(())
}

fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = fs::metadata(src)?;
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        let entry_meta = fs::symlink_metadata(&src_path)?;
        if entry_meta.file_type().is_symlink() {
            copy_symlink(&src_path, &dst_path)?;
        } else if entry_meta.is_dir() {
            copy_dir(&src_path, &dst_path)?;
        } else {
            copy_file(&src_path, &dst_path)?;
        }
    }

    #[cfg(unix)]
    {
        let _ = fs::set_permissions(dst, meta.permissions());
    }
    #[cfg(not(unix))]
    let _ = meta;

    Ok(())
}

fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let target = fs::read_link(src)?;

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    let _ = fs::remove_file(dst);

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&target, dst)
    }
    #[cfg(windows)]
    {
        // Symlink creation may require privileges on Windows.
        if target.is_dir() {
            std::os::windows::fs::symlink_dir(&target, dst)
        } else {
            std::os::windows::fs::symlink_file(&target, dst)
        }
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = target;
        Err(io::Error::other("symlinks unsupported on this platform"))
    }
}

/// Remove the swap target. On macOS the target may be a `.app` directory,
/// so removal is recursive there; elsewhere a single file is removed.
pub fn remove_target(target: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if cfg!(target_os = "macos") && meta.is_dir() {
        return fs::remove_dir_all(target);
    }
    if meta.is_dir() {
        return fs::remove_dir_all(target);
    }
    fs::remove_file(target)
}

/// Remove a file or a tree, tolerating absence.
pub fn remove_all(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Clear the read-only attribute. Only meaningful on Windows; a no-op stub
/// elsewhere.
#[cfg(windows)]
pub fn clear_readonly(path: &Path) -> io::Result<()> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let mut perms = meta.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

/// Clear the read-only attribute. Only meaningful on Windows; a no-op stub
/// elsewhere.
#[cfg(not(windows))]
pub fn clear_readonly(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_file_preserves_bytes_and_mode() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.bin");
        let dst = tmp.path().join("nested/dst.bin");
        fs::write(&src, b"payload").unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&src, fs::Permissions::from_mode(0o750)).unwrap();
        }

        copy_file(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"payload");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&dst).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o750);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_dir_keeps_symlinks_symbolic() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("bundle");
        fs::create_dir_all(src.join("Contents/MacOS")).unwrap();
        fs::write(src.join("Contents/MacOS/tool"), b"binary").unwrap();
        std::os::unix::fs::symlink("MacOS/tool", src.join("Contents/current")).unwrap();

        let dst = tmp.path().join("bundle-copy");
        copy_path(&src, &dst).unwrap();

        let link = dst.join("Contents/current");
        let meta = fs::symlink_metadata(&link).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("MacOS/tool"));
        assert_eq!(fs::read(dst.join("Contents/MacOS/tool")).unwrap(), b"binary");
    }

    #[test]
    fn test_remove_target_tolerates_absence() {
        let tmp = TempDir::new().unwrap();
        remove_target(&tmp.path().join("missing")).unwrap();
    }

    #[test]
    fn test_remove_all_file_and_tree() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("f");
        fs::write(&file, b"x").unwrap();
        remove_all(&file).unwrap();
        assert!(!file.exists());

        let tree = tmp.path().join("t");
        fs::create_dir_all(tree.join("a/b")).unwrap();
        fs::write(tree.join("a/b/c"), b"x").unwrap();
        remove_all(&tree).unwrap();
        assert!(!tree.exists());
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(clean_path(Path::new("../x")), PathBuf::from("../x"));
    }
}
