use super::*;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

/// Build a tar.gz by hand so tests can smuggle in hostile entry names.
fn tar_gz_with_entries(dest: &Path, entries: &[(&str, &[u8])]) {
    let out = fs::File::create(dest).unwrap();
    let gz = flate2::write::GzEncoder::new(out, flate2::Compression::default());
    let mut builder = tar::Builder::new(gz);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        let name_bytes = name.as_bytes();
        header.as_old_mut().name[..name_bytes.len()].copy_from_slice(name_bytes);
        header.set_cksum();
        builder.append(&header, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn zip_with_entries(dest: &Path, entries: &[(&str, &[u8])]) {
    let out = fs::File::create(dest).unwrap();
    let mut writer = zip::ZipWriter::new(out);
    for (name, data) in entries {
        writer
            .start_file(name.to_string(), zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn test_detect_format() {
    assert_eq!(detect_format(Path::new("a.tar")), Some(ArchiveFormat::Tar));
    assert_eq!(detect_format(Path::new("a.tar.gz")), Some(ArchiveFormat::TarGz));
    assert_eq!(detect_format(Path::new("a.TGZ")), Some(ArchiveFormat::TarGz));
    assert_eq!(detect_format(Path::new("a.tar.zst")), Some(ArchiveFormat::TarZstd));
    assert_eq!(detect_format(Path::new("a.zip")), Some(ArchiveFormat::Zip));
    assert_eq!(detect_format(Path::new("a.rar")), None);
}

#[test]
fn test_unsupported_format_errors() {
    let tmp = TempDir::new().unwrap();
    let src = write_file(tmp.path(), "artifact.rar", b"not an archive");
    let cancel = CancellationToken::new();
    let err = extract(&cancel, &src, &tmp.path().join("out"), &ExtractOptions::default())
        .unwrap_err();
    assert!(matches!(err, UpdraftError::UnsupportedFormat { .. }));
}

#[test]
fn test_roundtrip_tar_gz_preserves_tree_and_modes() {
    let tmp = TempDir::new().unwrap();
    let src_root = tmp.path().join("payload");
    write_file(&src_root, "bin/tool", b"#!/bin/sh\necho hi\n");
    write_file(&src_root, "share/doc/readme.txt", b"docs");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(src_root.join("bin/tool"), fs::Permissions::from_mode(0o755))
            .unwrap();
    }

    let archive_path = tmp.path().join("payload.tar.gz");
    let cancel = CancellationToken::new();
    let opts = CompressOptions::new(&archive_path).with_path(&src_root);
    compress(&cancel, &opts).unwrap();

    let dest = tmp.path().join("out");
    extract(&cancel, &archive_path, &dest, &ExtractOptions::default()).unwrap();

    assert_eq!(fs::read(dest.join("payload/bin/tool")).unwrap(), b"#!/bin/sh\necho hi\n");
    assert_eq!(fs::read(dest.join("payload/share/doc/readme.txt")).unwrap(), b"docs");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(dest.join("payload/bin/tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}

#[test]
fn test_roundtrip_zip() {
    let tmp = TempDir::new().unwrap();
    let src_root = tmp.path().join("app");
    write_file(&src_root, "app.bin", b"binary bytes");

    let archive_path = tmp.path().join("app.zip");
    let cancel = CancellationToken::new();
    let opts = CompressOptions::new(&archive_path).with_path(&src_root);
    compress(&cancel, &opts).unwrap();

    let dest = tmp.path().join("out");
    extract(&cancel, &archive_path, &dest, &ExtractOptions::default()).unwrap();
    assert_eq!(fs::read(dest.join("app/app.bin")).unwrap(), b"binary bytes");
}

#[test]
fn test_roundtrip_tar_zstd() {
    let tmp = TempDir::new().unwrap();
    let src_root = tmp.path().join("data");
    write_file(&src_root, "blob", &vec![7u8; 4096]);

    let archive_path = tmp.path().join("data.tar.zst");
    let cancel = CancellationToken::new();
    let opts = CompressOptions::new(&archive_path).with_path(&src_root);
    compress(&cancel, &opts).unwrap();

    let dest = tmp.path().join("out");
    extract(&cancel, &archive_path, &dest, &ExtractOptions::default()).unwrap();
    assert_eq!(fs::read(dest.join("data/blob")).unwrap(), vec![7u8; 4096]);
}

#[test]
fn test_traversal_entry_rejected_and_dest_left_empty() {
    let tmp = TempDir::new().unwrap();
    let archive_path = tmp.path().join("evil.tar.gz");
    tar_gz_with_entries(&archive_path, &[("../evil.txt", b"pwned")]);

    let dest = tmp.path().join("out");
    let cancel = CancellationToken::new();
    let err =
        extract(&cancel, &archive_path, &dest, &ExtractOptions::default()).unwrap_err();
    assert!(matches!(err, UpdraftError::IllegalPath { ref name } if name.contains("evil")));

    assert!(!tmp.path().join("evil.txt").exists());
    let remaining: Vec<_> = fs::read_dir(&dest).unwrap().collect();
    assert!(remaining.is_empty(), "destination should be empty after rejection");
}

#[test]
fn test_verified_path_containment() {
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("out");
    fs::create_dir_all(&dest).unwrap();

    assert!(paths::verified_path(&dest, "ok/file.txt").is_ok());
    assert!(paths::verified_path(&dest, "a/../b.txt").is_ok());
    assert!(matches!(
        paths::verified_path(&dest, "../evil.txt"),
        Err(UpdraftError::IllegalPath { .. })
    ));
    assert!(matches!(
        paths::verified_path(&dest, "a/../../evil.txt"),
        Err(UpdraftError::IllegalPath { .. })
    ));
    assert!(matches!(
        paths::verified_path(&dest, "/etc/evil"),
        Err(UpdraftError::IllegalPath { .. })
    ));
}

#[test]
fn test_zip_per_file_cap_removes_partial_file() {
    let tmp = TempDir::new().unwrap();
    let archive_path = tmp.path().join("big.zip");
    zip_with_entries(&archive_path, &[("big.txt", &vec![0u8; 1024])]);

    let dest = tmp.path().join("out");
    let cancel = CancellationToken::new();
    let opts = ExtractOptions { max_file_size: 100, ..Default::default() };
    let err = extract(&cancel, &archive_path, &dest, &opts).unwrap_err();
    assert!(matches!(err, UpdraftError::SizeLimitExceeded { limit: 100, .. }));
    assert!(!dest.join("big.txt").exists(), "partial file must be removed");
}

#[test]
fn test_total_size_cap() {
    let tmp = TempDir::new().unwrap();
    let archive_path = tmp.path().join("many.tar.gz");
    tar_gz_with_entries(
        &archive_path,
        &[("a.bin", &[1u8; 600][..]), ("b.bin", &[2u8; 600][..])],
    );

    let dest = tmp.path().join("out");
    let cancel = CancellationToken::new();
    let opts = ExtractOptions { max_total_size: 1000, ..Default::default() };
    let err = extract(&cancel, &archive_path, &dest, &opts).unwrap_err();
    assert!(matches!(err, UpdraftError::SizeLimitExceeded { limit: 1000, .. }));
}

#[test]
fn test_include_exclude_patterns() {
    let tmp = TempDir::new().unwrap();
    let archive_path = tmp.path().join("mixed.tar.gz");
    tar_gz_with_entries(
        &archive_path,
        &[("keep.txt", b"keep"), ("skip.log", b"skip"), ("other.txt", b"other")],
    );

    let dest = tmp.path().join("out");
    let cancel = CancellationToken::new();
    let opts = ExtractOptions {
        include_patterns: vec!["*.txt".to_string()],
        exclude_patterns: vec!["other*".to_string()],
        ..Default::default()
    };
    extract(&cancel, &archive_path, &dest, &opts).unwrap();

    assert!(dest.join("keep.txt").exists());
    assert!(!dest.join("skip.log").exists());
    assert!(!dest.join("other.txt").exists());
}

#[test]
fn test_symlinks_refused_by_default() {
    #[cfg(unix)]
    {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("links.tar");
        let out = fs::File::create(&archive_path).unwrap();
        let mut builder = tar::Builder::new(out);

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, "link", "target.txt").unwrap();

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(4);
        header.set_mode(0o644);
        builder.append_data(&mut header, "target.txt", &b"data"[..]).unwrap();
        builder.into_inner().unwrap();

        let dest = tmp.path().join("out");
        let cancel = CancellationToken::new();
        extract(&cancel, &archive_path, &dest, &ExtractOptions::default()).unwrap();
        assert!(fs::symlink_metadata(dest.join("link")).is_err(), "symlink must not exist");
        assert!(dest.join("target.txt").exists());

        // Allowed: in-tree relative link is created.
        let dest2 = tmp.path().join("out2");
        let opts = ExtractOptions { allow_symlinks: true, ..Default::default() };
        extract(&cancel, &archive_path, &dest2, &opts).unwrap();
        let meta = fs::symlink_metadata(dest2.join("link")).unwrap();
        assert!(meta.file_type().is_symlink());
    }
}

#[test]
fn test_escaping_symlink_rejected_when_allowed() {
    #[cfg(unix)]
    {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("escape.tar");
        let out = fs::File::create(&archive_path).unwrap();
        let mut builder = tar::Builder::new(out);
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, "link", "../../outside").unwrap();
        builder.into_inner().unwrap();

        let dest = tmp.path().join("out");
        let cancel = CancellationToken::new();
        let opts = ExtractOptions { allow_symlinks: true, ..Default::default() };
        let err = extract(&cancel, &archive_path, &dest, &opts).unwrap_err();
        assert!(matches!(err, UpdraftError::IllegalPath { .. }));
    }
}

#[test]
fn test_cancelled_extraction_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let archive_path = tmp.path().join("payload.tar.gz");
    tar_gz_with_entries(&archive_path, &[("a.txt", b"a"), ("b.txt", b"b")]);

    let dest = tmp.path().join("out");
    let cancel = CancellationToken::new();
    cancel.cancel();
    let opts = ExtractOptions { on_cancel_cleanup: true, ..Default::default() };
    let err = extract(&cancel, &archive_path, &dest, &opts).unwrap_err();
    assert!(err.is_cancelled());
    assert!(!dest.join("a.txt").exists());
}

#[test]
fn test_compress_rejects_escaping_relative_source() {
    let tmp = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let opts = CompressOptions::new(tmp.path().join("out.tar.gz"))
        .with_path("../outside-the-tree");
    let err = compress(&cancel, &opts).unwrap_err();
    // Either the walk fails (path missing) or the safety check trips; both
    // must error rather than silently embedding an escaping path.
    assert!(matches!(
        err,
        UpdraftError::IllegalPath { .. } | UpdraftError::IoError(_) | UpdraftError::FilesystemError { .. }
    ));
}

#[test]
fn test_compress_per_file_cap() {
    let tmp = TempDir::new().unwrap();
    let src_root = tmp.path().join("data");
    write_file(&src_root, "big.bin", &vec![0u8; 2048]);

    let cancel = CancellationToken::new();
    let mut opts = CompressOptions::new(tmp.path().join("out.tar.gz")).with_path(&src_root);
    opts.max_file_size = 100;
    let err = compress(&cancel, &opts).unwrap_err();
    assert!(matches!(err, UpdraftError::SizeLimitExceeded { limit: 100, .. }));
}

#[test]
fn test_overwrite_flag() {
    let tmp = TempDir::new().unwrap();
    let archive_path = tmp.path().join("one.tar.gz");
    tar_gz_with_entries(&archive_path, &[("file.txt", b"new contents")]);

    let dest = tmp.path().join("out");
    fs::create_dir_all(&dest).unwrap();
    fs::write(dest.join("file.txt"), b"old").unwrap();

    let cancel = CancellationToken::new();
    let err = extract(&cancel, &archive_path, &dest, &ExtractOptions::default());
    assert!(err.is_err(), "existing file without overwrite must fail");

    let opts = ExtractOptions { overwrite: true, ..Default::default() };
    extract(&cancel, &archive_path, &dest, &opts).unwrap();
    assert_eq!(fs::read(dest.join("file.txt")).unwrap(), b"new contents");
}
