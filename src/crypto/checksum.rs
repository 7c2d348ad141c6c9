//! SHA-256 checksums over file bytes.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::{Result, UpdraftError};

/// Compute the hex-encoded SHA-256 of a file, streaming its bytes.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| UpdraftError::fs(path.to_path_buf(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute checksums for multiple files and return the standard
/// `sha256sum` text: one `<hex>  <basename>` line per file.
pub fn sha256_batch<P: AsRef<Path>>(paths: &[P]) -> Result<String> {
    let mut out = String::new();
    for path in paths {
        let path = path.as_ref();
        let sum = sha256_file(path)?;
        let base = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        out.push_str(&format!("{sum}  {base}\n"));
    }
    Ok(out)
}

/// Verify a file against an expected hex digest.
pub fn sha256_verify(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(UpdraftError::ChecksumMismatch {
            path: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Short change-detection checksum of any serialisable value: SHA-256 over
/// its canonical JSON bytes, truncated to eight hex characters.
pub fn value_checksum<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest)[..8].to_string())
}
