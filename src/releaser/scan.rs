//! The releaser's filename dialect and directory scan.
//!
//! Release pipelines name publisher templates with a simpler dialect than
//! the full reverse-template engine: only `{platform}`, `{arch}`,
//! `{variant}`, and `{version}` are recognised, `{variant}` and `{version}`
//! are optional and absorb their leading dash, and an arbitrary archive
//! extension may be accepted after the pattern.

use std::fs;
use std::path::Path;

use regex::Regex;

use crate::core::{Result, UpdraftError};
use crate::crypto::checksum::sha256_file;
use crate::manifest::ReleaseAsset;

use super::{ReleaserConfig, ScanOutput};

/// Compile the releaser template dialect into an anchored regex.
///
/// Example template: `test-app-{platform}-{arch}{variant}{version}` matching
/// `test-app-linux-amd64-webkit241-1.2.3.zip` (with `allow_any_extension`).
pub fn compile_release_template(cfg: &ReleaserConfig) -> Result<Regex> {
    let pattern = cfg.file_pattern.trim();
    if pattern.is_empty() {
        return Err(UpdraftError::config("file pattern must not be empty"));
    }

    // Version segments are numeric so an archive extension stays out of the
    // capture; a variant starts with a letter so it cannot swallow a version.
    let version_rule = if cfg.require_version {
        r"-[0-9]+(?:\.[0-9]+)*(?:\+[0-9A-Za-z.-]+)?"
    } else {
        r"(?:-[0-9]+(?:\.[0-9]+)*(?:\+[0-9A-Za-z.-]+)?)?"
    };

    let rule_for = |name: &str| -> Option<&str> {
        match name {
            "platform" => Some(r"[a-z0-9]+"),
            "arch" => Some(r"[A-Za-z0-9_]+"),
            "variant" => Some(r"(?:-[A-Za-z][A-Za-z0-9._]*)?"),
            "version" => Some(version_rule),
            _ => None,
        }
    };

    let bytes = pattern.as_bytes();
    let mut src = String::from("^");
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            let rest = &pattern[i..];
            let next = rest.find('{').map(|j| i + j).unwrap_or(pattern.len());
            src.push_str(&regex::escape(&pattern[i..next]));
            i = next;
            continue;
        }

        let close = pattern[i..].find('}').ok_or_else(|| UpdraftError::TemplateSyntax {
            position: i,
            message: format!("unclosed placeholder starting at index {i}"),
        })?;
        let name = &pattern[i + 1..i + close];
        if name.is_empty() {
            return Err(UpdraftError::TemplateSyntax {
                position: i,
                message: format!("empty placeholder at index {i}"),
            });
        }
        let rule = rule_for(name).ok_or_else(|| UpdraftError::TemplateSyntax {
            position: i,
            message: format!("unknown placeholder {{{name}}}"),
        })?;

        // {variant} and {version} rules are self-optional groups; wrapping a
        // capture around them keeps the whole segment optional.
        src.push_str(&format!("(?P<{name}>{rule})"));
        i += close + 1;
    }

    if cfg.allow_any_extension {
        // Allow ".zip", ".tar.gz", etc. after the pattern; .asc/.asc.sig
        // companions are filtered by the scanner.
        src.push_str(r"(?:\.[A-Za-z0-9]+(?:\.[A-Za-z0-9]+)*)?");
    }
    src.push('$');

    Regex::new(&src).map_err(|e| UpdraftError::TemplateSyntax {
        position: 0,
        message: format!("compile regex from pattern {pattern:?}: {e}"),
    })
}

fn trim_leading_dash(s: &str) -> &str {
    s.strip_prefix('-').unwrap_or(s)
}

/// Scan a directory (non-recursive) for release artifacts.
///
/// Signature companions (`.asc`, `.asc.sig`) are skipped. A file that does
/// not match the template is an error under `strict`, otherwise skipped.
/// Every match is stat'ed and hashed; the output carries the assets in name
/// order together with the accumulated `checksums.txt` body.
pub(crate) fn scan_dir(cfg: &ReleaserConfig, fallback_version: Option<&str>) -> Result<ScanOutput> {
    let re = compile_release_template(cfg)?;
    let target: &Path = cfg.target_path.as_ref();

    let mut names: Vec<String> = Vec::new();
    for entry in
        fs::read_dir(target).map_err(|e| UpdraftError::fs(target.to_path_buf(), e))?
    {
        let entry = entry.map_err(|e| UpdraftError::fs(target.to_path_buf(), e))?;
        let file_type = entry.file_type().map_err(|e| UpdraftError::fs(entry.path(), e))?;
        if file_type.is_dir() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    let mut assets = Vec::with_capacity(names.len());
    let mut checksum_lines = String::new();

    for name in names {
        if name.ends_with(".asc") || name.ends_with(".asc.sig") {
            continue;
        }

        let Some(caps) = re.captures(&name) else {
            if cfg.strict {
                return Err(UpdraftError::NoMatch {
                    input: format!("file {name:?} does not match pattern {:?}", cfg.file_pattern),
                });
            }
            continue;
        };

        let full_path = target.join(&name);
        let size = fs::metadata(&full_path)
            .map_err(|e| UpdraftError::fs(full_path.clone(), e))?
            .len() as i64;

        let checksum = sha256_file(&full_path)?;
        checksum_lines.push_str(&format!("{checksum}  {name}\n"));

        let capture = |field: &str| {
            caps.name(field).map(|m| m.as_str()).unwrap_or_default().to_string()
        };

        let mut version = fallback_version.unwrap_or_default().to_string();
        let found_version = capture("version");
        let found_version = trim_leading_dash(&found_version);
        if !found_version.is_empty() {
            version = found_version.to_string();
        }

        let variant = capture("variant");
        assets.push(
            ReleaseAsset::new()
                .with_artefact_name(&name)
                .with_platform(capture("platform"))
                .with_arch(capture("arch"))
                .with_variant(trim_leading_dash(&variant))
                .with_version(version)
                .with_checksum(checksum)
                .with_size(size),
        );
    }

    Ok(ScanOutput { assets, checksum_lines })
}
