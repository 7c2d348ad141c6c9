//! Field specifications and normalizers for release filename parsing.
//!
//! The patterns use bounded quantifiers throughout so a compiled template
//! stays well under the regex-source budget even when several fields appear.

use super::{Parser, ParserBuilder};
use crate::core::Result;

/// Normalizer applied to a captured field value.
pub type Normalizer = fn(&str) -> String;

/// Regexp fragment and optional normalizer for one template field.
#[derive(Debug, Clone, Default)]
pub struct FieldSpec {
    /// Regex fragment the field matches. Empty means the parser default.
    pub pattern: String,
    /// Normalizer applied to the captured value.
    pub normalize: Option<Normalizer>,
}

impl FieldSpec {
    /// A field spec with a pattern and no normalizer.
    pub fn pattern(pattern: &str) -> Self {
        Self { pattern: pattern.to_string(), normalize: None }
    }

    /// A field spec with a pattern and a normalizer.
    pub fn normalized(pattern: &str, normalize: Normalizer) -> Self {
        Self { pattern: pattern.to_string(), normalize: Some(normalize) }
    }
}

/// Semver-like version: dotted numerics with optional pre-release or build
/// metadata suffix.
pub const PAT_VERSION: &str = r"[0-9]{1,4}(?:\.[0-9]{1,4}){0,3}(?:[-+][0-9A-Za-z._+-]{1,50})?";

/// Architecture spellings accepted in artifact names.
pub const PAT_ARCH: &str =
    r"(?i:x86_64(?:_v[234])?|x86-64(?:-v[234])?|amd64|arm64|aarch64|386|i386|i686|universal)";

/// Operating-system spellings accepted in artifact names.
pub const PAT_OS: &str = r"(?i:linux|darwin|macos|mac|osx|windows|win32|win64|freebsd|openbsd|netbsd)";

/// Target-triple tails emitted by common release pipelines.
pub const PAT_TRIPLE: &str =
    r"(?:unknown-linux-gnu|apple-darwin|pc-windows-(?:msvc|gnu)|linux-musl)";

/// Free-form build variant tag.
pub const PAT_VARIANT: &str = r"[A-Za-z0-9+._-]{1,100}";

/// Identifier for artifact base names. Deliberately excludes `-` and `.` so
/// a greedy capture cannot swallow the version or platform segments that
/// conventionally follow the name.
pub const PAT_IDENT: &str = r"[A-Za-z][A-Za-z0-9_]{0,99}";

/// Map architecture spellings onto the manifest vocabulary. Idempotent.
pub fn arch_normalizer(s: &str) -> String {
    match s.to_ascii_lowercase().as_str() {
        "x86_64" | "x86-64" | "amd64" => "amd64".to_string(),
        "x86_64_v2" | "x86-64-v2" => "amd64_v2".to_string(),
        "x86_64_v3" | "x86-64-v3" => "amd64_v3".to_string(),
        "x86_64_v4" | "x86-64-v4" => "amd64_v4".to_string(),
        "arm64" | "aarch64" => "arm64".to_string(),
        "i386" | "i686" | "386" => "386".to_string(),
        "universal" => "universal".to_string(),
        other => other.to_string(),
    }
}

/// Map operating-system spellings onto the manifest vocabulary. Idempotent.
pub fn os_normalizer(s: &str) -> String {
    match s.to_ascii_lowercase().as_str() {
        "darwin" | "mac" | "macos" | "osx" => "darwin".to_string(),
        "windows" | "win32" | "win64" => "windows".to_string(),
        other => other.to_string(),
    }
}

/// A parser pre-loaded with the field set release pipelines use:
/// `name`, `version`, `arch`, `os`, `triple`, and `variant`.
pub fn release_parser() -> Result<Parser> {
    ParserBuilder::new()
        .with_field("name", FieldSpec::pattern(PAT_IDENT))
        .with_field("version", FieldSpec::pattern(PAT_VERSION))
        .with_field("arch", FieldSpec::normalized(PAT_ARCH, arch_normalizer))
        .with_field("os", FieldSpec::normalized(PAT_OS, os_normalizer))
        .with_field("triple", FieldSpec::pattern(PAT_TRIPLE))
        .with_field("variant", FieldSpec::pattern(PAT_VARIANT))
        .build()
}
