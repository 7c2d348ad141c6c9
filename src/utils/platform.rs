//! Platform and architecture detection, plus artifact-name heuristics.
//!
//! The manifest vocabulary is lowercased platform tags (`linux`, `darwin`,
//! `windows`, ...) and normalized architecture tags (`amd64`, `arm64`,
//! `386`, ...). Everything here maps process-level or filename-level
//! information onto that vocabulary.

use std::path::{Path, PathBuf};

/// The running process's platform in manifest vocabulary.
pub fn current_platform() -> String {
    match std::env::consts::OS {
        "macos" => "darwin".to_string(),
        other => other.to_string(),
    }
}

/// The running process's architecture in manifest vocabulary.
pub fn current_arch() -> String {
    match std::env::consts::ARCH {
        "x86_64" => "amd64".to_string(),
        "aarch64" => "arm64".to_string(),
        "x86" => "386".to_string(),
        other => other.to_string(),
    }
}

/// Guess `(platform, arch)` from an asset file name.
///
/// Two passes: substring tests against the lowercased base name for the
/// common spellings, then a token scan (splitting on `-`, `_`, `.`) to catch
/// names like `tool.linux.amd64.tar.gz`. Either element of the result may be
/// empty when nothing matched.
///
/// ```rust
/// use updraft::utils::platform::guess_asset_platform_arch;
///
/// let (platform, arch) = guess_asset_platform_arch("mytool_1.2.3_linux_amd64.tar.gz");
/// assert_eq!(platform, "linux");
/// assert_eq!(arch, "amd64");
/// ```
pub fn guess_asset_platform_arch(name: &str) -> (String, String) {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_else(|| name.to_ascii_lowercase());

    let mut platform = if base.contains("windows") || base.ends_with(".exe") {
        "windows"
    } else if base.contains("darwin")
        || base.contains("macos")
        || base.contains("macosx")
        || base.contains("mac")
        || base.contains("osx")
    {
        "darwin"
    } else if base.contains("linux") {
        "linux"
    } else if base.contains("freebsd") {
        "freebsd"
    } else if base.contains("openbsd") {
        "openbsd"
    } else if base.contains("netbsd") {
        "netbsd"
    } else if base.contains("android") {
        "android"
    } else {
        ""
    }
    .to_string();

    let mut arch = if base.contains("arm64") || base.contains("aarch64") {
        "arm64"
    } else if base.contains("amd64") || base.contains("x86_64") {
        "amd64"
    } else if base.contains("386") || base.contains("x86-32") {
        "386"
    } else if base.contains("armv7") || base.contains("armhf") {
        "arm"
    } else if base.contains("ppc64le") {
        "ppc64le"
    } else if base.contains("ppc64") {
        "ppc64"
    } else if base.contains("s390x") {
        "s390x"
    } else if base.contains("riscv64") {
        "riscv64"
    } else {
        ""
    }
    .to_string();

    if platform.is_empty() || arch.is_empty() {
        for token in base.split(['-', '_', '.']) {
            match token {
                "linux" | "freebsd" | "openbsd" | "netbsd" => {
                    if platform.is_empty() {
                        platform = token.to_string();
                    }
                }
                "darwin" | "macos" | "macosx" | "osx" => {
                    if platform.is_empty() {
                        platform = "darwin".to_string();
                    }
                }
                "windows" | "win" => {
                    if platform.is_empty() {
                        platform = "windows".to_string();
                    }
                }
                "amd64" | "x86_64" => {
                    if arch.is_empty() {
                        arch = "amd64".to_string();
                    }
                }
                "arm64" | "aarch64" => {
                    if arch.is_empty() {
                        arch = "arm64".to_string();
                    }
                }
                "386" | "i386" => {
                    if arch.is_empty() {
                        arch = "386".to_string();
                    }
                }
                "armv7" | "armhf" => {
                    if arch.is_empty() {
                        arch = "arm".to_string();
                    }
                }
                _ => {}
            }
        }
    }

    (platform, arch)
}

/// Walk up from `path` to the enclosing macOS `.app` bundle root, if any.
///
/// Given `/Applications/Tool.app/Contents/MacOS/tool` this returns
/// `/Applications/Tool.app`. Returns `None` when no component carries the
/// `.app` suffix.
pub fn find_app_bundle_root(path: &Path) -> Option<PathBuf> {
    let mut current = Some(path);
    while let Some(p) = current {
        if p.extension().map(|e| e == "app").unwrap_or(false) {
            return Some(p.to_path_buf());
        }
        current = p.parent();
    }
    None
}

/// Locate an executable on `PATH`, the way a shell would.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let with_exe = dir.join(format!("{name}.exe"));
            if is_executable(&with_exe) {
                return Some(with_exe);
            }
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else { return false };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_common_names() {
        let cases = [
            ("mytool_1.2.3_linux_amd64.tar.gz", "linux", "amd64"),
            ("mytool-windows-amd64.zip", "windows", "amd64"),
            ("mytool_darwin_arm64.zip", "darwin", "arm64"),
            ("mytool_linux_x86_64_musl.tar.gz", "linux", "amd64"),
            ("mytool_linux_i386.deb", "linux", "386"),
            ("mytool_x86_64-unknown-linux-gnu.tar.xz", "linux", "amd64"),
            ("tool.exe", "windows", ""),
            ("README.md", "", ""),
        ];
        for (name, platform, arch) in cases {
            let (p, a) = guess_asset_platform_arch(name);
            assert_eq!(p, platform, "platform for {name}");
            assert_eq!(a, arch, "arch for {name}");
        }
    }

    #[test]
    fn test_app_bundle_root() {
        let path = Path::new("/Applications/Tool.app/Contents/MacOS/tool");
        assert_eq!(
            find_app_bundle_root(path),
            Some(PathBuf::from("/Applications/Tool.app"))
        );
        assert_eq!(find_app_bundle_root(Path::new("/usr/local/bin/tool")), None);
    }

    #[test]
    fn test_current_values_nonempty() {
        assert!(!current_platform().is_empty());
        assert!(!current_arch().is_empty());
    }
}
