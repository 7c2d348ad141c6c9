//! Staging the swap helper executable.
//!
//! The swap is never performed in-process: the running binary cannot
//! atomically replace itself on Windows and cannot reliably replace a macOS
//! `.app` bundle. Instead the updater stages the `updraft-helper` executable
//! into the temporary directory and spawns it. [`HelperSource`] says where
//! the helper bytes come from.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{Result, UpdraftError};

/// Where the swap helper executable comes from.
#[derive(Debug, Clone, Default)]
pub enum HelperSource {
    /// Look for `updraft-helper` next to the current executable. This is
    /// the default: installers ship the helper alongside the application.
    #[default]
    Sibling,
    /// A caller-provided path to the helper executable.
    Path(PathBuf),
    /// Helper bytes embedded by the host application
    /// (`include_bytes!` of a prebuilt helper for the target platform).
    Embedded(&'static [u8]),
}

fn helper_file_name() -> &'static str {
    if cfg!(windows) {
        "updraft-helper.exe"
    } else {
        "updraft-helper"
    }
}

/// Write or copy the helper into `staging_dir` and make it executable.
/// Returns the staged path.
pub fn stage_helper(source: &HelperSource, staging_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(staging_dir)
        .map_err(|e| UpdraftError::fs(staging_dir.to_path_buf(), e))?;
    let staged = staging_dir.join(helper_file_name());

    match source {
        HelperSource::Sibling => {
            let exe = std::env::current_exe().map_err(|e| UpdraftError::SwapFailed {
                reason: format!("cannot resolve current executable: {e}"),
            })?;
            let sibling = exe
                .parent()
                .map(|dir| dir.join(helper_file_name()))
                .filter(|p| p.exists())
                .ok_or_else(|| UpdraftError::SwapFailed {
                    reason: format!(
                        "helper {:?} not found beside {}",
                        helper_file_name(),
                        exe.display()
                    ),
                })?;
            fs::copy(&sibling, &staged).map_err(|e| UpdraftError::fs(staged.clone(), e))?;
        }
        HelperSource::Path(path) => {
            if !path.exists() {
                return Err(UpdraftError::SwapFailed {
                    reason: format!("helper not found at {}", path.display()),
                });
            }
            fs::copy(path, &staged).map_err(|e| UpdraftError::fs(staged.clone(), e))?;
        }
        HelperSource::Embedded(bytes) => {
            fs::write(&staged, bytes).map_err(|e| UpdraftError::fs(staged.clone(), e))?;
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(
            &staged,
            fs::Permissions::from_mode(crate::constants::HELPER_MODE),
        )
        .map_err(|e| UpdraftError::fs(staged.clone(), e))?;
    }

    Ok(staged)
}
