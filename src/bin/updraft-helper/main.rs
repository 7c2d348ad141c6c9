//! The swap helper: replaces an installed application with a downloaded
//! build while the application itself is not running.
//!
//! ```text
//! updraft-helper <oldPath> <newPath> [logPath] [-- <launchArgs...>] [--args "quoted"]
//! ```
//!
//! The parent process spawns this helper and exits. The helper backs the
//! target up, swaps the new build in with retries (rename first, streamed
//! copy as the cross-device fallback), relaunches the target, and rolls
//! back to the backup if the swap or the launch fails. Exit codes:
//!
//! - `0` - success
//! - `1` - usage error or backup failure
//! - `2` - replacement exhausted its retries (rolled back)
//! - `3` - the relaunch failed (rolled back)

mod args;
mod cleanup;
mod fsops;
mod launch;
mod logging;

use std::path::{Path, PathBuf};
use std::time::Duration;

use logging::{log_line, open_log_file};

const REPLACE_ATTEMPTS: u32 = 15;
const REPLACE_ATTEMPT_DELAY: Duration = Duration::from_secs(3);

fn main() {
    let argv: Vec<String> = std::env::args().collect();
    let parsed = match args::parse_args(&argv) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{e}");
            eprintln!(
                "Usage: updraft-helper <old_path> <new_path> [log_path] [-- <args...>] [--args \"...\"]"
            );
            std::process::exit(1);
        }
    };

    let mut target = normalize_path(Path::new(&parsed.old_path));
    let replacement = normalize_path(Path::new(&parsed.new_path));

    let (mut log, log_path) = open_log_file(parsed.log_path.as_deref());
    log_line(&mut log, format_args!("Writing log to: {}", log_path.display()));
    log_line(
        &mut log,
        format_args!(
            "Updater starting. old={} new={}",
            target.display(),
            replacement.display()
        ),
    );
    log_line(&mut log, format_args!("Launch args: {:?}", parsed.launch_args));

    // Windows convention: a bare target name means the .exe beside it.
    if cfg!(windows) && target.extension().is_none() {
        target.set_extension("exe");
        log_line(&mut log, format_args!("Windows: normalized target to {}", target.display()));
    }

    let backup = PathBuf::from(format!("{}.bak", target.display()));

    log_line(&mut log, format_args!("Creating backup at {}", backup.display()));
    if let Err(e) = fsops::copy_path(&target, &backup) {
        log_line(&mut log, format_args!("Backup failed: {e}"));
        std::process::exit(1);
    }

    log_line(
        &mut log,
        format_args!(
            "Starting replace process (attempts={REPLACE_ATTEMPTS}, delay={}s)",
            REPLACE_ATTEMPT_DELAY.as_secs()
        ),
    );

    if let Err(e) = replace_with_retry(&mut log, &target, &replacement) {
        log_line(&mut log, format_args!("Replacement failed: {e}"));
        log_line(&mut log, format_args!("Restoring backup."));
        restore_backup(&mut log, &backup, &target, &parsed.launch_args);
        std::process::exit(2);
    }

    log_line(&mut log, format_args!("Attempting to launch new target"));
    if let Err(e) = launch::launch_app(&mut log, &target, &parsed.launch_args) {
        log_line(&mut log, format_args!("Launch failed: {e}"));
        log_line(&mut log, format_args!("Rolling back to backup."));
        restore_backup(&mut log, &backup, &target, &parsed.launch_args);
        std::process::exit(3);
    }

    log_line(&mut log, format_args!("New target launched successfully."));
    cleanup_backup(&mut log, &backup);
    cleanup::schedule_self_delete(&mut log);
    log_line(&mut log, format_args!("Helper finished."));
}

fn normalize_path(path: &Path) -> PathBuf {
    let cleaned = fsops::clean_path(path);
    std::path::absolute(&cleaned).unwrap_or(cleaned)
}

/// Swap the replacement into place: remove the target, rename, and fall
/// back to a streamed copy when rename fails across filesystems or under
/// lock contention. Retries on a fixed delay.
fn replace_with_retry(
    log: &mut Option<std::fs::File>,
    target: &Path,
    replacement: &Path,
) -> Result<(), String> {
    let mut last_error = String::new();

    for attempt in 1..=REPLACE_ATTEMPTS {
        if let Err(e) = fsops::remove_target(target) {
            last_error = e.to_string();
            log_line(
                log,
                format_args!(
                    "Failed to remove target (attempt {attempt}/{REPLACE_ATTEMPTS}): {e}"
                ),
            );
            std::thread::sleep(REPLACE_ATTEMPT_DELAY);
            continue;
        }

        // Rename is atomic when source and destination share a filesystem.
        match std::fs::rename(replacement, target) {
            Ok(()) => {
                log_line(log, format_args!("Replaced using rename."));
                return Ok(());
            }
            Err(e) => {
                last_error = e.to_string();
                log_line(
                    log,
                    format_args!("Rename failed (attempt {attempt}/{REPLACE_ATTEMPTS}): {e}"),
                );
            }
        }

        match fsops::copy_path(replacement, target) {
            Ok(()) => {
                if let Err(e) = fsops::remove_all(replacement) {
                    // Target is already in place; a stale source is not fatal.
                    log_line(
                        log,
                        format_args!(
                            "Warning: failed to remove replacement source {}: {e}",
                            replacement.display()
                        ),
                    );
                }
                log_line(log, format_args!("Replaced using copy+remove fallback."));
                return Ok(());
            }
            Err(e) => {
                last_error = e.to_string();
                log_line(
                    log,
                    format_args!(
                        "Copy fallback failed (attempt {attempt}/{REPLACE_ATTEMPTS}): {e}"
                    ),
                );
                std::thread::sleep(REPLACE_ATTEMPT_DELAY);
            }
        }
    }

    Err(format!("replacement failed after {REPLACE_ATTEMPTS} attempts: {last_error}"))
}

/// Put the backup back and relaunch the old build.
fn restore_backup(
    log: &mut Option<std::fs::File>,
    backup: &Path,
    target: &Path,
    launch_args: &[String],
) {
    log_line(
        log,
        format_args!("Restoring backup from {} to {}", backup.display(), target.display()),
    );

    if let Err(e) = fsops::remove_target(target) {
        log_line(log, format_args!("Failed to remove unwanted version: {e}"));
    }

    if let Err(e) = std::fs::rename(backup, target) {
        log_line(log, format_args!("Rename restore failed: {e}"));
        log_line(log, format_args!("Attempting restore via copy+remove fallback."));
        if let Err(e) = fsops::copy_path(backup, target) {
            log_line(log, format_args!("Copy restore failed: {e}"));
            return;
        }
        let _ = fsops::remove_all(backup);
    }

    match launch::launch_app(log, target, launch_args) {
        Ok(()) => log_line(log, format_args!("Old version relaunched successfully.")),
        Err(e) => log_line(log, format_args!("Failed to start restored version: {e}")),
    }
}

fn cleanup_backup(log: &mut Option<std::fs::File>, backup: &Path) {
    log_line(log, format_args!("Cleaning backup at {}", backup.display()));
    if let Err(e) = fsops::remove_all(backup) {
        log_line(log, format_args!("Error cleaning backup {}: {e}", backup.display()));
    }
}
