//! Launching the swapped-in (or restored) application, per platform.

use std::fs::File;
use std::path::Path;
use std::process::Command;

use crate::logging::log_line;

/// Start the application at `path` with `args` and return without waiting.
///
/// macOS `.app` bundles go through `open -n` so LaunchServices assigns them
/// a fresh instance; Windows children are detached into their own process
/// group so they survive this helper exiting.
#[cfg(target_os = "macos")]
pub fn launch_app(log: &mut Option<File>, path: &Path, args: &[String]) -> std::io::Result<()> {
    let mut cmd = if path.extension().map(|e| e == "app").unwrap_or(false) {
        log_line(log, format_args!(".app on darwin detected, using open -n"));
        let mut cmd = Command::new("open");
        cmd.arg("-n").arg(path).arg("--args").args(args);
        cmd
    } else {
        let mut cmd = Command::new(path);
        cmd.args(args);
        cmd
    };

    spawn_logged(log, &mut cmd, path)
}

/// Start the application at `path` with `args` and return without waiting.
#[cfg(windows)]
pub fn launch_app(log: &mut Option<File>, path: &Path, args: &[String]) -> std::io::Result<()> {
    use std::os::windows::process::CommandExt;

    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    const DETACHED_PROCESS: u32 = 0x0000_0008;

    let mut cmd = Command::new(path);
    cmd.args(args).creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS);
    spawn_logged(log, &mut cmd, path)
}

/// Start the application at `path` with `args` and return without waiting.
#[cfg(not(any(target_os = "macos", windows)))]
pub fn launch_app(log: &mut Option<File>, path: &Path, args: &[String]) -> std::io::Result<()> {
    let mut cmd = Command::new(path);
    cmd.args(args);
    spawn_logged(log, &mut cmd, path)
}

fn spawn_logged(log: &mut Option<File>, cmd: &mut Command, path: &Path) -> std::io::Result<()> {
    match cmd.spawn() {
        Ok(_child) => {
            log_line(log, format_args!("Launch successful: {}", path.display()));
            Ok(())
        }
        Err(e) => {
            log_line(log, format_args!("Launch failed for {}: {e}", path.display()));
            Err(e)
        }
    }
}
