//! Update log handling.
//!
//! The log doubles as a completion marker: the updater looks for it on the
//! next launch to learn that a swap finished. Discovery order for the log
//! location: the requested path, a platform default
//! (`%LOCALAPPDATA%\<app>\Logs`, `~/Library/Logs/<app>`,
//! `$XDG_STATE_HOME/<app>` then `$XDG_CACHE_HOME/<app>` then
//! `~/.local/state/<app>`), and finally the system temp directory.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "updraft";
const DEFAULT_LOG_FILE_NAME: &str = "updraft-update.log";

/// Open the update log, walking the fallback chain. Always returns a path;
/// the file handle is `None` only when even the temp directory refused us.
pub fn open_log_file(requested: Option<&str>) -> (Option<File>, PathBuf) {
    if let Some(requested) = requested {
        let path = PathBuf::from(requested);
        if let Ok(file) = try_create_log(&path) {
            return (Some(file), path);
        }
    }

    let default_path = default_log_path();
    if let Ok(file) = try_create_log(&default_path) {
        return (Some(file), default_path);
    }

    let fallback = std::env::temp_dir().join(DEFAULT_LOG_FILE_NAME);
    let file = try_create_log(&fallback).ok();
    (file, fallback)
}

fn try_create_log(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn default_log_path() -> PathBuf {
    if cfg!(windows) {
        if let Some(base) = std::env::var_os("LOCALAPPDATA") {
            return PathBuf::from(base).join(APP_NAME).join("Logs").join(DEFAULT_LOG_FILE_NAME);
        }
        return std::env::temp_dir().join(DEFAULT_LOG_FILE_NAME);
    }

    if cfg!(target_os = "macos") {
        return match dirs::home_dir() {
            Some(home) => home
                .join("Library")
                .join("Logs")
                .join(APP_NAME)
                .join(DEFAULT_LOG_FILE_NAME),
            None => std::env::temp_dir().join(DEFAULT_LOG_FILE_NAME),
        };
    }

    if let Some(base) = std::env::var_os("XDG_STATE_HOME") {
        return PathBuf::from(base).join(APP_NAME).join(DEFAULT_LOG_FILE_NAME);
    }
    if let Some(base) = std::env::var_os("XDG_CACHE_HOME") {
        return PathBuf::from(base).join(APP_NAME).join(DEFAULT_LOG_FILE_NAME);
    }
    match dirs::home_dir() {
        Some(home) => {
            home.join(".local").join("state").join(APP_NAME).join(DEFAULT_LOG_FILE_NAME)
        }
        None => std::env::temp_dir().join(DEFAULT_LOG_FILE_NAME),
    }
}

/// Append one timestamped line to stderr and, when open, the log file.
pub fn log_line(log: &mut Option<File>, message: fmt::Arguments<'_>) {
    let line = format!("{}: {message}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));

    eprintln!("{line}");
    if let Some(file) = log {
        if let Err(e) = writeln!(file, "{line}") {
            eprintln!("Failed to write to log file: {e}");
        }
    }
}
