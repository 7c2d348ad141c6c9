//! Helper self-deletion.
//!
//! The helper lives in the updater's temporary directory; after a
//! successful swap it removes itself so repeated updates never pick up a
//! stale helper.

use std::fs::File;

use crate::logging::log_line;

/// Delete the running helper executable.
///
/// POSIX allows unlinking a running binary, so this sleeps briefly (letting
/// the parent's final log writes land) and removes itself before returning.
#[cfg(not(windows))]
pub fn schedule_self_delete(log: &mut Option<File>) {
    let self_path = match std::env::current_exe() {
        Ok(path) => path,
        Err(e) => {
            log_line(log, format_args!("Cannot resolve helper path for self-delete: {e}"));
            return;
        }
    };

    let handle = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_secs(1));
        std::fs::remove_file(&self_path)
    });

    match handle.join() {
        Ok(Ok(())) => log_line(log, format_args!("Helper self-deleted successfully.")),
        Ok(Err(e)) => log_line(log, format_args!("Error removing helper: {e}")),
        Err(_) => log_line(log, format_args!("Self-delete task panicked")),
    }
}

/// Delete the running helper executable.
///
/// Windows cannot unlink a running binary, so a detached `cmd.exe` waits
/// out this process and deletes the file afterwards. The path is escaped
/// for cmd's metacharacters and `/V:OFF` avoids `!` expansion surprises.
#[cfg(windows)]
pub fn schedule_self_delete(log: &mut Option<File>) {
    use std::os::windows::process::CommandExt;

    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    const DETACHED_PROCESS: u32 = 0x0000_0008;

    let self_path = match std::env::current_exe() {
        Ok(path) => path,
        Err(e) => {
            log_line(log, format_args!("Cannot resolve helper path for self-delete: {e}"));
            return;
        }
    };

    let escaped = escape_for_cmd_literal(&self_path.display().to_string());
    let command = format!("ping 127.0.0.1 -n 3 >NUL & del /F /Q \"{escaped}\"");

    let result = std::process::Command::new("cmd.exe")
        .args(["/V:OFF", "/S", "/C", &command])
        .creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS)
        .spawn();

    match result {
        Ok(_) => log_line(
            log,
            format_args!("Scheduled self-delete for helper: {}", self_path.display()),
        ),
        Err(e) => {
            log_line(log, format_args!("Failed to schedule self-delete via cmd.exe: {e}"));
        }
    }
}

/// Escape the characters cmd.exe treats specially inside a quoted string:
/// `^ & | < > ( ) !` and the quote itself.
#[cfg(any(windows, test))]
pub fn escape_for_cmd_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '^' | '&' | '|' | '<' | '>' | '(' | ')' | '!' | '"') {
            out.push('^');
        }
        out.push(ch);
    }
    out
}
