//! Argument parsing for the helper's small positional grammar.

/// Parsed helper invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArgs {
    /// Path being replaced.
    pub old_path: String,
    /// Path of the new build.
    pub new_path: String,
    /// Optional log path. A token after `new_path` that is not `--` and
    /// does not start with `-` is taken as the log path.
    pub log_path: Option<String>,
    /// Arguments for the relaunched application.
    pub launch_args: Vec<String>,
}

/// Parse `argv` (including the program name at index 0).
pub fn parse_args(argv: &[String]) -> Result<ParsedArgs, String> {
    if argv.len() < 3 {
        return Err("missing required args".to_string());
    }

    let old_path = argv[1].clone();
    let new_path = argv[2].clone();
    let mut rest = &argv[3..];

    let mut log_path = None;
    if let Some(first) = rest.first() {
        if first != "--" && first != "--args" && !first.starts_with('-') {
            log_path = Some(first.clone());
            rest = &rest[1..];
        }
    }

    let mut launch_args = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--" => {
                launch_args.extend(rest[i + 1..].iter().cloned());
                return Ok(ParsedArgs { old_path, new_path, log_path, launch_args });
            }
            "--args" => {
                let value = rest
                    .get(i + 1)
                    .ok_or_else(|| "--args requires a value".to_string())?;
                let parsed = split_args_string(value)
                    .map_err(|e| format!("invalid --args: {e}"))?;
                launch_args.extend(parsed);
                i += 2;
            }
            other => return Err(format!("unknown token: {other}")),
        }
    }

    Ok(ParsedArgs { old_path, new_path, log_path, launch_args })
}

/// Split a shell-ish argument string: whitespace-separated tokens with
/// double-quoted substrings and backslash escapes inside them. Deliberately
/// minimal and deterministic, not a full shell parser.
pub fn split_args_string(s: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        if in_quotes && ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if !in_quotes && (ch == ' ' || ch == '\t' || ch == '\n') {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(ch);
    }

    if escaped {
        return Err("dangling escape".to_string());
    }
    if in_quotes {
        return Err("unterminated quote".to_string());
    }
    if !current.is_empty() {
        out.push(current);
    }
    Ok(out)
}
