//! Small string helpers used by the transfer and updater services.

use crate::core::{Result, UpdraftError};

/// Parse a percentage token like `42.0%` (the trailing token of curl's
/// progress bar) into a float.
pub fn parse_percentage(input: &str) -> Result<f64> {
    let trimmed = input.trim().trim_end_matches('%');
    trimmed.parse::<f64>().map_err(|e| UpdraftError::InputRejected {
        reason: format!("invalid number {trimmed:?}: {e}"),
    })
}

/// Derive an output file name from a URL: the percent-decoded base name of
/// its path.
pub fn filename_from_url(input: &str) -> Result<String> {
    let url = url::Url::parse(input).map_err(|e| UpdraftError::InputRejected {
        reason: format!("invalid url {input:?}: {e}"),
    })?;

    let name = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .unwrap_or_default();

    let decoded = percent_decode(name);
    if decoded.is_empty() {
        return Err(UpdraftError::InputRejected {
            reason: format!("url {input:?} has no file name"),
        });
    }
    Ok(decoded)
}

/// Minimal percent-decoding; invalid escapes pass through verbatim.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
