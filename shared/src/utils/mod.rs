//! Utility functions and helpers

pub mod time;

use anyhow::Result;

/// Parse a duration string (e.g., "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> Result<std::time::Duration> {
    let s = s.trim();

    let (num_str, unit_secs) = if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else {
        // Default to seconds if no suffix
        (s, 1)
    };

    let n: u64 = num_str.parse()?;
    let secs = n
        .checked_mul(unit_secs)
        .ok_or_else(|| anyhow::anyhow!("duration {:?} is too large", s))?;
    Ok(std::time::Duration::from_secs(secs))
}

/// Base name of a path-like program name, as used for argv[0] dispatch.
///
/// Trailing separators are ignored; an empty input yields an empty name.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "" } else { "/" };
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
