//! Time-related utilities

use chrono::{DateTime, Local};

/// Timestamp layout used in profile file names, e.g. `2024-03-01-14_05_09`
pub const PROFILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H_%M_%S";

/// Format a local time for embedding in a file name
pub fn profile_timestamp(at: &DateTime<Local>) -> String {
    at.format(PROFILE_TIMESTAMP_FORMAT).to_string()
}

/// Current local time formatted for a file name
pub fn profile_timestamp_now() -> String {
    profile_timestamp(&Local::now())
}
