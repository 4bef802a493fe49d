use std::time::Duration;

use super::types::Limits;

pub const DEFAULT_MAX_RECORDS: usize = 1000;

pub fn effective_limit(requested: Option<usize>, max_records: usize) -> Limits {
    let max_records = requested
        .unwrap_or(DEFAULT_MAX_RECORDS)
        .min(max_records)
        .max(1);
    Limits { max_records }
}

/// Command timeout in seconds to a deadline. Zero waits indefinitely.
pub fn command_timeout(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}
