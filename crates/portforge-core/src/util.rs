use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock stamp for journal and channel records, as seconds since the
/// Unix epoch.
pub fn unix_stamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("[{secs}]")
}
