use std::time::Duration;

/// Render a millisecond count for log lines, e.g. `1s 250ms`.
pub fn humanize_millis(ms: u64) -> String {
    humantime::format_duration(Duration::from_millis(ms)).to_string()
}
