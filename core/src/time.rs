use chrono::DateTime;

/// Render an epoch timestamp as `YYYY-MM-DD HH:MM:SS UTC`.
///
/// Out-of-range timestamps fall back to the raw number.
pub fn format_utc(epoch_secs: f64) -> String {
    let secs = epoch_secs.floor();
    let nanos = ((epoch_secs - secs) * 1e9) as u32;
    match DateTime::from_timestamp(secs as i64, nanos) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{epoch_secs}"),
    }
}
