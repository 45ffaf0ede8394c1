//! Command implementations for the CLI
//!
//! - records: list / show / delete / clear
//! - stats: per-owner aggregates
//! - config: show / set runtime configuration
//! - cleanup: age-based retention

pub mod cleanup;
pub mod config;
pub mod records;
pub mod stats;

/// Epoch milliseconds `hours` ago
pub fn hours_ago(hours: u32) -> i64 {
    (chrono::Utc::now() - chrono::Duration::hours(i64::from(hours))).timestamp_millis()
}

/// Render epoch milliseconds as local time for tables
pub fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| millis.to_string())
}
