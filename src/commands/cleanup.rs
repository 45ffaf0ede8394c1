use anyhow::{bail, Result};
use colored::Colorize;
use request_history::retention::start_cleanup_task;
use request_history::{RequestHistory, Settings};
use std::time::Duration;
use tracing::info;

/// Execute the cleanup command
///
/// Without `--watch` purges once; with it, runs the periodic cleanup task
/// until Ctrl-C.
pub async fn execute(
    history: &RequestHistory,
    settings: &Settings,
    max_age_days: Option<u32>,
    watch: bool,
) -> Result<()> {
    let Some(max_age_days) = max_age_days.or(settings.retention.max_age_days) else {
        bail!("No retention age configured, pass --max-age-days or set retention.max_age_days");
    };
    if max_age_days == 0 {
        bail!("--max-age-days must be greater than 0");
    }

    if !watch {
        let removed = history.retention.purge_older_than(max_age_days).await;
        println!(
            "{} {} record(s) older than {} day(s)",
            "✓ Purged".green(),
            removed,
            max_age_days
        );
        return Ok(());
    }

    let every = Duration::from_secs(settings.retention.cleanup_interval_secs);
    info!(
        max_age_days = max_age_days,
        interval_secs = every.as_secs(),
        "Starting request history cleanup task"
    );

    let handle = start_cleanup_task(history.retention.clone(), max_age_days, every);
    tokio::signal::ctrl_c().await?;
    handle.abort();

    info!("Cleanup task stopped");
    Ok(())
}
