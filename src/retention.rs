//! Retention for request history
//!
//! Two mechanisms:
//! - per-owner count cap, enforced lazily after each new record with a
//!   hysteresis buffer so trimming runs in batches rather than on every insert
//! - optional age-based purge, run periodically by a background task

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::config_store::ConfigStore;
use crate::redaction::SensitiveApiKey;
use crate::store::{HistoryStore, PurgeFilter};

/// Records tolerated above `maxRecordsPerKey` before a trim runs
pub const RETENTION_BUFFER: u64 = 100;

#[derive(Clone)]
pub struct RetentionEnforcer {
    store: Arc<dyn HistoryStore>,
    config: Arc<ConfigStore>,
}

impl RetentionEnforcer {
    pub fn new(store: Arc<dyn HistoryStore>, config: Arc<ConfigStore>) -> Self {
        Self { store, config }
    }

    /// Trim an owner back to `maxRecordsPerKey` once it exceeds the cap plus buffer.
    ///
    /// Returns the number of records removed; failures are logged and count as 0.
    /// The count may be stale by the time the trim runs, so the cap is approximate.
    pub async fn enforce(&self, owner_key: &str) -> u64 {
        let max_records = self.config.current().max_records_per_key;
        let threshold = max_records.saturating_add(RETENTION_BUFFER);

        let count = match self.store.count_records(owner_key).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(
                    owner = %SensitiveApiKey::new(owner_key),
                    error = %e,
                    "Failed to count request history records"
                );
                return 0;
            }
        };

        if count <= threshold {
            return 0;
        }

        let excess = count - max_records;
        match self.store.trim_oldest(owner_key, excess).await {
            Ok(removed) => {
                tracing::info!(
                    owner = %SensitiveApiKey::new(owner_key),
                    count = count,
                    removed = removed,
                    max_records = max_records,
                    "Trimmed request history"
                );
                removed
            }
            Err(e) => {
                tracing::error!(
                    owner = %SensitiveApiKey::new(owner_key),
                    excess = excess,
                    error = %e,
                    "Failed to trim request history"
                );
                0
            }
        }
    }

    /// Delete every record that started more than `max_age_days` ago
    pub async fn purge_older_than(&self, max_age_days: u32) -> u64 {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(max_age_days));
        let filter = PurgeFilter {
            owner_key: None,
            before: Some(cutoff.timestamp_millis()),
        };

        match self.store.purge(&filter).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!(
                        removed = removed,
                        max_age_days = max_age_days,
                        "Purged expired request history"
                    );
                }
                removed
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to purge expired request history");
                0
            }
        }
    }
}

/// Start the age-based cleanup task
///
/// Runs once immediately, then every `every`.
pub fn start_cleanup_task(
    enforcer: RetentionEnforcer,
    max_age_days: u32,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(every);

        loop {
            interval.tick().await;
            tracing::debug!(max_age_days = max_age_days, "Running request history cleanup");
            enforcer.purge_older_than(max_age_days).await;
        }
    })
}
