//! Storage contract for request history
//!
//! The recorder, retention enforcer and query service only talk to a
//! [`HistoryStore`]. Two backends ship with the crate:
//! - [`SqliteHistoryStore`]: sqlx + SQLite, used by the admin binary
//! - [`MemoryHistoryStore`]: lock-free in-process map, used by tests and embedders

pub mod memory;
pub mod sqlite;

pub use memory::MemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::record::{HistoryRecord, RecordStatus};

/// Default page size for listings
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Upper bound for a single listing page
pub const MAX_LIST_LIMIT: u32 = 500;

/// Filter for record listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilter {
    pub owner_key: Option<String>,
    pub model: Option<String>,
    pub status: Option<RecordStatus>,
    /// Inclusive lower bound on start time (epoch ms)
    pub start_time: Option<i64>,
    /// Inclusive upper bound on start time (epoch ms)
    pub end_time: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl HistoryFilter {
    pub fn for_owner(owner_key: impl Into<String>) -> Self {
        Self {
            owner_key: Some(owner_key.into()),
            ..Default::default()
        }
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Whether a record passes every condition except pagination
    pub fn matches(&self, record: &HistoryRecord) -> bool {
        if let Some(owner) = &self.owner_key {
            if record.owner_key.as_deref() != Some(owner.as_str()) {
                return false;
            }
        }
        if let Some(model) = &self.model {
            if &record.model != model {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if record.start_time < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if record.start_time > end {
                return false;
            }
        }
        true
    }
}

/// Selection for bulk deletion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeFilter {
    pub owner_key: Option<String>,
    /// Delete records that started strictly before this time (epoch ms)
    pub before: Option<i64>,
}

/// Per-model aggregate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    pub model: String,
    pub count: u64,
    pub total_tokens: i64,
    pub avg_duration_ms: f64,
}

/// Aggregate statistics for one owner key
///
/// `Default` is the zeroed shape returned when aggregation fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub pending_count: u64,
    pub total_tokens: i64,
    /// Average over finished records only
    pub avg_duration_ms: f64,
    /// Sorted by request count, descending
    pub by_model: Vec<ModelStats>,
    pub by_status: BTreeMap<String, u64>,
}

impl HistoryStats {
    /// Aggregate in process, for backends without a query engine
    pub fn accumulate(records: impl IntoIterator<Item = HistoryRecord>) -> Self {
        let mut acc = StatsAccumulator::default();
        for record in records {
            acc.push(&record);
        }
        acc.finish()
    }
}

#[derive(Default)]
struct DurationSum {
    total: i64,
    count: u64,
}

impl DurationSum {
    fn push(&mut self, duration: Option<i64>) {
        if let Some(d) = duration {
            self.total += d;
            self.count += 1;
        }
    }

    fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total as f64 / self.count as f64
        }
    }
}

/// Running totals behind [`HistoryStats::accumulate`]
#[derive(Default)]
pub struct StatsAccumulator {
    stats: HistoryStats,
    durations: DurationSum,
    models: BTreeMap<String, (ModelStats, DurationSum)>,
}

impl StatsAccumulator {
    pub fn push(&mut self, record: &HistoryRecord) {
        let tokens = record.tokens.map(|t| t.total_tokens).unwrap_or(0);
        let duration = record.duration_ms();

        self.stats.total_requests += 1;
        match record.status {
            RecordStatus::Pending => self.stats.pending_count += 1,
            RecordStatus::Success => self.stats.success_count += 1,
            RecordStatus::Error => self.stats.error_count += 1,
        }
        self.stats.total_tokens = self.stats.total_tokens.saturating_add(tokens);
        self.durations.push(duration);
        *self
            .stats
            .by_status
            .entry(record.status.as_str().to_string())
            .or_insert(0) += 1;

        let (model, model_durations) = self
            .models
            .entry(record.model.clone())
            .or_insert_with(|| {
                (
                    ModelStats {
                        model: record.model.clone(),
                        ..Default::default()
                    },
                    DurationSum::default(),
                )
            });
        model.count += 1;
        model.total_tokens = model.total_tokens.saturating_add(tokens);
        model_durations.push(duration);
    }

    pub fn finish(mut self) -> HistoryStats {
        self.stats.avg_duration_ms = self.durations.average();

        let mut by_model: Vec<ModelStats> = self
            .models
            .into_values()
            .map(|(mut model, durations)| {
                model.avg_duration_ms = durations.average();
                model
            })
            .collect();
        by_model.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.model.cmp(&b.model)));
        self.stats.by_model = by_model;

        self.stats
    }
}

/// Key-value style storage consumed by the history services.
///
/// Implementations bound their own call latency (pool acquire timeouts, busy
/// timeouts); the services never retry.
#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    /// Read a configuration blob
    async fn config_get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a configuration blob (upsert)
    async fn config_set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Insert or overwrite a record by `request_id`.
    ///
    /// Overwriting keeps the record's original insertion position.
    async fn put_record(&self, record: &HistoryRecord) -> Result<(), StoreError>;

    async fn get_record(&self, request_id: &str) -> Result<Option<HistoryRecord>, StoreError>;

    /// Returns whether a record was removed
    async fn delete_record(&self, request_id: &str) -> Result<bool, StoreError>;

    /// Filtered listing, newest first
    async fn list_records(&self, filter: &HistoryFilter) -> Result<Vec<HistoryRecord>, StoreError>;

    async fn count_records(&self, owner_key: &str) -> Result<u64, StoreError>;

    /// Remove the `n` oldest records of an owner (by start time, then insertion order)
    async fn trim_oldest(&self, owner_key: &str, n: u64) -> Result<u64, StoreError>;

    /// Aggregate statistics for one owner, optionally bounded by start time
    async fn aggregate_stats(
        &self,
        owner_key: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<HistoryStats, StoreError>;

    /// Bulk delete; returns the number of removed records
    async fn purge(&self, filter: &PurgeFilter) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Outcome, TokenCounts};
    use std::collections::HashMap;

    fn record(id: &str, model: &str, start: i64) -> HistoryRecord {
        HistoryRecord::pending(
            id.to_string(),
            Some("owner".to_string()),
            None,
            model.to_string(),
            None,
            false,
            serde_json::Value::Null,
            HashMap::new(),
            start,
        )
    }

    #[test]
    fn test_effective_limit_clamped() {
        assert_eq!(HistoryFilter::default().effective_limit(), DEFAULT_LIST_LIMIT);
        let filter = HistoryFilter {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(filter.effective_limit(), MAX_LIST_LIMIT);
        let filter = HistoryFilter {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(filter.effective_limit(), 1);
    }

    #[test]
    fn test_filter_matches() {
        let r = record("a", "sonnet", 100);
        assert!(HistoryFilter::for_owner("owner").matches(&r));
        assert!(!HistoryFilter::for_owner("other").matches(&r));

        let filter = HistoryFilter {
            status: Some(RecordStatus::Success),
            ..Default::default()
        };
        assert!(!filter.matches(&r));

        let filter = HistoryFilter {
            start_time: Some(50),
            end_time: Some(100),
            ..Default::default()
        };
        assert!(filter.matches(&r));
    }

    #[test]
    fn test_accumulate_stats() {
        let ok = record("a", "sonnet", 100)
            .finish(
                Outcome::Success {
                    status_code: 200,
                    response_body: serde_json::Value::Null,
                    tokens: TokenCounts::new(10, 20, 0, 0),
                },
                300,
            )
            .unwrap();
        let failed = record("b", "haiku", 100)
            .finish(
                Outcome::Error {
                    status_code: 500,
                    message: "boom".to_string(),
                },
                200,
            )
            .unwrap();
        let pending = record("c", "sonnet", 100);

        let stats = HistoryStats::accumulate(vec![ok, failed, pending]);

        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.total_tokens, 30);
        assert_eq!(stats.avg_duration_ms, 150.0);
        assert_eq!(stats.by_model[0].model, "sonnet");
        assert_eq!(stats.by_model[0].count, 2);
        assert_eq!(stats.by_model[0].avg_duration_ms, 200.0);
        assert_eq!(stats.by_status["pending"], 1);
    }

    #[test]
    fn test_zeroed_stats_shape() {
        let stats = HistoryStats::default();
        assert_eq!(stats.total_requests, 0);
        assert!(stats.by_model.is_empty());
        assert!(stats.by_status.is_empty());
    }
}
