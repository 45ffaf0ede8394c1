//! Read side of the request history

use std::sync::Arc;

use crate::error::FailOpen;
use crate::record::HistoryRecord;
use crate::store::{HistoryFilter, HistoryStats, HistoryStore, PurgeFilter};

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn HistoryStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Filtered, paginated listing (newest first); empty on store failure
    pub async fn list(&self, filter: &HistoryFilter) -> Vec<HistoryRecord> {
        self.store
            .list_records(filter)
            .await
            .or_fail_open_with("list", Vec::new)
    }

    /// Single record; `None` both when missing and on store failure
    pub async fn get(&self, request_id: &str) -> Option<HistoryRecord> {
        match self.store.get_record(request_id).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                tracing::warn!(request_id = %request_id, "Request history record not found");
                None
            }
            Err(e) => {
                tracing::error!(
                    operation = "get",
                    request_id = %request_id,
                    error = %e,
                    "History store operation failed, using fallback"
                );
                None
            }
        }
    }

    /// Aggregate statistics for an owner; zeroed on store failure
    pub async fn stats(
        &self,
        owner_key: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> HistoryStats {
        self.store
            .aggregate_stats(owner_key, start_time, end_time)
            .await
            .or_fail_open_with("stats", HistoryStats::default)
    }

    /// Delete one record; `false` when missing or on store failure
    pub async fn delete(&self, request_id: &str) -> bool {
        let deleted = self
            .store
            .delete_record(request_id)
            .await
            .or_fail_open("delete", false);

        if deleted {
            tracing::info!(request_id = %request_id, "Request history record deleted");
        } else {
            tracing::warn!(request_id = %request_id, "Request history record not deleted");
        }
        deleted
    }

    /// Bulk delete by owner and/or age; 0 on store failure
    pub async fn clear(&self, owner_key: Option<&str>, before: Option<i64>) -> u64 {
        let filter = PurgeFilter {
            owner_key: owner_key.map(str::to_string),
            before,
        };

        let removed = self.store.purge(&filter).await.or_fail_open("clear", 0);
        tracing::info!(removed = removed, "Request history cleared");
        removed
    }
}
