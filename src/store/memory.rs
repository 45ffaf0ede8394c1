use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{HistoryFilter, HistoryStats, HistoryStore, PurgeFilter};
use crate::error::StoreError;
use crate::record::HistoryRecord;

struct Entry {
    seq: u64,
    record: HistoryRecord,
}

/// In-process history store
///
/// Per-key writes are serialized by the map's shard locks; nothing is
/// atomic across operations, same as the SQLite backend.
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: DashMap<String, Entry>,
    config: DashMap<String, String>,
    next_seq: AtomicU64,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of `(seq, record)` pairs matching a predicate
    fn collect<F>(&self, predicate: F) -> Vec<(u64, HistoryRecord)>
    where
        F: Fn(&HistoryRecord) -> bool,
    {
        self.records
            .iter()
            .filter(|entry| predicate(&entry.record))
            .map(|entry| (entry.seq, entry.record.clone()))
            .collect()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn config_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.config.get(key).map(|v| v.value().clone()))
    }

    async fn config_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.config.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn put_record(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        self.records
            .entry(record.request_id.clone())
            .and_modify(|entry| entry.record = record.clone())
            .or_insert_with(|| Entry {
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                record: record.clone(),
            });
        Ok(())
    }

    async fn get_record(&self, request_id: &str) -> Result<Option<HistoryRecord>, StoreError> {
        Ok(self.records.get(request_id).map(|entry| entry.record.clone()))
    }

    async fn delete_record(&self, request_id: &str) -> Result<bool, StoreError> {
        Ok(self.records.remove(request_id).is_some())
    }

    async fn list_records(&self, filter: &HistoryFilter) -> Result<Vec<HistoryRecord>, StoreError> {
        let mut matched = self.collect(|record| filter.matches(record));
        matched.sort_by(|(a_seq, a), (b_seq, b)| {
            b.start_time.cmp(&a.start_time).then_with(|| b_seq.cmp(a_seq))
        });

        Ok(matched
            .into_iter()
            .skip(filter.effective_offset() as usize)
            .take(filter.effective_limit() as usize)
            .map(|(_, record)| record)
            .collect())
    }

    async fn count_records(&self, owner_key: &str) -> Result<u64, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.record.owner_key.as_deref() == Some(owner_key))
            .count() as u64)
    }

    async fn trim_oldest(&self, owner_key: &str, n: u64) -> Result<u64, StoreError> {
        if n == 0 {
            return Ok(0);
        }

        let mut owned = self.collect(|record| record.owner_key.as_deref() == Some(owner_key));
        owned.sort_by(|(a_seq, a), (b_seq, b)| {
            a.start_time.cmp(&b.start_time).then_with(|| a_seq.cmp(b_seq))
        });

        let mut removed = 0;
        for (_, record) in owned.into_iter().take(n as usize) {
            if self.records.remove(&record.request_id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn aggregate_stats(
        &self,
        owner_key: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<HistoryStats, StoreError> {
        let filter = HistoryFilter {
            owner_key: Some(owner_key.to_string()),
            start_time,
            end_time,
            ..Default::default()
        };
        let records = self
            .collect(|record| filter.matches(record))
            .into_iter()
            .map(|(_, record)| record);
        Ok(HistoryStats::accumulate(records))
    }

    async fn purge(&self, filter: &PurgeFilter) -> Result<u64, StoreError> {
        let mut removed = 0u64;
        self.records.retain(|_, entry| {
            let owner_match = filter
                .owner_key
                .as_deref()
                .map_or(true, |owner| entry.record.owner_key.as_deref() == Some(owner));
            let time_match = filter
                .before
                .map_or(true, |cutoff| entry.record.start_time < cutoff);
            let remove = owner_match && time_match;
            if remove {
                removed += 1;
            }
            !remove
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(id: &str, owner: &str, start: i64) -> HistoryRecord {
        HistoryRecord::pending(
            id.to_string(),
            Some(owner.to_string()),
            None,
            "claude-sonnet".to_string(),
            None,
            false,
            serde_json::Value::Null,
            HashMap::new(),
            start,
        )
    }

    #[tokio::test]
    async fn test_put_is_upsert() {
        let store = MemoryHistoryStore::new();
        let mut r = record("a", "k1", 10);
        store.put_record(&r).await.unwrap();
        r.model = "claude-haiku".to_string();
        store.put_record(&r).await.unwrap();

        assert_eq!(store.len(), 1);
        let fetched = store.get_record("a").await.unwrap().unwrap();
        assert_eq!(fetched.model, "claude-haiku");
    }

    #[tokio::test]
    async fn test_trim_oldest_uses_insertion_order_for_ties() {
        let store = MemoryHistoryStore::new();
        for id in ["a", "b", "c", "d"] {
            store.put_record(&record(id, "k1", 10)).await.unwrap();
        }
        store.put_record(&record("other", "k2", 1)).await.unwrap();

        assert_eq!(store.trim_oldest("k1", 2).await.unwrap(), 2);
        assert!(store.get_record("a").await.unwrap().is_none());
        assert!(store.get_record("b").await.unwrap().is_none());
        assert!(store.get_record("c").await.unwrap().is_some());
        assert_eq!(store.count_records("k1").await.unwrap(), 2);
        assert_eq!(store.count_records("k2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_newest_first_with_pagination() {
        let store = MemoryHistoryStore::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            store.put_record(&record(id, "k1", i as i64)).await.unwrap();
        }

        let filter = HistoryFilter {
            limit: Some(2),
            ..HistoryFilter::for_owner("k1")
        };
        let page: Vec<String> = store
            .list_records(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.request_id)
            .collect();
        assert_eq!(page, vec!["c", "b"]);

        let filter = HistoryFilter {
            offset: Some(2),
            ..filter
        };
        assert_eq!(store.list_records(&filter).await.unwrap()[0].request_id, "a");
    }

    #[tokio::test]
    async fn test_purge_by_owner_and_time() {
        let store = MemoryHistoryStore::new();
        store.put_record(&record("old", "k1", 10)).await.unwrap();
        store.put_record(&record("new", "k1", 100)).await.unwrap();
        store.put_record(&record("other", "k2", 10)).await.unwrap();

        let removed = store
            .purge(&PurgeFilter {
                owner_key: Some("k1".to_string()),
                before: Some(50),
            })
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.get_record("new").await.unwrap().is_some());
        assert!(store.get_record("other").await.unwrap().is_some());
    }
}
