use async_trait::async_trait;
use request_history::store::PurgeFilter;
use request_history::{
    ErrorData, HistoryConfig, HistoryFilter, HistoryRecord, HistoryStats, HistoryStore,
    RequestHistory, RequestStart, ResponseData, StoreError,
};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Store whose every operation fails, as if the backend were unreachable
struct FailingStore;

fn unavailable<T>() -> Result<T, StoreError> {
    Err(StoreError::InvalidData("backend unavailable".to_string()))
}

#[async_trait]
impl HistoryStore for FailingStore {
    async fn config_get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        unavailable()
    }

    async fn config_set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        unavailable()
    }

    async fn put_record(&self, _record: &HistoryRecord) -> Result<(), StoreError> {
        unavailable()
    }

    async fn get_record(&self, _request_id: &str) -> Result<Option<HistoryRecord>, StoreError> {
        unavailable()
    }

    async fn delete_record(&self, _request_id: &str) -> Result<bool, StoreError> {
        unavailable()
    }

    async fn list_records(&self, _filter: &HistoryFilter) -> Result<Vec<HistoryRecord>, StoreError> {
        unavailable()
    }

    async fn count_records(&self, _owner_key: &str) -> Result<u64, StoreError> {
        unavailable()
    }

    async fn trim_oldest(&self, _owner_key: &str, _n: u64) -> Result<u64, StoreError> {
        unavailable()
    }

    async fn aggregate_stats(
        &self,
        _owner_key: &str,
        _start_time: Option<i64>,
        _end_time: Option<i64>,
    ) -> Result<HistoryStats, StoreError> {
        unavailable()
    }

    async fn purge(&self, _filter: &PurgeFilter) -> Result<u64, StoreError> {
        unavailable()
    }
}

async fn failing_history() -> RequestHistory {
    RequestHistory::new(Arc::new(FailingStore)).await
}

#[tokio::test]
async fn test_config_falls_back_to_defaults() {
    let history = failing_history().await;
    assert_eq!(*history.config.current(), HistoryConfig::default());
}

#[tokio::test]
async fn test_recorder_never_raises() {
    let history = failing_history().await;

    let request = RequestStart {
        owner_key: Some("cr_owner".to_string()),
        ..Default::default()
    };
    assert!(history.recorder.start(request).await.is_none());
    assert!(!history.recorder.complete("req-1", ResponseData::default()).await);
    assert!(!history.recorder.fail("req-1", ErrorData::default()).await);
}

#[tokio::test]
async fn test_queries_return_safe_defaults() {
    let history = failing_history().await;

    assert!(history.query.list(&HistoryFilter::default()).await.is_empty());
    assert!(history.query.get("req-1").await.is_none());
    assert!(!history.query.delete("req-1").await);
    assert_eq!(history.query.clear(None, None).await, 0);

    let stats = history.query.stats("cr_owner", None, None).await;
    assert_eq!(stats, HistoryStats::default());
    assert_eq!(stats.total_requests, 0);
    assert_eq!(stats.avg_duration_ms, 0.0);
    assert!(stats.by_model.is_empty());
}

#[tokio::test]
async fn test_retention_swallows_errors() {
    let history = failing_history().await;

    assert_eq!(history.retention.enforce("cr_owner").await, 0);
    assert_eq!(history.retention.purge_older_than(30).await, 0);
}

#[tokio::test]
async fn test_config_update_applies_in_memory_when_persist_fails() {
    let history = failing_history().await;

    let patch = request_history::ConfigPatch {
        max_records_per_key: Some(10),
        ..Default::default()
    };
    assert!(!history.config.update(patch).await);
    assert_eq!(history.config.current().max_records_per_key, 10);
}

/// Collects formatted log output for assertions
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_get_store_failure_is_not_reported_as_missing() {
    let history = failing_history().await;

    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    assert!(history.query.get("req-1").await.is_none());

    let output = logs.contents();
    assert!(output.contains("History store operation failed"));
    assert!(!output.contains("not found"));
}
