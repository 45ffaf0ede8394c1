//! SQLite backend for request history
//!
//! - WAL journal so the admin CLI can read while a service writes
//! - Busy timeout and pool acquire timeout bound every call
//! - Upserts keep the autoincrement `id`, which doubles as insertion order

use async_trait::async_trait;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::{HistoryFilter, HistoryStats, HistoryStore, ModelStats, PurgeFilter};
use crate::config::DatabaseSettings;
use crate::error::StoreError;
use crate::record::{HistoryRecord, RecordStatus, TokenCounts};

const RECORD_COLUMNS: &str = "request_id, owner_key, owner_name, model, endpoint, stream, status, \
     request_body, response_body, headers, start_time, end_time, status_code, \
     input_tokens, output_tokens, cache_create_tokens, cache_read_tokens, total_tokens, error";

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    request_id: String,
    owner_key: Option<String>,
    owner_name: Option<String>,
    model: String,
    endpoint: Option<String>,
    stream: bool,
    status: String,
    request_body: String,
    response_body: Option<String>,
    headers: String,
    start_time: i64,
    end_time: Option<i64>,
    status_code: Option<i64>,
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    cache_create_tokens: Option<i64>,
    cache_read_tokens: Option<i64>,
    total_tokens: Option<i64>,
    error: Option<String>,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let status = RecordStatus::from_str(&row.status).map_err(StoreError::InvalidData)?;

        let status_code = row
            .status_code
            .map(|code| {
                u16::try_from(code)
                    .map_err(|_| StoreError::InvalidData(format!("status code out of range: {}", code)))
            })
            .transpose()?;

        let tokens = row.total_tokens.map(|total| TokenCounts {
            input_tokens: row.input_tokens.unwrap_or(0),
            output_tokens: row.output_tokens.unwrap_or(0),
            cache_create_tokens: row.cache_create_tokens.unwrap_or(0),
            cache_read_tokens: row.cache_read_tokens.unwrap_or(0),
            total_tokens: total,
        });

        Ok(HistoryRecord {
            request_id: row.request_id,
            owner_key: row.owner_key,
            owner_name: row.owner_name,
            model: row.model,
            endpoint: row.endpoint,
            stream: row.stream,
            status,
            request_body: serde_json::from_str(&row.request_body)?,
            response_body: row
                .response_body
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            headers: serde_json::from_str(&row.headers)?,
            start_time: row.start_time,
            end_time: row.end_time,
            status_code,
            tokens,
            error: row.error,
        })
    }
}

/// History store backed by a SQLite connection pool
#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Open (or create) a database file and run migrations
    pub async fn connect(path: &str, settings: &DatabaseSettings) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(settings.busy_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .connect_with(options)
            .await?;

        tracing::info!(database = %path, "Request history database opened");
        Self::from_pool(pool).await
    }

    /// Private in-memory database; a single never-recycled connection keeps it alive
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and run migrations
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!("Request history migrations completed");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Append ` AND ...` conditions shared by stats queries
fn push_owner_scope(
    qb: &mut QueryBuilder<'_, Sqlite>,
    owner_key: &str,
    start_time: Option<i64>,
    end_time: Option<i64>,
) {
    qb.push(" WHERE owner_key = ").push_bind(owner_key.to_string());
    if let Some(start) = start_time {
        qb.push(" AND start_time >= ").push_bind(start);
    }
    if let Some(end) = end_time {
        qb.push(" AND start_time <= ").push_bind(end);
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn config_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM history_config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn config_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO history_config (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_record(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        let request_body = serde_json::to_string(&record.request_body)?;
        let response_body = record
            .response_body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let headers = serde_json::to_string(&record.headers)?;
        let tokens = record.tokens;

        sqlx::query(
            r#"
            INSERT INTO request_history (
                request_id, owner_key, owner_name, model, endpoint, stream, status,
                request_body, response_body, headers, start_time, end_time, duration_ms,
                status_code, input_tokens, output_tokens, cache_create_tokens,
                cache_read_tokens, total_tokens, error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            ON CONFLICT(request_id) DO UPDATE SET
                owner_key = excluded.owner_key,
                owner_name = excluded.owner_name,
                model = excluded.model,
                endpoint = excluded.endpoint,
                stream = excluded.stream,
                status = excluded.status,
                request_body = excluded.request_body,
                response_body = excluded.response_body,
                headers = excluded.headers,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                duration_ms = excluded.duration_ms,
                status_code = excluded.status_code,
                input_tokens = excluded.input_tokens,
                output_tokens = excluded.output_tokens,
                cache_create_tokens = excluded.cache_create_tokens,
                cache_read_tokens = excluded.cache_read_tokens,
                total_tokens = excluded.total_tokens,
                error = excluded.error
            "#,
        )
        .bind(&record.request_id)
        .bind(&record.owner_key)
        .bind(&record.owner_name)
        .bind(&record.model)
        .bind(&record.endpoint)
        .bind(record.stream)
        .bind(record.status.as_str())
        .bind(request_body)
        .bind(response_body)
        .bind(headers)
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.duration_ms())
        .bind(record.status_code.map(i64::from))
        .bind(tokens.map(|t| t.input_tokens))
        .bind(tokens.map(|t| t.output_tokens))
        .bind(tokens.map(|t| t.cache_create_tokens))
        .bind(tokens.map(|t| t.cache_read_tokens))
        .bind(tokens.map(|t| t.total_tokens))
        .bind(&record.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_record(&self, request_id: &str) -> Result<Option<HistoryRecord>, StoreError> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {} FROM request_history WHERE request_id = ?",
            RECORD_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(HistoryRecord::try_from).transpose()
    }

    async fn delete_record(&self, request_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM request_history WHERE request_id = ?")
            .bind(request_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_records(&self, filter: &HistoryFilter) -> Result<Vec<HistoryRecord>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM request_history WHERE 1=1",
            RECORD_COLUMNS
        ));

        if let Some(owner) = &filter.owner_key {
            qb.push(" AND owner_key = ").push_bind(owner.clone());
        }
        if let Some(model) = &filter.model {
            qb.push(" AND model = ").push_bind(model.clone());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(start) = filter.start_time {
            qb.push(" AND start_time >= ").push_bind(start);
        }
        if let Some(end) = filter.end_time {
            qb.push(" AND start_time <= ").push_bind(end);
        }

        qb.push(" ORDER BY start_time DESC, id DESC LIMIT ")
            .push_bind(i64::from(filter.effective_limit()))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.effective_offset()));

        let rows = qb
            .build_query_as::<HistoryRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(HistoryRecord::try_from).collect()
    }

    async fn count_records(&self, owner_key: &str) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM request_history WHERE owner_key = ?",
        )
        .bind(owner_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn trim_oldest(&self, owner_key: &str, n: u64) -> Result<u64, StoreError> {
        if n == 0 {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            DELETE FROM request_history WHERE id IN (
                SELECT id FROM request_history
                WHERE owner_key = ?
                ORDER BY start_time ASC, id ASC
                LIMIT ?
            )
            "#,
        )
        .bind(owner_key)
        .bind(i64::try_from(n).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn aggregate_stats(
        &self,
        owner_key: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<HistoryStats, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                COUNT(*) AS total_requests,
                COUNT(CASE WHEN status = 'success' THEN 1 END) AS success_count,
                COUNT(CASE WHEN status = 'error' THEN 1 END) AS error_count,
                COUNT(CASE WHEN status = 'pending' THEN 1 END) AS pending_count,
                COALESCE(SUM(total_tokens), 0) AS total_tokens,
                CAST(COALESCE(AVG(duration_ms), 0) AS REAL) AS avg_duration_ms
            FROM request_history
            "#,
        );
        push_owner_scope(&mut qb, owner_key, start_time, end_time);
        let totals = qb.build().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                model,
                COUNT(*) AS count,
                COALESCE(SUM(total_tokens), 0) AS total_tokens,
                CAST(COALESCE(AVG(duration_ms), 0) AS REAL) AS avg_duration_ms
            FROM request_history
            "#,
        );
        push_owner_scope(&mut qb, owner_key, start_time, end_time);
        qb.push(" GROUP BY model ORDER BY count DESC, model ASC");
        let model_rows = qb.build().fetch_all(&self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT status, COUNT(*) AS count FROM request_history");
        push_owner_scope(&mut qb, owner_key, start_time, end_time);
        qb.push(" GROUP BY status");
        let status_rows = qb.build().fetch_all(&self.pool).await?;

        let by_model = model_rows
            .iter()
            .map(|row| {
                Ok(ModelStats {
                    model: row.try_get("model")?,
                    count: row.try_get::<i64, _>("count")?.max(0) as u64,
                    total_tokens: row.try_get("total_tokens")?,
                    avg_duration_ms: row.try_get("avg_duration_ms")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let by_status = status_rows
            .iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("status")?,
                    row.try_get::<i64, _>("count")?.max(0) as u64,
                ))
            })
            .collect::<Result<BTreeMap<_, _>, sqlx::Error>>()?;

        Ok(HistoryStats {
            total_requests: totals.try_get::<i64, _>("total_requests")?.max(0) as u64,
            success_count: totals.try_get::<i64, _>("success_count")?.max(0) as u64,
            error_count: totals.try_get::<i64, _>("error_count")?.max(0) as u64,
            pending_count: totals.try_get::<i64, _>("pending_count")?.max(0) as u64,
            total_tokens: totals.try_get("total_tokens")?,
            avg_duration_ms: totals.try_get("avg_duration_ms")?,
            by_model,
            by_status,
        })
    }

    async fn purge(&self, filter: &PurgeFilter) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM request_history WHERE 1=1");
        if let Some(owner) = &filter.owner_key {
            qb.push(" AND owner_key = ").push_bind(owner.clone());
        }
        if let Some(before) = filter.before {
            qb.push(" AND start_time < ").push_bind(before);
        }

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Outcome;
    use serde_json::json;
    use std::collections::HashMap;

    fn record(id: &str, owner: &str, model: &str, start: i64) -> HistoryRecord {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        HistoryRecord::pending(
            id.to_string(),
            Some(owner.to_string()),
            Some("team".to_string()),
            model.to_string(),
            Some("/v1/messages".to_string()),
            true,
            json!({"model": model, "messages": []}),
            headers,
            start,
        )
    }

    #[tokio::test]
    async fn test_record_round_trip() {
        let store = SqliteHistoryStore::in_memory().await.unwrap();
        let pending = record("req-1", "k1", "claude-sonnet", 1_000);
        store.put_record(&pending).await.unwrap();

        let fetched = store.get_record("req-1").await.unwrap().unwrap();
        assert_eq!(fetched, pending);

        let done = fetched
            .finish(
                Outcome::Success {
                    status_code: 200,
                    response_body: json!({"id": "msg_1"}),
                    tokens: TokenCounts::new(10, 5, 0, 2),
                },
                1_400,
            )
            .unwrap();
        store.put_record(&done).await.unwrap();

        let fetched = store.get_record("req-1").await.unwrap().unwrap();
        assert_eq!(fetched, done);
        assert_eq!(fetched.duration_ms(), Some(400));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = SqliteHistoryStore::in_memory().await.unwrap();
        assert!(store.get_record("nope").await.unwrap().is_none());
        assert!(!store.delete_record("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_keeps_insertion_order() {
        let store = SqliteHistoryStore::in_memory().await.unwrap();
        store.put_record(&record("a", "k1", "m", 10)).await.unwrap();
        store.put_record(&record("b", "k1", "m", 10)).await.unwrap();
        // rewrite "a" after "b" was inserted
        store.put_record(&record("a", "k1", "m2", 10)).await.unwrap();

        assert_eq!(store.trim_oldest("k1", 1).await.unwrap(), 1);
        assert!(store.get_record("a").await.unwrap().is_none());
        assert!(store.get_record("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = SqliteHistoryStore::in_memory().await.unwrap();
        store.put_record(&record("a", "k1", "sonnet", 10)).await.unwrap();
        store.put_record(&record("b", "k1", "haiku", 20)).await.unwrap();
        store.put_record(&record("c", "k2", "sonnet", 30)).await.unwrap();

        let all = store.list_records(&HistoryFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.request_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        let filter = HistoryFilter {
            model: Some("sonnet".to_string()),
            ..HistoryFilter::for_owner("k1")
        };
        let matched = store.list_records(&filter).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].request_id, "a");

        let filter = HistoryFilter {
            status: Some(RecordStatus::Pending),
            start_time: Some(15),
            ..Default::default()
        };
        assert_eq!(store.list_records(&filter).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_aggregate_stats() {
        let store = SqliteHistoryStore::in_memory().await.unwrap();

        let ok = record("a", "k1", "sonnet", 100)
            .finish(
                Outcome::Success {
                    status_code: 200,
                    response_body: json!({}),
                    tokens: TokenCounts::new(10, 20, 5, 5),
                },
                300,
            )
            .unwrap();
        let failed = record("b", "k1", "haiku", 100)
            .finish(
                Outcome::Error {
                    status_code: 500,
                    message: "Unknown error".to_string(),
                },
                200,
            )
            .unwrap();
        store.put_record(&ok).await.unwrap();
        store.put_record(&failed).await.unwrap();
        store.put_record(&record("c", "k1", "sonnet", 500)).await.unwrap();
        store.put_record(&record("d", "k2", "sonnet", 100)).await.unwrap();

        let stats = store.aggregate_stats("k1", None, None).await.unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.total_tokens, 40);
        assert_eq!(stats.avg_duration_ms, 150.0);
        assert_eq!(stats.by_model[0].model, "sonnet");
        assert_eq!(stats.by_model[0].count, 2);
        assert_eq!(stats.by_status["error"], 1);

        let windowed = store.aggregate_stats("k1", Some(400), None).await.unwrap();
        assert_eq!(windowed.total_requests, 1);
        assert_eq!(windowed.avg_duration_ms, 0.0);

        let empty = store.aggregate_stats("nobody", None, None).await.unwrap();
        assert_eq!(empty, HistoryStats::default());
    }

    #[tokio::test]
    async fn test_config_blob_upsert() {
        let store = SqliteHistoryStore::in_memory().await.unwrap();
        assert!(store.config_get("cfg").await.unwrap().is_none());
        store.config_set("cfg", "{\"a\":1}").await.unwrap();
        store.config_set("cfg", "{\"a\":2}").await.unwrap();
        assert_eq!(store.config_get("cfg").await.unwrap().as_deref(), Some("{\"a\":2}"));
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        let path = path.to_str().unwrap();

        let store = SqliteHistoryStore::connect(path, &DatabaseSettings::default())
            .await
            .unwrap();
        store.put_record(&record("a", "k1", "m", 1)).await.unwrap();
        store.close().await;

        let reopened = SqliteHistoryStore::connect(path, &DatabaseSettings::default())
            .await
            .unwrap();
        assert_eq!(reopened.count_records("k1").await.unwrap(), 1);
    }
}
