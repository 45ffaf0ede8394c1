//! Request lifecycle recorder
//!
//! `start` creates a `Pending` record and hands back its id; the pipeline later
//! calls exactly one of `complete` / `fail` with that id. Every call is
//! best-effort: failures are logged and never surface to the request path.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config_store::ConfigStore;
use crate::record::{HistoryRecord, Outcome, TokenCounts, TokenUsage, UNKNOWN_MODEL};
use crate::redaction::{sanitize_headers, SensitiveApiKey};
use crate::retention::RetentionEnforcer;
use crate::store::HistoryStore;
use crate::truncation::{truncate_request_body, truncate_response_body};

/// Default error message when the pipeline reports none
pub const DEFAULT_ERROR_MESSAGE: &str = "Unknown error";

/// Default status code for a failed request
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// Default status code for a successful request
pub const DEFAULT_SUCCESS_STATUS: u16 = 200;

/// Data reported when a proxied request begins
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStart {
    pub owner_key: Option<String>,
    pub owner_name: Option<String>,
    /// Resolved model; falls back to the body's `model` field
    pub model: Option<String>,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub body: serde_json::Value,
    pub headers: Option<HashMap<String, String>>,
}

/// Data reported when the upstream answered successfully
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    #[serde(default)]
    pub body: serde_json::Value,
    pub status_code: Option<u16>,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Data reported when the request failed
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub message: Option<String>,
    pub status_code: Option<u16>,
}

fn resolve_model(request: &RequestStart) -> String {
    request
        .model
        .as_deref()
        .filter(|m| !m.is_empty())
        .or_else(|| request.body.get("model").and_then(|m| m.as_str()))
        .filter(|m| !m.is_empty())
        .unwrap_or(UNKNOWN_MODEL)
        .to_string()
}

pub struct LifecycleRecorder {
    store: Arc<dyn HistoryStore>,
    config: Arc<ConfigStore>,
    retention: RetentionEnforcer,
}

impl LifecycleRecorder {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        config: Arc<ConfigStore>,
        retention: RetentionEnforcer,
    ) -> Self {
        Self {
            store,
            config,
            retention,
        }
    }

    /// Record the start of a request.
    ///
    /// Returns the new record id, or `None` when logging is disabled or the
    /// record could not be persisted (the caller must not complete it then).
    pub async fn start(&self, request: RequestStart) -> Option<String> {
        let config = self.config.current();
        if !config.logging_enabled {
            return None;
        }

        let request_id = Uuid::new_v4().to_string();
        let model = resolve_model(&request);
        let headers = sanitize_headers(request.headers.as_ref());

        let (body, truncated) = truncate_request_body(request.body, config.max_request_body_size);
        if truncated {
            tracing::debug!(
                request_id = %request_id,
                limit = config.max_request_body_size,
                "Request body truncated"
            );
        }

        let record = HistoryRecord::pending(
            request_id.clone(),
            request.owner_key,
            request.owner_name,
            model,
            request.endpoint,
            request.stream,
            body,
            headers,
            chrono::Utc::now().timestamp_millis(),
        );

        if let Err(e) = self.store.put_record(&record).await {
            tracing::error!(
                request_id = %request_id,
                error = %e,
                "Failed to create request history record"
            );
            return None;
        }

        tracing::debug!(
            request_id = %request_id,
            model = %record.model,
            owner = %SensitiveApiKey::new(record.owner_key.as_deref().unwrap_or_default()),
            "Request history record started"
        );

        if let Some(owner_key) = record.owner_key.as_deref() {
            self.retention.enforce(owner_key).await;
        }

        Some(request_id)
    }

    /// Mark a request as successful. Returns whether the record was updated.
    pub async fn complete(&self, request_id: &str, response: ResponseData) -> bool {
        let config = self.config.current();
        if !config.logging_enabled || request_id.is_empty() {
            return false;
        }

        let (response_body, truncated) =
            truncate_response_body(response.body, config.max_response_body_size);
        if truncated {
            tracing::debug!(
                request_id = %request_id,
                limit = config.max_response_body_size,
                "Response body truncated"
            );
        }

        let outcome = Outcome::Success {
            status_code: response.status_code.unwrap_or(DEFAULT_SUCCESS_STATUS),
            response_body,
            tokens: TokenCounts::from(&response.usage),
        };

        self.transition(request_id, outcome).await
    }

    /// Mark a request as failed. Returns whether the record was updated.
    pub async fn fail(&self, request_id: &str, error: ErrorData) -> bool {
        let config = self.config.current();
        if !config.logging_enabled || request_id.is_empty() {
            return false;
        }

        let outcome = Outcome::Error {
            status_code: error.status_code.unwrap_or(DEFAULT_ERROR_STATUS),
            message: error
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
        };

        self.transition(request_id, outcome).await
    }

    /// Fetch, apply the terminal transition, overwrite
    async fn transition(&self, request_id: &str, outcome: Outcome) -> bool {
        let record = match self.store.get_record(request_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(
                    request_id = %request_id,
                    "Request history record not found, skipping update"
                );
                return false;
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    error = %e,
                    "Failed to load request history record"
                );
                return false;
            }
        };

        let record = match record.finish(outcome, chrono::Utc::now().timestamp_millis()) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring terminal transition on finished record");
                return false;
            }
        };

        match self.store.put_record(&record).await {
            Ok(()) => {
                tracing::debug!(
                    request_id = %request_id,
                    status = %record.status,
                    duration_ms = record.duration_ms().unwrap_or_default(),
                    "Request history record finished"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    error = %e,
                    "Failed to update request history record"
                );
                false
            }
        }
    }
}
