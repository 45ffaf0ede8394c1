//! History record model and its lifecycle state machine
//!
//! A record is created `Pending` and moves exactly once to `Success` or
//! `Error`. The terminal transition is the only place that fills in the
//! terminal fields (end time, status code, token counters, error message).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::TransitionError;

/// Model name stored when the caller does not resolve one
pub const UNKNOWN_MODEL: &str = "unknown";

/// Lifecycle status of a history record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Success,
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown record status: {}", other)),
        }
    }
}

/// Token usage as reported by the upstream pipeline (any counter may be missing)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub cache_create_tokens: Option<i64>,
    pub cache_read_tokens: Option<i64>,
}

/// Token counters stored on a successful record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCounts {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_create_tokens: i64,
    pub cache_read_tokens: i64,
    pub total_tokens: i64,
}

impl TokenCounts {
    /// Negative counters are clamped to 0 and the total saturates at `i64::MAX`
    pub fn new(
        input_tokens: i64,
        output_tokens: i64,
        cache_create_tokens: i64,
        cache_read_tokens: i64,
    ) -> Self {
        let input_tokens = input_tokens.max(0);
        let output_tokens = output_tokens.max(0);
        let cache_create_tokens = cache_create_tokens.max(0);
        let cache_read_tokens = cache_read_tokens.max(0);

        Self {
            input_tokens,
            output_tokens,
            cache_create_tokens,
            cache_read_tokens,
            total_tokens: input_tokens
                .saturating_add(output_tokens)
                .saturating_add(cache_create_tokens)
                .saturating_add(cache_read_tokens),
        }
    }
}

impl From<&TokenUsage> for TokenCounts {
    fn from(usage: &TokenUsage) -> Self {
        Self::new(
            usage.input_tokens.unwrap_or(0),
            usage.output_tokens.unwrap_or(0),
            usage.cache_create_tokens.unwrap_or(0),
            usage.cache_read_tokens.unwrap_or(0),
        )
    }
}

/// Terminal outcome applied by [`HistoryRecord::finish`]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        status_code: u16,
        response_body: serde_json::Value,
        tokens: TokenCounts,
    },
    Error {
        status_code: u16,
        message: String,
    },
}

/// One request's audit trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub request_id: String,
    pub owner_key: Option<String>,
    pub owner_name: Option<String>,
    pub model: String,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub stream: bool,
    pub status: RecordStatus,
    pub request_body: serde_json::Value,
    pub response_body: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Epoch milliseconds
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status_code: Option<u16>,
    pub tokens: Option<TokenCounts>,
    pub error: Option<String>,
}

impl HistoryRecord {
    /// Build a fresh `Pending` record
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        request_id: String,
        owner_key: Option<String>,
        owner_name: Option<String>,
        model: String,
        endpoint: Option<String>,
        stream: bool,
        request_body: serde_json::Value,
        headers: HashMap<String, String>,
        start_time: i64,
    ) -> Self {
        Self {
            request_id,
            owner_key,
            owner_name,
            model,
            endpoint,
            stream,
            status: RecordStatus::Pending,
            request_body,
            response_body: None,
            headers,
            start_time,
            end_time: None,
            status_code: None,
            tokens: None,
            error: None,
        }
    }

    /// Elapsed milliseconds between start and end, once terminal
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Apply the single terminal transition.
    ///
    /// `end_time` is clamped to `start_time` so the derived duration is never
    /// negative when clocks step backwards.
    pub fn finish(mut self, outcome: Outcome, now: i64) -> Result<Self, TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                request_id: self.request_id,
                status: self.status,
            });
        }

        self.end_time = Some(now.max(self.start_time));

        match outcome {
            Outcome::Success {
                status_code,
                response_body,
                tokens,
            } => {
                self.status = RecordStatus::Success;
                self.status_code = Some(status_code);
                self.response_body = Some(response_body);
                self.tokens = Some(tokens);
            }
            Outcome::Error {
                status_code,
                message,
            } => {
                self.status = RecordStatus::Error;
                self.status_code = Some(status_code);
                self.error = Some(message);
            }
        }

        Ok(self)
    }

    /// JSON view including the derived `duration` field
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.insert("duration".to_string(), serde_json::json!(self.duration_ms()));
        }
        value
    }
}
