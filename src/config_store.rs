//! Runtime configuration backed by the history store
//!
//! The four tunables live in one JSON blob in the store. In memory they sit
//! behind an `ArcSwap` so readers on the request path take a lock-free
//! snapshot while an admin update swaps in a new value atomically.

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::config::{ConfigPatch, HistoryConfig};
use crate::store::HistoryStore;

/// Store key of the persisted configuration blob
pub const CONFIG_KEY: &str = "request_history_config";

pub struct ConfigStore {
    store: Arc<dyn HistoryStore>,
    current: ArcSwap<HistoryConfig>,
}

impl ConfigStore {
    /// Load configuration, never failing.
    ///
    /// - blob present: each field validated and merged with defaults
    /// - blob absent: defaults are persisted and returned
    /// - read or parse failure: defaults in memory only
    pub async fn load(store: Arc<dyn HistoryStore>) -> Self {
        let config = Self::read(store.as_ref()).await;
        Self {
            store,
            current: ArcSwap::from_pointee(config),
        }
    }

    async fn read(store: &dyn HistoryStore) -> HistoryConfig {
        match store.config_get(CONFIG_KEY).await {
            Ok(Some(blob)) => match serde_json::from_str::<serde_json::Value>(&blob) {
                Ok(value) => {
                    let config = HistoryConfig::from_stored(&value);
                    tracing::debug!(?config, "Loaded request history config");
                    config
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        "Failed to parse stored request history config, using defaults"
                    );
                    HistoryConfig::default()
                }
            },
            Ok(None) => {
                let config = HistoryConfig::default();
                if let Err(e) = Self::persist(store, &config).await {
                    tracing::warn!(error = %e, "Failed to persist default request history config");
                } else {
                    tracing::info!("Initialized request history config with defaults");
                }
                config
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to read request history config, using defaults"
                );
                HistoryConfig::default()
            }
        }
    }

    async fn persist(
        store: &dyn HistoryStore,
        config: &HistoryConfig,
    ) -> Result<(), crate::error::StoreError> {
        let blob = serde_json::to_string(config)?;
        store.config_set(CONFIG_KEY, &blob).await
    }

    /// Immutable snapshot of the current tunables
    pub fn current(&self) -> Arc<HistoryConfig> {
        self.current.load_full()
    }

    /// Apply the valid fields of `patch`, then persist the merged config.
    ///
    /// The in-memory value changes even if persisting fails; the return value
    /// reports whether the store accepted the write.
    pub async fn update(&self, patch: ConfigPatch) -> bool {
        let previous = self.current.rcu(|current| patch.apply(current));
        let updated = self.current();

        if *previous != *updated {
            tracing::info!(
                logging_enabled = updated.logging_enabled,
                max_records_per_key = updated.max_records_per_key,
                max_request_body_size = updated.max_request_body_size,
                max_response_body_size = updated.max_response_body_size,
                "Request history config updated"
            );
        }

        match Self::persist(self.store.as_ref(), &updated).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to persist request history config");
                false
            }
        }
    }

    /// Re-read the blob from the store (e.g. after another process updated it).
    ///
    /// On a read failure the current snapshot is kept.
    pub async fn reload(&self) {
        match self.store.config_get(CONFIG_KEY).await {
            Ok(Some(blob)) => match serde_json::from_str::<serde_json::Value>(&blob) {
                Ok(value) => self.current.store(Arc::new(HistoryConfig::from_stored(&value))),
                Err(e) => tracing::warn!(error = %e, "Ignoring unparsable request history config"),
            },
            Ok(None) => tracing::debug!("No stored request history config, keeping current"),
            Err(e) => tracing::warn!(error = %e, "Failed to reload request history config"),
        }
    }
}
