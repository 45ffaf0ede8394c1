pub mod config;
pub mod config_store;
pub mod error;
pub mod history;
pub mod query;
pub mod record;
pub mod recorder;
pub mod redaction;
pub mod retention;
pub mod store;
pub mod truncation;

pub use config::{ConfigPatch, HistoryConfig, Settings};
pub use config_store::ConfigStore;
pub use error::{FailOpen, StoreError, TransitionError};
pub use history::RequestHistory;
pub use query::QueryService;
pub use record::{HistoryRecord, RecordStatus, TokenCounts, TokenUsage};
pub use recorder::{ErrorData, LifecycleRecorder, RequestStart, ResponseData};
pub use retention::RetentionEnforcer;
pub use store::{HistoryFilter, HistoryStats, HistoryStore, MemoryHistoryStore, SqliteHistoryStore};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides `level`. Output goes to stderr so command output on
/// stdout stays machine-readable.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
