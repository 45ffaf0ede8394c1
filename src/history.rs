use std::sync::Arc;

use crate::config_store::ConfigStore;
use crate::query::QueryService;
use crate::recorder::LifecycleRecorder;
use crate::retention::RetentionEnforcer;
use crate::store::HistoryStore;

/// Request history services wired around one shared store
pub struct RequestHistory {
    pub config: Arc<ConfigStore>,
    pub recorder: LifecycleRecorder,
    pub retention: RetentionEnforcer,
    pub query: QueryService,
}

impl RequestHistory {
    /// Load configuration from the store and build the services
    pub async fn new(store: Arc<dyn HistoryStore>) -> Self {
        let config = Arc::new(ConfigStore::load(store.clone()).await);
        let retention = RetentionEnforcer::new(store.clone(), config.clone());
        let recorder = LifecycleRecorder::new(store.clone(), config.clone(), retention.clone());
        let query = QueryService::new(store);

        Self {
            config,
            recorder,
            retention,
            query,
        }
    }
}
