use std::sync::Arc;

use crate::config::Config;
use crate::observability::Metrics;
use crate::queue::QueueService;
use crate::store::JobStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub queue: QueueService,
    pub store: Arc<JobStore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        queue: QueueService,
        store: Arc<JobStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            queue,
            store,
            metrics,
        }
    }
}
