use std::sync::Arc;

use drtrigger_core::JobFactory;
use drtrigger_infra::jobs::JobStore;

/// Shared handler state. Handlers only ever touch the job store; dispatch
/// happens on the dispatcher task.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub factory: JobFactory,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            factory: JobFactory::new(),
        }
    }
}
