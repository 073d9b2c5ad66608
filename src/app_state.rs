use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::queue::JobQueue;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<JobQueue>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: PgPool, queue: JobQueue, config: AppConfig) -> Self {
        Self {
            db,
            queue: Arc::new(queue),
            config: Arc::new(config),
        }
    }
}
