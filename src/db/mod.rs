use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Connection budget for the API server: concurrent submit/status handlers
/// each hold a connection briefly, so this bounds request concurrency
/// against Postgres without starving the worker processes' connections.
pub const API_POOL_SIZE: u32 = 16;

/// Connection budget for a worker or supervisor process. Both are
/// single-threaded cooperative (one batch, one sweep at a time, statements
/// issued sequentially), so one connection in flight plus a spare covers
/// reconnect churn.
pub const WORKER_POOL_SIZE: u32 = 2;

/// Initialize a PostgreSQL connection pool sized for the calling process.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Run embedded database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub mod queries;
