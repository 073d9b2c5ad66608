use axum::extract::DefaultBodyLimit;
use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use xray_inference::app_state::AppState;
use xray_inference::config::AppConfig;
use xray_inference::db::{self, queries};
use xray_inference::routes;
use xray_inference::services::queue::JobQueue;
use xray_inference::shutdown::shutdown_signal;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024; // 10 MB

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing xray-inference API server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "inference_jobs_submitted_total",
        "Total inference jobs submitted"
    );
    metrics::describe_counter!(
        "inference_cache_hits_total",
        "Submissions deduplicated against the fingerprint cache"
    );
    metrics::describe_gauge!(
        "inference_queue_depth",
        "Current number of pending jobs in the queue"
    );
    metrics::describe_gauge!(
        "inference_dlq_depth",
        "Current number of jobs on the dead-letter list"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url, db::API_POOL_SIZE)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Register the classifier in the model catalog
    let model_version =
        queries::ensure_model_version(&db_pool, &config.model_name, &config.onnx_model_path)
            .await
            .expect("Failed to register model version");
    tracing::info!(
        model_version = %model_version.name,
        weights_path = %model_version.weights_path,
        "model version registered"
    );

    // Initialize Redis job queue
    tracing::info!("Connecting to Redis");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(db_pool, queue, config);

    // Build API routes
    let app = Router::new()
        .route("/v1/jobs", post(routes::jobs::submit_job))
        .route("/v1/jobs/:job_id", get(routes::jobs::get_job_status))
        .route(
            "/v1/jobs/:job_id/result",
            get(routes::jobs::get_job_result),
        )
        .route("/v1/ops/metrics", get(routes::ops::ops_metrics))
        .route("/v1/ops/dlq", get(routes::ops::dlq_listing))
        .route("/v1/ops/health", get(routes::ops::health_check))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::ops::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    tracing::info!("Starting xray-inference API on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}
