use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use xray_inference::config::AppConfig;
use xray_inference::db;
use xray_inference::services::predictor::OnnxPredictor;
use xray_inference::services::queue::JobQueue;
use xray_inference::shutdown::shutdown_signal;
use xray_inference::worker::{run_worker, WorkerContext};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!(pid = std::process::id(), "Starting inference worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url, db::WORKER_POOL_SIZE)
        .await
        .expect("Failed to connect to database");

    // Initialize Redis queue
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    // Load the resident model. Each worker process owns one copy; there is
    // no sharing across processes.
    tracing::info!(model_path = %config.onnx_model_path, "Loading ONNX model");
    let predictor = OnnxPredictor::load(&config.onnx_model_path, &config.inference_device)
        .expect("Failed to load ONNX model");

    // Flip a flag on SIGTERM/SIGINT; the loop checks it between batches.
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        shutdown_signal().await;
        flag.store(true, Ordering::Relaxed);
    });

    let ctx = WorkerContext {
        db: db_pool,
        queue,
        predictor: Arc::new(predictor),
        config,
    };

    tracing::info!("Model loaded. Worker ready, entering batch loop");

    if let Err(e) = run_worker(ctx, shutdown).await {
        tracing::error!(error = %e, "worker exited with error");
        std::process::exit(1);
    }
}
