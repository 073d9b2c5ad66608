//! Worker-pool supervisor: keeps WORKER_COUNT worker processes alive,
//! restarts crashed ones, and periodically runs the recovery sweeper that
//! reconciles database job state with queue state.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use xray_inference::config::AppConfig;
use xray_inference::db;
use xray_inference::services::queue::JobQueue;
use xray_inference::shutdown::shutdown_signal;
use xray_inference::sweeper;

/// Grace period between SIGTERM and SIGKILL at shutdown. A worker finishes
/// at most one in-flight batch, so this comfortably covers the worst case.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration");

    tracing::info!(worker_count = config.worker_count, "Starting worker supervisor");

    let db_pool = db::init_pool(&config.database_url, db::WORKER_POOL_SIZE)
        .await
        .expect("Failed to connect to database");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    let worker_bin = worker_executable();
    tracing::info!(worker_bin = %worker_bin.display(), "resolved worker executable");

    let mut children: Vec<Child> = (0..config.worker_count)
        .map(|i| spawn_worker(&worker_bin, i))
        .collect();

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        shutdown_signal().await;
        flag.store(true, Ordering::Relaxed);
    });

    let tick = Duration::from_secs(config.supervisor_tick_s);
    let recovery_period = Duration::from_secs(config.recovery_period_s);
    let mut last_sweep = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        tokio::time::sleep(tick).await;

        for (i, child) in children.iter_mut().enumerate() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::warn!(worker = i, exit = %status, "worker crashed, restarting");
                    *child = spawn_worker(&worker_bin, i);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(worker = i, error = %e, "failed to poll worker, restarting");
                    *child = spawn_worker(&worker_bin, i);
                }
            }
        }

        if last_sweep.elapsed() >= recovery_period {
            if let Err(e) = sweeper::sweep(&db_pool, &queue, &config).await {
                tracing::error!(error = %e, "recovery sweep failed");
            }
            last_sweep = Instant::now();
        }
    }

    tracing::info!("propagating shutdown to workers");
    for child in &children {
        terminate(child);
    }

    for (i, child) in children.iter_mut().enumerate() {
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => tracing::info!(worker = i, exit = %status, "worker exited"),
            Ok(Err(e)) => tracing::error!(worker = i, error = %e, "failed to reap worker"),
            Err(_) => {
                tracing::warn!(worker = i, "worker did not exit within grace period, killing");
                let _ = child.start_kill();
            }
        }
    }

    tracing::info!("all workers stopped, supervisor exiting");
}

/// The worker binary lives next to the supervisor binary.
fn worker_executable() -> PathBuf {
    std::env::current_exe()
        .map(|p| p.with_file_name("worker"))
        .unwrap_or_else(|_| PathBuf::from("worker"))
}

fn spawn_worker(worker_bin: &Path, index: usize) -> Child {
    let child = Command::new(worker_bin)
        .kill_on_drop(false)
        .spawn()
        .expect("Failed to spawn worker process");

    tracing::info!(worker = index, pid = child.id(), "worker process started");
    child
}

/// Ask a worker to finish its current batch and exit.
#[cfg(unix)]
fn terminate(child: &Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}
