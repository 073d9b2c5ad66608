//! Periodic reconciliation between durable job state and queue state.
//!
//! Workers crash, enqueues get lost, image payloads expire. The sweeper
//! repairs the divergence: abandoned IN_PROGRESS rows go back to the queue
//! (or to the dead-letter list once their retries run out) and aged QUEUED
//! rows are re-enqueued.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::queries;
use crate::services::queue::JobQueue;
use crate::worker::WorkerError;

/// Outcome of one sweep, for logging and tests.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub requeued_in_progress: u64,
    pub dead_lettered: u64,
    pub requeued_queued: u64,
}

/// Run both recovery scans once.
pub async fn sweep(db: &PgPool, queue: &JobQueue, config: &AppConfig) -> Result<SweepReport, WorkerError> {
    let mut report = SweepReport::default();

    recover_stuck_in_progress(db, queue, config, &mut report).await?;
    recover_stuck_queued(db, queue, config, &mut report).await?;

    if report != SweepReport::default() {
        tracing::info!(
            requeued_in_progress = report.requeued_in_progress,
            dead_lettered = report.dead_lettered,
            requeued_queued = report.requeued_queued,
            "recovery sweep repaired jobs"
        );
    }

    Ok(report)
}

/// IN_PROGRESS rows untouched for longer than the stuck threshold belong to
/// a worker that died mid-batch. Each recovery counts as a retry attempt;
/// otherwise a worker that always crashes mid-forward-pass would requeue the
/// same job forever.
async fn recover_stuck_in_progress(
    db: &PgPool,
    queue: &JobQueue,
    config: &AppConfig,
    report: &mut SweepReport,
) -> Result<(), WorkerError> {
    let threshold = Utc::now() - chrono::Duration::seconds(config.stuck_in_progress_s as i64);
    let stuck = queries::stuck_in_progress(db, threshold).await?;

    if stuck.is_empty() {
        return Ok(());
    }

    tracing::warn!(count = stuck.len(), "detected stuck IN_PROGRESS jobs");
    let retry_ttl = Duration::from_secs(config.retry_ttl_s);

    for job in stuck {
        let attempt = queue.bump_retry(job.id, retry_ttl).await?;

        if attempt > config.max_retries {
            queries::fail_job(db, job.id).await?;
            queue.push_dlq(job.id).await?;
            queue.clear_retry(job.id).await?;
            report.dead_lettered += 1;
            tracing::error!(
                job_id = job.id,
                attempt,
                "stuck job exhausted recovery attempts, moved to DLQ"
            );
        } else if queries::requeue_stuck(db, job.id, threshold).await? {
            // The guarded UPDATE re-checks status and staleness, so a worker
            // that completed the job after our scan wins.
            queue.enqueue(job.id).await?;
            report.requeued_in_progress += 1;
            tracing::info!(job_id = job.id, attempt, "stuck job returned to queue");
        }
    }

    Ok(())
}

/// QUEUED rows older than the threshold mean the enqueue was lost (normal
/// end-to-end is seconds). Re-push the id only; the job has never been
/// attempted, so its retry counter is left alone.
async fn recover_stuck_queued(
    db: &PgPool,
    queue: &JobQueue,
    config: &AppConfig,
    report: &mut SweepReport,
) -> Result<(), WorkerError> {
    let threshold = Utc::now() - chrono::Duration::seconds(config.stuck_queued_s as i64);
    let lost = queries::stuck_queued(db, threshold).await?;

    for id in lost {
        queue.enqueue(id).await?;
        report.requeued_queued += 1;
        tracing::info!(job_id = id, "re-enqueued lost QUEUED job");
    }

    Ok(())
}
