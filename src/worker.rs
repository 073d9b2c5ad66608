//! Worker-side batch processing: collect a micro-batch from the queue, run
//! one forward pass, persist results, and route failures through the
//! retry / dead-letter protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use strum::Display;

use crate::config::AppConfig;
use crate::db::queries;
use crate::services::predictor::{self, Predictor};
use crate::services::queue::{JobQueue, QueueError};

/// Why a job fell out of a worker cycle. The snake_case rendering is what
/// lands in logs and what operators grep for.
#[derive(Debug, Clone, Copy, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum FailureReason {
    ImageMissing,
    PreprocessFailed,
    InferenceTimeout,
    InferenceError,
}

/// Everything a worker process owns: DB pool, queue client, one resident
/// predictor, and the tuning knobs.
pub struct WorkerContext {
    pub db: PgPool,
    pub queue: JobQueue,
    pub predictor: Arc<dyn Predictor>,
    pub config: AppConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Worker main loop. Checks the shutdown flag at the top of every cycle, so
/// graceful exit latency is bounded by the blocking-pop timeout plus at most
/// one in-flight batch.
pub async fn run_worker(ctx: WorkerContext, shutdown: Arc<AtomicBool>) -> Result<(), WorkerError> {
    let brpop_timeout = Duration::from_secs(ctx.config.brpop_timeout_s);
    let window = Duration::from_millis(ctx.config.batch_window_ms);

    while !shutdown.load(Ordering::Relaxed) {
        let batch = match ctx
            .queue
            .collect_batch(brpop_timeout, window, ctx.config.max_batch_size)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(error = %e, "failed to collect batch, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        if batch.is_empty() {
            continue;
        }

        tracing::info!(job_ids = ?batch, "collected batch");

        if let Err(e) = process_batch(&ctx, &batch).await {
            tracing::error!(error = %e, job_ids = ?batch, "batch processing failed, backing off");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    tracing::info!("worker shut down cleanly");
    Ok(())
}

/// Process one micro-batch end to end.
///
/// All ids are promoted to IN_PROGRESS in a single statement; items then fail
/// individually (missing image, bad decode) or collectively (predictor
/// timeout or error fails the whole remaining batch). Successfully
/// preprocessed items that made it into the tensor transition together.
pub async fn process_batch(ctx: &WorkerContext, job_ids: &[i64]) -> Result<(), WorkerError> {
    let jobs = queries::jobs_by_ids(&ctx.db, job_ids).await?;

    let known: Vec<i64> = jobs.iter().map(|j| j.id).collect();
    for id in job_ids {
        if !known.contains(id) {
            tracing::warn!(job_id = id, "job not found in database, skipping");
        }
    }

    if known.is_empty() {
        return Ok(());
    }

    let promoted = queries::mark_in_progress(&ctx.db, &known).await?;
    tracing::info!(batch_size = known.len(), promoted, "batch promoted to IN_PROGRESS");

    // Fetch payloads and preprocess; failures here are per-item.
    let mut failed: Vec<(i64, FailureReason)> = Vec::new();
    let mut valid: Vec<(i64, Vec<f32>)> = Vec::new();

    for &id in &known {
        match ctx.queue.fetch_image(id).await? {
            None => {
                tracing::warn!(job_id = id, "image not found in Redis (expired?)");
                failed.push((id, FailureReason::ImageMissing));
            }
            Some(bytes) => match predictor::preprocess(&bytes) {
                Ok(plane) => valid.push((id, plane)),
                Err(e) => {
                    tracing::warn!(job_id = id, error = %e, "preprocess failed");
                    failed.push((id, FailureReason::PreprocessFailed));
                }
            },
        }
    }

    if !valid.is_empty() {
        let planes: Vec<Vec<f32>> = valid.iter().map(|(_, p)| p.clone()).collect();

        match predictor::stack_batch(&planes) {
            Err(e) => {
                tracing::error!(error = %e, "failed to stack batch tensor");
                failed.extend(valid.iter().map(|(id, _)| (*id, FailureReason::InferenceError)));
            }
            Ok(tensor) => {
                // Deadline scales with batch size.
                let deadline =
                    Duration::from_secs(ctx.config.inference_timeout_s * valid.len() as u64);
                let predictor = Arc::clone(&ctx.predictor);

                let outcome = tokio::time::timeout(
                    deadline,
                    tokio::task::spawn_blocking(move || predictor.predict_batch(tensor)),
                )
                .await;

                match outcome {
                    Err(_) => {
                        tracing::error!(
                            batch_size = valid.len(),
                            reason = %FailureReason::InferenceTimeout,
                            "batch inference timed out, moving all to retry"
                        );
                        failed.extend(
                            valid.iter().map(|(id, _)| (*id, FailureReason::InferenceTimeout)),
                        );
                    }
                    Ok(Err(join_err)) => {
                        tracing::error!(error = %join_err, "inference task panicked, moving all to retry");
                        failed.extend(
                            valid.iter().map(|(id, _)| (*id, FailureReason::InferenceError)),
                        );
                    }
                    Ok(Ok(Err(e))) => {
                        tracing::error!(error = %e, "batch inference error, moving all to retry");
                        failed.extend(
                            valid.iter().map(|(id, _)| (*id, FailureReason::InferenceError)),
                        );
                    }
                    Ok(Ok(Ok(batch_scores))) => {
                        for ((id, _), scores) in valid.iter().zip(batch_scores) {
                            let output = predictor::scores_to_json(&scores);
                            let top = predictor::top_label(&scores).unwrap_or("unknown");
                            queries::complete_job(&ctx.db, *id, &output, top).await?;
                            tracing::info!(job_id = id, top_label = top, "job COMPLETED");
                        }
                    }
                }
            }
        }
    }

    if !failed.is_empty() {
        handle_failures(ctx, &failed).await?;
    }

    Ok(())
}

/// Retry / dead-letter dispatch for every id that fell out of a cycle.
///
/// The retry counter lives in Redis with its own TTL. Up to MAX_RETRIES the
/// id goes back on the queue and the row stays IN_PROGRESS (the next
/// promotion is idempotent); past that the job is FAILED, pushed to the
/// dead-letter list, and its counter deleted.
pub async fn handle_failures(
    ctx: &WorkerContext,
    failed: &[(i64, FailureReason)],
) -> Result<(), WorkerError> {
    let retry_ttl = Duration::from_secs(ctx.config.retry_ttl_s);

    for &(id, reason) in failed {
        let attempt = ctx.queue.bump_retry(id, retry_ttl).await?;

        if attempt <= ctx.config.max_retries {
            ctx.queue.enqueue(id).await?;
            tracing::warn!(
                job_id = id,
                reason = %reason,
                attempt,
                max_retries = ctx.config.max_retries,
                "job re-enqueued for retry"
            );
        } else {
            queries::fail_job(&ctx.db, id).await?;
            ctx.queue.push_dlq(id).await?;
            ctx.queue.clear_retry(id).await?;
            tracing::error!(
                job_id = id,
                reason = %reason,
                max_retries = ctx.config.max_retries,
                "job FAILED after exhausting retries, moved to DLQ"
            );
        }
    }

    Ok(())
}
