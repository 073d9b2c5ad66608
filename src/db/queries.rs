use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::models::api::DlqEntry;
use crate::models::job::{InferenceJob, JobStatus, ModelVersion};
use crate::models::result::InferenceResult;

#[derive(FromRow)]
struct JobRow {
    id: i64,
    model_version_id: i64,
    status: String,
    input_sha256: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for InferenceJob {
    fn from(r: JobRow) -> Self {
        InferenceJob {
            id: r.id,
            model_version_id: r.model_version_id,
            status: r.status.parse().unwrap_or(JobStatus::Queued),
            input_sha256: r.input_sha256,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const JOB_COLUMNS: &str = "id, model_version_id, status, input_sha256, created_at, updated_at";

/// Register a model version if it is not already in the catalog, then return
/// the catalog row. Called once at API startup.
pub async fn ensure_model_version(
    pool: &PgPool,
    name: &str,
    weights_path: &str,
) -> Result<ModelVersion, sqlx::Error> {
    sqlx::query(
        "INSERT INTO model_versions (name, weights_path) VALUES ($1, $2)
         ON CONFLICT (name) DO NOTHING",
    )
    .bind(name)
    .bind(weights_path)
    .execute(pool)
    .await?;

    let row: (i64, String, String, DateTime<Utc>) =
        sqlx::query_as("SELECT id, name, weights_path, created_at FROM model_versions WHERE name = $1")
            .bind(name)
            .fetch_one(pool)
            .await?;

    Ok(ModelVersion {
        id: row.0,
        name: row.1,
        weights_path: row.2,
        created_at: row.3,
    })
}

/// Most recently registered model version, if any.
pub async fn latest_model_version(pool: &PgPool) -> Result<Option<ModelVersion>, sqlx::Error> {
    let row: Option<(i64, String, String, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, name, weights_path, created_at FROM model_versions
         ORDER BY created_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| ModelVersion {
        id: r.0,
        name: r.1,
        weights_path: r.2,
        created_at: r.3,
    }))
}

/// Insert a new QUEUED job.
pub async fn create_job(
    pool: &PgPool,
    model_version_id: i64,
    input_sha256: &str,
) -> Result<InferenceJob, sqlx::Error> {
    let row: JobRow = sqlx::query_as(&format!(
        "INSERT INTO inference_jobs (model_version_id, status, input_sha256)
         VALUES ($1, 'QUEUED', $2)
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(model_version_id)
    .bind(input_sha256)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Get a job by id.
pub async fn get_job(pool: &PgPool, job_id: i64) -> Result<Option<InferenceJob>, sqlx::Error> {
    let row: Option<JobRow> =
        sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM inference_jobs WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(Into::into))
}

/// Fetch a batch of jobs by id. Ids with no row are simply absent from the
/// returned set; the worker logs and skips them.
pub async fn jobs_by_ids(pool: &PgPool, ids: &[i64]) -> Result<Vec<InferenceJob>, sqlx::Error> {
    let rows: Vec<JobRow> =
        sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM inference_jobs WHERE id = ANY($1)"))
            .bind(ids)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Promote a whole batch to IN_PROGRESS in one statement. Guarded so a
/// redelivered id that already reached a terminal state is left untouched;
/// re-applying to an IN_PROGRESS set is a no-op, which makes redelivery safe.
pub async fn mark_in_progress(pool: &PgPool, ids: &[i64]) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE inference_jobs
         SET status = 'IN_PROGRESS', updated_at = now()
         WHERE id = ANY($1) AND status IN ('QUEUED', 'IN_PROGRESS')",
    )
    .bind(ids)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Persist a result and flip the job to COMPLETED, atomically. The result
/// insert is idempotent (`ON CONFLICT DO NOTHING`) and the status flip only
/// fires from IN_PROGRESS, so at-least-once delivery cannot produce a second
/// result row or resurrect a terminal job.
pub async fn complete_job(
    pool: &PgPool,
    job_id: i64,
    output: &serde_json::Value,
    top_label: &str,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO inference_results (job_id, output, top_label)
         VALUES ($1, $2, $3)
         ON CONFLICT (job_id) DO NOTHING",
    )
    .bind(job_id)
    .bind(output)
    .bind(top_label)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE inference_jobs
         SET status = 'COMPLETED', updated_at = now()
         WHERE id = $1 AND status = 'IN_PROGRESS'",
    )
    .bind(job_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

/// Mark a job FAILED. No-op once the job is terminal.
pub async fn fail_job(pool: &PgPool, job_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE inference_jobs
         SET status = 'FAILED', updated_at = now()
         WHERE id = $1 AND status IN ('QUEUED', 'IN_PROGRESS')",
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch the result row for a completed job.
pub async fn get_result(pool: &PgPool, job_id: i64) -> Result<Option<InferenceResult>, sqlx::Error> {
    let row: Option<(i64, serde_json::Value, String, DateTime<Utc>)> = sqlx::query_as(
        "SELECT job_id, output, top_label, created_at FROM inference_results WHERE job_id = $1",
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| InferenceResult {
        job_id: r.0,
        output: r.1,
        top_label: r.2,
        created_at: r.3,
    }))
}

/// IN_PROGRESS jobs whose last transition is older than the threshold.
/// Served by the (status, created_at) composite index.
pub async fn stuck_in_progress(
    pool: &PgPool,
    older_than: DateTime<Utc>,
) -> Result<Vec<InferenceJob>, sqlx::Error> {
    let rows: Vec<JobRow> = sqlx::query_as(&format!(
        "SELECT {JOB_COLUMNS} FROM inference_jobs
         WHERE status = 'IN_PROGRESS' AND updated_at < $1"
    ))
    .bind(older_than)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// QUEUED jobs created before the threshold: lost enqueues.
pub async fn stuck_queued(pool: &PgPool, older_than: DateTime<Utc>) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT id FROM inference_jobs WHERE status = 'QUEUED' AND created_at < $1",
    )
    .bind(older_than)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Return a stuck job to QUEUED. The guard re-checks both the status and the
/// staleness so a worker that finished the job between the sweep's SELECT and
/// this UPDATE wins the race.
pub async fn requeue_stuck(
    pool: &PgPool,
    job_id: i64,
    older_than: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE inference_jobs
         SET status = 'QUEUED', updated_at = now()
         WHERE id = $1 AND status = 'IN_PROGRESS' AND updated_at < $2",
    )
    .bind(job_id)
    .bind(older_than)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Job counts for the metrics window: (created, completed, failed).
pub async fn window_counts(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<(i64, i64, i64), sqlx::Error> {
    sqlx::query_as(
        "SELECT count(*),
                count(*) FILTER (WHERE status = 'COMPLETED'),
                count(*) FILTER (WHERE status = 'FAILED')
         FROM inference_jobs
         WHERE created_at >= $1",
    )
    .bind(since)
    .fetch_one(pool)
    .await
}

/// Raw submit-to-persist latency samples (seconds) for jobs created in the
/// window. Queue wait is included deliberately; this is end-to-end latency,
/// not forward-pass time.
pub async fn latency_samples(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<f64>, sqlx::Error> {
    let rows: Vec<(f64,)> = sqlx::query_as(
        "SELECT EXTRACT(EPOCH FROM (r.created_at - j.created_at))::float8
         FROM inference_results r
         JOIN inference_jobs j ON j.id = r.job_id
         WHERE j.created_at >= $1",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Job rows for the dead-letter listing, newest failure first.
pub async fn dlq_rows(pool: &PgPool, ids: &[i64]) -> Result<Vec<DlqEntry>, sqlx::Error> {
    let rows: Vec<(i64, String, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, input_sha256, updated_at FROM inference_jobs
         WHERE id = ANY($1)
         ORDER BY updated_at DESC",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| DlqEntry {
            id: r.0,
            input_sha256: r.1,
            updated_at: r.2,
        })
        .collect())
}
