use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::api::{JobCreateResponse, JobStatusResponse, ResultResponse};
use crate::models::job::JobStatus;

const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// POST /v1/jobs — submit a chest X-ray image for classification.
///
/// Returns 201 with a fresh job id, or 200 with an existing id when the same
/// image (by SHA-256 fingerprint) was submitted within the cache TTL. A
/// cached hit enqueues nothing; the caller polls as usual and typically finds
/// the job already COMPLETED.
pub async fn submit_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JobCreateResponse>), (StatusCode, String)> {
    let mut image_data: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("image") {
            let data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read image: {}", e)))?;

            if data.len() > MAX_IMAGE_SIZE {
                return Err((
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "Image too large (maximum 10MB)".to_string(),
                ));
            }

            // Validate image format (JPEG, PNG, WebP)
            match image::guess_format(&data) {
                Ok(image::ImageFormat::Jpeg)
                | Ok(image::ImageFormat::Png)
                | Ok(image::ImageFormat::WebP) => {}
                _ => {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        "Only JPEG, PNG, and WebP images are supported".to_string(),
                    ));
                }
            }

            image_data = Some(data.to_vec());
        }
    }

    let image_data = image_data.ok_or((
        StatusCode::BAD_REQUEST,
        "Missing 'image' field in multipart upload".to_string(),
    ))?;

    let fingerprint = hex::encode(Sha256::digest(&image_data));

    metrics::counter!("inference_jobs_submitted_total").increment(1);

    // Dedup probe: a live cache entry pointing at a job that still exists
    // short-circuits the whole write path.
    let cached = state
        .queue
        .cache_lookup(&fingerprint)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Queue error: {}", e)))?;

    if let Some(job_id) = cached {
        if let Some(job) = queries::get_job(&state.db, job_id)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)))?
        {
            metrics::counter!("inference_cache_hits_total").increment(1);
            tracing::info!(job_id, input_sha256 = %fingerprint, "duplicate submission served from cache");
            return Ok((StatusCode::OK, Json(JobCreateResponse::from(&job))));
        }
    }

    let model_version = queries::latest_model_version(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)))?
        .ok_or((
            StatusCode::SERVICE_UNAVAILABLE,
            "No model version registered".to_string(),
        ))?;

    let job = queries::create_job(&state.db, model_version.id, &fingerprint)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)))?;

    let ttl = Duration::from_secs(state.config.image_ttl_s);

    state
        .queue
        .store_image(job.id, &image_data, ttl)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Queue error: {}", e)))?;

    state
        .queue
        .enqueue(job.id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Queue error: {}", e)))?;

    // Known race: two concurrent first-submissions of one fingerprint can
    // both miss the probe and both create jobs. Tolerated; duplicates are
    // never merged.
    state
        .queue
        .cache_store(&fingerprint, job.id, ttl)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Queue error: {}", e)))?;

    tracing::info!(
        job_id = job.id,
        input_sha256 = %fingerprint,
        image_size = image_data.len(),
        model_version = %model_version.name,
        "inference job created and queued"
    );

    Ok((StatusCode::CREATED, Json(JobCreateResponse::from(&job))))
}

/// GET /v1/jobs/:job_id — poll job status.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> Result<Json<JobStatusResponse>, (StatusCode, String)> {
    let job = queries::get_job(&state.db, job_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)))?
        .ok_or((StatusCode::NOT_FOUND, "Job not found".to_string()))?;

    Ok(Json(JobStatusResponse::from(&job)))
}

/// GET /v1/jobs/:job_id/result — fetch the scores of a completed job.
/// 409 until the job reaches COMPLETED.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> Result<Json<ResultResponse>, (StatusCode, String)> {
    let job = queries::get_job(&state.db, job_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)))?
        .ok_or((StatusCode::NOT_FOUND, "Job not found".to_string()))?;

    if job.status != JobStatus::Completed {
        return Err((
            StatusCode::CONFLICT,
            format!("Job is not completed yet. Current status: {}", job.status),
        ));
    }

    let result = queries::get_result(&state.db, job_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)))?
        .ok_or((StatusCode::NOT_FOUND, "Result not found".to_string()))?;

    Ok(Json(ResultResponse {
        job_id: result.job_id,
        output: result.output,
        top_label: result.top_label,
        created_at: result.created_at,
    }))
}
