use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::job::{InferenceJob, JobStatus};

/// Response after creating (or deduplicating) a job.
#[derive(Debug, Serialize)]
pub struct JobCreateResponse {
    pub id: i64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&InferenceJob> for JobCreateResponse {
    fn from(job: &InferenceJob) -> Self {
        Self {
            id: job.id,
            status: job.status,
            created_at: job.created_at,
        }
    }
}

/// Response for polling job status.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub id: i64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&InferenceJob> for JobStatusResponse {
    fn from(job: &InferenceJob) -> Self {
        Self {
            id: job.id,
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Response for fetching the result of a completed job.
#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub job_id: i64,
    pub output: serde_json::Value,
    pub top_label: String,
    pub created_at: DateTime<Utc>,
}

/// One row of the dead-letter listing.
#[derive(Debug, Serialize)]
pub struct DlqEntry {
    pub id: i64,
    pub input_sha256: String,
    pub updated_at: DateTime<Utc>,
}
