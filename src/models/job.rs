use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Status of an inference job in the async queue.
///
/// QUEUED and IN_PROGRESS are transient; COMPLETED and FAILED are terminal
/// and never transition again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, PartialEq, Eq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Catalog entry for a classifier model. Created once at bootstrap,
/// referenced by every job, effectively immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: i64,
    pub name: String,
    pub weights_path: String,
    pub created_at: DateTime<Utc>,
}

/// One inference request. The database row is the source of truth for state;
/// the Redis queue only carries the id to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceJob {
    pub id: i64,
    pub model_version_id: i64,
    pub status: JobStatus,
    pub input_sha256: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
