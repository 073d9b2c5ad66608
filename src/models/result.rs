use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal output of a completed job. One-to-one with the job row, written
/// at most once and never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResult {
    pub job_id: i64,
    /// Label → probability score for every pathology the classifier knows.
    pub output: serde_json::Value,
    /// Argmax label, duplicated out of `output` so analytical queries can
    /// filter on an indexed column instead of parsing JSON.
    pub top_label: String,
    pub created_at: DateTime<Utc>,
}
