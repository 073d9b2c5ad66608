use serde::Deserialize;

/// Runtime configuration, loaded from the environment. Every tuning knob has
/// a documented default; only the two connection strings are required.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000"). Unused by worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (queue, image blobs, dedup cache, retry counters)
    pub redis_url: String,

    /// Name of the classifier registered in the model catalog
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Path to the exported ONNX weights
    #[serde(default = "default_onnx_model_path")]
    pub onnx_model_path: String,

    /// "cpu" or "gpu". The ONNX engine runs on CPU; "gpu" logs a warning.
    #[serde(default = "default_inference_device")]
    pub inference_device: String,

    /// Number of worker processes the supervisor keeps alive
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Micro-batch collection window after the first dequeued job
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,

    /// Upper bound on jobs per forward pass
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Blocking-pop timeout; also bounds worker shutdown latency
    #[serde(default = "default_brpop_timeout_s")]
    pub brpop_timeout_s: u64,

    /// Per-item inference deadline; the batch deadline scales with batch size
    #[serde(default = "default_inference_timeout_s")]
    pub inference_timeout_s: u64,

    /// Attempts before a job is declared dead
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,

    /// TTL for image blobs and the fingerprint dedup cache
    #[serde(default = "default_image_ttl_s")]
    pub image_ttl_s: u64,

    /// TTL for retry counters
    #[serde(default = "default_retry_ttl_s")]
    pub retry_ttl_s: u64,

    /// Age after which an IN_PROGRESS job is considered abandoned.
    /// Matches the image TTL so a recovered job whose payload expired
    /// drains into the DLQ through the normal retry path.
    #[serde(default = "default_stuck_in_progress_s")]
    pub stuck_in_progress_s: u64,

    /// Age after which a QUEUED job is treated as a lost enqueue
    #[serde(default = "default_stuck_queued_s")]
    pub stuck_queued_s: u64,

    /// Supervisor liveness-check cadence
    #[serde(default = "default_supervisor_tick_s")]
    pub supervisor_tick_s: u64,

    /// Recovery sweep cadence
    #[serde(default = "default_recovery_period_s")]
    pub recovery_period_s: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_model_name() -> String {
    "densenet121-res224-all".to_string()
}

fn default_onnx_model_path() -> String {
    "models/densenet121.onnx".to_string()
}

fn default_inference_device() -> String {
    "cpu".to_string()
}

fn default_worker_count() -> usize {
    2
}

fn default_batch_window_ms() -> u64 {
    30
}

fn default_max_batch_size() -> usize {
    8
}

fn default_brpop_timeout_s() -> u64 {
    5
}

fn default_inference_timeout_s() -> u64 {
    10
}

fn default_max_retries() -> i64 {
    3
}

fn default_image_ttl_s() -> u64 {
    600
}

fn default_retry_ttl_s() -> u64 {
    3600
}

fn default_stuck_in_progress_s() -> u64 {
    600
}

fn default_stuck_queued_s() -> u64 {
    300
}

fn default_supervisor_tick_s() -> u64 {
    3
}

fn default_recovery_period_s() -> u64 {
    600
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
