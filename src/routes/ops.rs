use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::api::DlqEntry;
use crate::services::metrics::{self, OpsMetrics, METRICS_WINDOW_SECONDS};

/// GET /v1/ops/metrics — operational view over the trailing 300 s window.
///
/// Latency percentiles are submit-to-persist (queue wait included), computed
/// from raw samples on every call rather than from pre-aggregates.
pub async fn ops_metrics(
    State(state): State<AppState>,
) -> Result<Json<OpsMetrics>, (StatusCode, String)> {
    let since = Utc::now() - chrono::Duration::seconds(METRICS_WINDOW_SECONDS as i64);

    let (total, completed, failed) = queries::window_counts(&state.db, since)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)))?;

    let samples = queries::latency_samples(&state.db, since)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)))?;

    let dlq_depth = state
        .queue
        .dlq_depth()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Queue error: {}", e)))?;

    let queue_depth = state
        .queue
        .queue_depth()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Queue error: {}", e)))?;

    ::metrics::gauge!("inference_queue_depth").set(queue_depth as f64);
    ::metrics::gauge!("inference_dlq_depth").set(dlq_depth as f64);

    Ok(Json(metrics::aggregate(
        total,
        completed,
        failed,
        samples,
        dlq_depth,
        queue_depth,
    )))
}

/// GET /v1/ops/dlq — jobs that exhausted their retries, newest first.
pub async fn dlq_listing(
    State(state): State<AppState>,
) -> Result<Json<Vec<DlqEntry>>, (StatusCode, String)> {
    let ids = state
        .queue
        .dlq_entries()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Queue error: {}", e)))?;

    if ids.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let rows = queries::dlq_rows(&state.db, &ids)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)))?;

    Ok(Json(rows))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

/// The three things POST /v1/jobs needs before it can accept work: the job
/// store, the queue, and a registered model version.
#[derive(Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub redis: ComponentHealth,
    pub model: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    fn healthy(since: Instant) -> Self {
        Self {
            status: "ok".to_string(),
            latency_ms: Some(since.elapsed().as_millis() as u64),
            detail: None,
        }
    }

    fn unhealthy() -> Self {
        Self {
            status: "error".to_string(),
            latency_ms: None,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// GET /v1/ops/health — readiness of the submission path.
/// 503 exactly when POST /v1/jobs would be refused: the job store or the
/// queue is unreachable, or the model catalog is empty.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let started = Instant::now();
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => ComponentHealth::healthy(started),
        Err(_) => ComponentHealth::unhealthy(),
    };

    let started = Instant::now();
    let redis = match state.queue.health_check().await {
        Ok(()) => ComponentHealth::healthy(started),
        Err(_) => ComponentHealth::unhealthy(),
    };

    // A reachable database with an empty model catalog still refuses jobs
    // (submit returns 503), so the catalog is part of readiness.
    let started = Instant::now();
    let model = match queries::latest_model_version(&state.db).await {
        Ok(Some(version)) => ComponentHealth::healthy(started).with_detail(version.name),
        Ok(None) => ComponentHealth::unhealthy().with_detail("no model version registered".to_string()),
        Err(_) => ComponentHealth::unhealthy(),
    };

    let checks = HealthChecks { database, redis, model };
    let healthy = checks.database.is_ok() && checks.redis.is_ok() && checks.model.is_ok();

    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response))
}

/// GET /metrics — Prometheus text exposition format.
pub async fn prometheus_metrics(
    State(handle): State<Arc<PrometheusHandle>>,
) -> impl IntoResponse {
    handle.render()
}
