/// Aggregation window for the operational metrics view.
pub const METRICS_WINDOW_SECONDS: u64 = 300;

/// Point-in-time operational metrics over the trailing window.
///
/// Latency is submit-to-persist: the gap between job creation and result
/// creation, which includes queue wait, not just forward-pass time.
#[derive(Debug, serde::Serialize)]
pub struct OpsMetrics {
    pub window_seconds: u64,
    pub rps: f64,
    pub failure_rate: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub dlq_depth: u64,
    /// Pending-list length; the system's only backpressure signal.
    pub queue_depth: u64,
    pub total_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
}

/// Build the metrics view from raw window counts and latency samples.
pub fn aggregate(
    total: i64,
    completed: i64,
    failed: i64,
    mut latency_seconds: Vec<f64>,
    dlq_depth: u64,
    queue_depth: u64,
) -> OpsMetrics {
    let terminal = completed + failed;
    let failure_rate = if terminal > 0 {
        failed as f64 / terminal as f64
    } else {
        0.0
    };

    latency_seconds.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    OpsMetrics {
        window_seconds: METRICS_WINDOW_SECONDS,
        rps: total as f64 / METRICS_WINDOW_SECONDS as f64,
        failure_rate,
        p50_ms: percentile(&latency_seconds, 50.0) * 1000.0,
        p95_ms: percentile(&latency_seconds, 95.0) * 1000.0,
        p99_ms: percentile(&latency_seconds, 99.0) * 1000.0,
        dlq_depth,
        queue_depth,
        total_jobs: total,
        completed_jobs: completed,
        failed_jobs: failed,
    }
}

/// Linear-interpolation percentile over sorted samples. Returns 0.0 for an
/// empty sample set so the metrics endpoint stays parseable when the window
/// is quiet.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }

    let frac = rank - lower as f64;
    sorted[lower] + frac * (sorted[upper] - sorted[lower])
}
