use xray_inference::services::metrics::{aggregate, percentile, METRICS_WINDOW_SECONDS};

#[test]
fn percentile_empty_is_zero() {
    assert_eq!(percentile(&[], 50.0), 0.0);
    assert_eq!(percentile(&[], 99.0), 0.0);
}

#[test]
fn percentile_single_sample() {
    assert_eq!(percentile(&[4.2], 50.0), 4.2);
    assert_eq!(percentile(&[4.2], 99.0), 4.2);
}

#[test]
fn percentile_interpolates_linearly() {
    let samples = [1.0, 2.0, 3.0, 4.0];
    // rank = 0.5 * 3 = 1.5 -> halfway between 2.0 and 3.0
    assert!((percentile(&samples, 50.0) - 2.5).abs() < 1e-9);
    assert_eq!(percentile(&samples, 0.0), 1.0);
    assert_eq!(percentile(&samples, 100.0), 4.0);
}

#[test]
fn percentile_p95_on_hundred_samples() {
    let samples: Vec<f64> = (1..=100).map(|i| i as f64).collect();
    // rank = 0.95 * 99 = 94.05 -> between samples[94]=95 and samples[95]=96
    assert!((percentile(&samples, 95.0) - 95.05).abs() < 1e-9);
}

#[test]
fn aggregate_quiet_window() {
    let m = aggregate(0, 0, 0, Vec::new(), 0, 0);
    assert_eq!(m.window_seconds, METRICS_WINDOW_SECONDS);
    assert_eq!(m.rps, 0.0);
    // No terminal jobs: failure rate must not divide by zero.
    assert_eq!(m.failure_rate, 0.0);
    assert_eq!(m.p50_ms, 0.0);
    assert_eq!(m.p99_ms, 0.0);
}

#[test]
fn aggregate_failure_rate_uses_terminal_jobs_only() {
    // 10 created, 6 completed, 2 failed, 2 still queued or running.
    let m = aggregate(10, 6, 2, vec![1.0; 8], 2, 0);
    assert!((m.failure_rate - 0.25).abs() < 1e-9);
    assert!((m.rps - 10.0 / 300.0).abs() < 1e-9);
}

#[test]
fn aggregate_converts_latency_to_millis() {
    let m = aggregate(3, 3, 0, vec![0.5, 1.5, 2.5], 0, 0);
    assert!((m.p50_ms - 1500.0).abs() < 1e-6);
}

#[test]
fn aggregate_sorts_unordered_samples() {
    let m = aggregate(3, 3, 0, vec![2.5, 0.5, 1.5], 0, 0);
    assert!((m.p50_ms - 1500.0).abs() < 1e-6);
}
