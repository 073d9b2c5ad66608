//! End-to-end tests against a running deployment.
//!
//! These require the full stack: a migrated PostgreSQL, Redis, the API
//! server, at least one worker with ONNX weights, and the supervisor if
//! recovery behavior is under test.
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override the default (http://localhost:8000).

mod helpers;

use helpers::*;

fn base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

#[tokio::test]
#[ignore] // Requires running API server, worker, and all infrastructure
async fn health_reports_dependencies() {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/v1/ops/health", base_url()))
        .send()
        .await
        .expect("Health check request failed");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Invalid health JSON");
    assert_eq!(body["checks"]["database"]["status"], "ok");
    assert_eq!(body["checks"]["redis"]["status"], "ok");
    // A bootstrapped deployment always has a registered model version.
    assert_eq!(body["checks"]["model"]["status"], "ok");
    assert!(body["checks"]["model"]["detail"].is_string());
}

#[tokio::test]
#[ignore] // Requires running API server, worker, and all infrastructure
async fn submit_poll_and_fetch_result() {
    let client = reqwest::Client::new();
    let base = base_url();

    let (status, created) = upload_image(&client, &base, test_image(40))
        .await
        .expect("Upload failed");
    assert_eq!(status, reqwest::StatusCode::CREATED);
    assert_eq!(created.status, "QUEUED");

    let finished = poll_until_terminal(&client, &base, created.id, 120)
        .await
        .expect("Polling failed");
    assert_eq!(finished.status, "COMPLETED");

    let result = fetch_result(&client, &base, created.id)
        .await
        .expect("Result fetch failed");
    assert_eq!(result.job_id, created.id);
    assert_eq!(result.output.as_object().unwrap().len(), 18);
    assert!(result.output.as_object().unwrap().contains_key(&result.top_label));
}

#[tokio::test]
#[ignore] // Requires running API server, worker, and all infrastructure
async fn duplicate_upload_returns_same_job() {
    let client = reqwest::Client::new();
    let base = base_url();
    let image = test_image(90);

    let (first_status, first) = upload_image(&client, &base, image.clone())
        .await
        .expect("First upload failed");
    assert_eq!(first_status, reqwest::StatusCode::CREATED);

    let (second_status, second) = upload_image(&client, &base, image)
        .await
        .expect("Second upload failed");
    assert_eq!(second_status, reqwest::StatusCode::OK);
    assert_eq!(second.id, first.id);
}

#[tokio::test]
#[ignore] // Requires running API server
async fn missing_image_field_is_rejected() {
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().text("note", "no image here");
    let response = client
        .post(format!("{}/v1/jobs", base_url()))
        .multipart(form)
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore] // Requires running API server
async fn result_of_unknown_job_is_404() {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/v1/jobs/999999999/result", base_url()))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore] // Requires running API server
async fn ops_metrics_exposes_the_window_view() {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/v1/ops/metrics", base_url()))
        .send()
        .await
        .expect("Metrics request failed");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Invalid metrics JSON");
    for field in ["rps", "failure_rate", "p50_ms", "p95_ms", "p99_ms", "dlq_depth", "queue_depth"] {
        assert!(body.get(field).is_some(), "missing metrics field {field}");
    }
}

#[tokio::test]
#[ignore] // Requires running API server
async fn dlq_listing_parses() {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/v1/ops/dlq", base_url()))
        .send()
        .await
        .expect("DLQ request failed");
    assert!(response.status().is_success());

    let body: Vec<serde_json::Value> = response.json().await.expect("Invalid DLQ JSON");
    for entry in &body {
        assert!(entry.get("id").is_some());
        assert!(entry.get("input_sha256").is_some());
        assert!(entry.get("updated_at").is_some());
    }
}

#[tokio::test]
#[ignore] // Requires running API server
async fn prometheus_scrape_renders() {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/metrics", base_url()))
        .send()
        .await
        .expect("Prometheus scrape failed");
    assert!(response.status().is_success());
}
