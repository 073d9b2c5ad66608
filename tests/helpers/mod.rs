//! Helpers for end-to-end tests: upload an image, poll until the job
//! reaches a terminal state.

use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
pub struct JobCreated {
    pub id: i64,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct JobState {
    pub id: i64,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct JobScores {
    pub job_id: i64,
    pub output: serde_json::Value,
    pub top_label: String,
}

/// Synthetic grayscale test image. The shade parameter makes each caller's
/// payload unique, so dedup tests control their own fingerprints.
pub fn test_image(shade: u8) -> Vec<u8> {
    let img = image::GrayImage::from_fn(256, 256, |x, y| {
        image::Luma([shade.wrapping_add(((x + y) % 32) as u8)])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode test PNG");
    out.into_inner()
}

/// POST an image to /v1/jobs, returning the HTTP status and parsed body.
pub async fn upload_image(
    client: &reqwest::Client,
    base_url: &str,
    image_bytes: Vec<u8>,
) -> Result<(reqwest::StatusCode, JobCreated), Box<dyn std::error::Error>> {
    let form = reqwest::multipart::Form::new().part(
        "image",
        reqwest::multipart::Part::bytes(image_bytes)
            .file_name("scan.png")
            .mime_str("image/png")?,
    );

    let response = client
        .post(format!("{}/v1/jobs", base_url))
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Upload failed with status {}: {}", status, error_text).into());
    }

    let body = response.json::<JobCreated>().await?;
    Ok((status, body))
}

/// Poll GET /v1/jobs/{id} every 500ms until COMPLETED or FAILED.
pub async fn poll_until_terminal(
    client: &reqwest::Client,
    base_url: &str,
    job_id: i64,
    timeout_secs: u64,
) -> Result<JobState, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2;

    for _ in 0..max_attempts {
        let response = client
            .get(format!("{}/v1/jobs/{}", base_url, job_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {}", error_text).into());
        }

        let state = response.json::<JobState>().await?;
        match state.status.as_str() {
            "COMPLETED" | "FAILED" => return Ok(state),
            "QUEUED" | "IN_PROGRESS" => sleep(Duration::from_millis(500)).await,
            other => return Err(format!("Unknown job status: {}", other).into()),
        }
    }

    Err(format!("Job {} did not finish within {} seconds", job_id, timeout_secs).into())
}

/// Fetch the result row for a completed job.
pub async fn fetch_result(
    client: &reqwest::Client,
    base_url: &str,
    job_id: i64,
) -> Result<JobScores, Box<dyn std::error::Error>> {
    let response = client
        .get(format!("{}/v1/jobs/{}/result", base_url, job_id))
        .send()
        .await?;

    if !response.status().is_success() {
        let error_text = response.text().await?;
        return Err(format!("Result fetch failed: {}", error_text).into());
    }

    Ok(response.json::<JobScores>().await?)
}
