use xray_inference::models::job::JobStatus;
use xray_inference::worker::FailureReason;

#[test]
fn job_status_round_trips_through_strings() {
    for status in [
        JobStatus::Queued,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Failed,
    ] {
        let s = status.to_string();
        assert_eq!(s.parse::<JobStatus>().unwrap(), status);
    }
}

#[test]
fn job_status_database_strings() {
    assert_eq!(JobStatus::Queued.to_string(), "QUEUED");
    assert_eq!(JobStatus::InProgress.to_string(), "IN_PROGRESS");
    assert_eq!(JobStatus::Completed.to_string(), "COMPLETED");
    assert_eq!(JobStatus::Failed.to_string(), "FAILED");
}

#[test]
fn job_status_serializes_like_it_displays() {
    let json = serde_json::to_string(&JobStatus::InProgress).unwrap();
    assert_eq!(json, "\"IN_PROGRESS\"");
}

#[test]
fn terminal_states() {
    assert!(!JobStatus::Queued.is_terminal());
    assert!(!JobStatus::InProgress.is_terminal());
    assert!(JobStatus::Completed.is_terminal());
    assert!(JobStatus::Failed.is_terminal());
}

#[test]
fn failure_reasons_render_snake_case() {
    assert_eq!(FailureReason::ImageMissing.to_string(), "image_missing");
    assert_eq!(FailureReason::PreprocessFailed.to_string(), "preprocess_failed");
    assert_eq!(FailureReason::InferenceTimeout.to_string(), "inference_timeout");
    assert_eq!(FailureReason::InferenceError.to_string(), "inference_error");
}
