//! End-to-end tests for local uploads: submission, watching and cleanup.

mod common;

use std::time::Duration;

use serde_json::json;

use common::harness::{MAX_UPLOAD_SIZE, WATCH_TIMEOUT};
use common::TestHarness;
use stowage::testing::FakeBackend;
use stowage::{IngestError, JobStatus, WatchOutcome};

const CONTENT: &[u8] = b"sixteen bytes!!!";

fn fixed_harness() -> TestHarness {
    TestHarness::with_backend(FakeBackend::new().with_fixed_ids("aCid", "aJobId"))
}

/// Lets spawned watchers run up to their first wait.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_upload_reaches_success() {
    let h = fixed_harness();
    h.backend
        .set_cold_info("aCid", json!({"cold": {"filecoin": {"dataCid": "aCid"}}}));

    let receipt = h
        .orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .expect("Upload should be accepted");

    assert_eq!(receipt.job_id, "aJobId");
    assert_eq!(receipt.content_address, "aCid");
    assert_eq!(receipt.size_bytes, 16);
    assert!(receipt.staged_path.exists());

    let report = h
        .orchestrator
        .job_status_by_content_address("aCid")
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::New);

    h.backend.emit("aJobId", 5);
    let outcomes = h.orchestrator.wait_for_watchers().await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(
        outcomes[0].1.as_ref().unwrap(),
        &WatchOutcome::Finished(JobStatus::Success)
    );

    let report = h
        .orchestrator
        .job_status_by_content_address("aCid")
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::Success);
    assert_eq!(report.detail.unwrap()["cold"]["filecoin"]["dataCid"], "aCid");
    assert!(!receipt.staged_path.exists());
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn test_oversized_upload_never_reaches_backend() {
    let h = TestHarness::new();
    let content = vec![0u8; MAX_UPLOAD_SIZE as usize + 1];

    let err = h
        .orchestrator
        .submit_local_upload("big.bin", &content)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::SizeExceeded { .. }));
    assert_eq!(h.backend.hot_adds(), 0);
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn test_duplicate_of_completed_upload_conflicts() {
    let h = fixed_harness();
    h.orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .unwrap();
    h.backend.emit("aJobId", 5);
    h.orchestrator.wait_for_watchers().await;

    let err = h
        .orchestrator
        .submit_local_upload("again.txt", CONTENT)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Conflict { ref content_address } if content_address == "aCid"));
    assert_eq!(h.backend.pushed().len(), 1);
    assert_eq!(h.store.statuses_for("aCid"), vec![JobStatus::New, JobStatus::Success]);
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn test_running_upload_cannot_be_resubmitted() {
    let h = TestHarness::new();
    let first = h
        .orchestrator
        .submit_local_upload("same.txt", b"same bytes")
        .await
        .unwrap();
    h.backend.emit(&first.job_id, 1);

    let err = h
        .orchestrator
        .submit_local_upload("same.txt", b"same bytes")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Conflict { .. }));
    assert!(first.staged_path.exists());
    assert_eq!(h.backend.pushed().len(), 1);
    assert_eq!(h.orchestrator.active_watchers(), vec![first.job_id.clone()]);

    h.backend.emit_with_cause(&first.job_id, 3, "deal rejected");
    h.orchestrator.wait_for_watchers().await;

    let report = h
        .orchestrator
        .job_status_by_content_address(&first.content_address)
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::Failed);
    assert!(h.staged_files().is_empty());

    // Once the first job ended, the content may be submitted again.
    let second = h
        .orchestrator
        .submit_local_upload("same.txt", b"same bytes")
        .await
        .unwrap();
    assert_ne!(second.job_id, first.job_id);
    h.backend.emit(&second.job_id, 5);
    h.orchestrator.wait_for_watchers().await;

    assert_eq!(
        h.store.statuses_for(&first.content_address),
        vec![
            JobStatus::New,
            JobStatus::Queued,
            JobStatus::Failed,
            JobStatus::New,
            JobStatus::Success,
        ]
    );
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn test_concurrent_identical_uploads_yield_one_job() {
    let h = TestHarness::new();

    let (a, b) = tokio::join!(
        h.orchestrator.submit_local_upload("a.txt", b"identical"),
        h.orchestrator.submit_local_upload("b.txt", b"identical"),
    );

    let (accepted, rejected): (Vec<_>, Vec<_>) = [a, b].into_iter().partition(|r| r.is_ok());
    assert_eq!(accepted.len(), 1);
    assert!(matches!(rejected[0], Err(IngestError::Conflict { .. })));
    assert_eq!(h.backend.pushed().len(), 1);

    let receipt = accepted.into_iter().next().unwrap().unwrap();
    assert!(receipt.staged_path.exists());
    h.backend.emit(&receipt.job_id, 5);
    h.orchestrator.wait_for_watchers().await;
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn test_failed_upload_can_be_resubmitted() {
    let h = fixed_harness();
    h.orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .unwrap();
    h.backend.emit_with_cause("aJobId", 3, "deal rejected");
    h.orchestrator.wait_for_watchers().await;

    h.orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .expect("Failed upload should be accepted again");

    let report = h
        .orchestrator
        .job_status_by_content_address("aCid")
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::New);
    assert_eq!(h.backend.pushed().len(), 2);

    h.backend.emit("aJobId", 5);
    h.orchestrator.wait_for_watchers().await;
}

#[tokio::test]
async fn test_terminal_status_is_final() {
    let h = fixed_harness();
    h.orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .unwrap();

    h.backend.emit("aJobId", 1);
    h.backend.emit("aJobId", 5);
    h.backend.emit("aJobId", 3);
    h.orchestrator.wait_for_watchers().await;

    let report = h
        .orchestrator
        .job_status_by_content_address("aCid")
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::Success);
    assert_eq!(
        h.store.statuses_for("aCid"),
        vec![JobStatus::New, JobStatus::Queued, JobStatus::Success]
    );
    assert_eq!(h.backend.subscriber_count("aJobId"), 0);
}

#[tokio::test]
async fn test_failed_job_records_cause_and_removes_file() {
    let h = fixed_harness();
    let receipt = h
        .orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .unwrap();

    h.backend.emit_with_cause("aJobId", 3, "no miners available");
    h.orchestrator.wait_for_watchers().await;

    let report = h
        .orchestrator
        .job_status_by_content_address("aCid")
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::Failed);
    let detail = report.detail.unwrap();
    assert_eq!(detail["status"], "FAILED");
    assert_eq!(detail["error"], "no miners available");
    assert!(!receipt.staged_path.exists());
}

#[tokio::test]
async fn test_cancelled_job_removes_file() {
    let h = fixed_harness();
    let receipt = h
        .orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .unwrap();

    h.backend.emit("aJobId", 4);
    h.orchestrator.wait_for_watchers().await;

    let report = h
        .orchestrator
        .job_status_by_content_address("aCid")
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::Cancelled);
    assert_eq!(
        report.detail.unwrap()["error"],
        "job ended with status CANCELLED"
    );
    assert!(!receipt.staged_path.exists());
}

#[tokio::test(start_paused = true)]
async fn test_silent_job_times_out_as_unspecified() {
    let h = fixed_harness();
    let receipt = h
        .orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .unwrap();

    let outcomes = h.orchestrator.wait_for_watchers().await;
    assert_eq!(outcomes[0].1.as_ref().unwrap(), &WatchOutcome::TimedOut);

    let report = h
        .orchestrator
        .job_status_by_content_address("aCid")
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::Unspecified);
    assert_eq!(report.detail.unwrap()["status"], "UNSPECIFIED");
    assert!(!receipt.staged_path.exists());
    assert_eq!(h.backend.subscriber_count("aJobId"), 0);

    // Late events have nowhere to go.
    h.backend.emit("aJobId", 5);
    let report = h
        .orchestrator
        .job_status_by_content_address("aCid")
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::Unspecified);
}

#[tokio::test(start_paused = true)]
async fn test_closed_stream_still_times_out() {
    let h = fixed_harness();
    h.orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .unwrap();

    h.backend.close_stream("aJobId");
    let outcomes = h.orchestrator.wait_for_watchers().await;

    assert_eq!(outcomes[0].1.as_ref().unwrap(), &WatchOutcome::TimedOut);
    assert_eq!(
        h.store.statuses_for("aCid"),
        vec![JobStatus::New, JobStatus::Unspecified]
    );
}

#[tokio::test(start_paused = true)]
async fn test_terminal_event_and_deadline_together_persist_once() {
    let h = fixed_harness();
    h.orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .unwrap();
    settle().await;

    // Event and deadline are both ready when the watcher next runs.
    h.backend.emit("aJobId", 5);
    tokio::time::advance(WATCH_TIMEOUT + Duration::from_millis(1)).await;
    h.orchestrator.wait_for_watchers().await;

    let statuses = h.store.statuses_for("aCid");
    let finals: Vec<_> = statuses
        .iter()
        .filter(|s| s.is_terminal() || **s == JobStatus::Unspecified)
        .collect();
    assert_eq!(finals.len(), 1, "expected one final write, got {:?}", statuses);
    assert!(h.staged_files().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_event_after_deadline_is_not_persisted() {
    let h = fixed_harness();
    h.orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .unwrap();
    settle().await;

    tokio::time::advance(WATCH_TIMEOUT + Duration::from_millis(1)).await;
    settle().await;
    h.backend.emit("aJobId", 5);
    h.orchestrator.wait_for_watchers().await;

    assert_eq!(
        h.store.statuses_for("aCid"),
        vec![JobStatus::New, JobStatus::Unspecified]
    );
}

#[tokio::test]
async fn test_unknown_status_code_is_protocol_error() {
    let h = fixed_harness();
    let receipt = h
        .orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .unwrap();

    h.backend.emit("aJobId", 9);
    let outcomes = h.orchestrator.wait_for_watchers().await;

    match &outcomes[0].1 {
        Err(IngestError::Protocol { job_id, code }) => {
            assert_eq!(job_id, "aJobId");
            assert_eq!(*code, 9);
        }
        other => panic!("expected protocol error, got {:?}", other),
    }
    assert_eq!(h.store.statuses_for("aCid"), vec![JobStatus::New]);
    assert!(!receipt.staged_path.exists());
    assert_eq!(h.backend.subscriber_count("aJobId"), 0);
}

#[tokio::test]
async fn test_submission_failure_cleans_staged_file() {
    let h = fixed_harness();
    h.backend
        .fail_next_push(stowage::BackendError::Unavailable("miner index down".into()));

    let err = h
        .orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Backend { operation: "push_storage_config", .. }));
    assert!(h.staged_files().is_empty());
    assert!(h
        .orchestrator
        .job_status_by_content_address("aCid")
        .await
        .is_err());
}

#[tokio::test]
async fn test_watch_failure_marks_upload_unspecified() {
    let h = fixed_harness();
    h.backend
        .fail_next_watch(stowage::BackendError::Unavailable("stream refused".into()));

    let err = h
        .orchestrator
        .submit_local_upload("example.txt", CONTENT)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Backend { operation: "watch_job", .. }));
    let report = h
        .orchestrator
        .job_status_by_content_address("aCid")
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::Unspecified);
    assert!(h.staged_files().is_empty());
    assert!(h.orchestrator.active_watchers().is_empty());
}

#[tokio::test]
async fn test_concurrent_uploads_are_watched_independently() {
    let h = TestHarness::new();

    let (a, b) = tokio::join!(
        h.orchestrator.submit_local_upload("a.txt", b"first file"),
        h.orchestrator.submit_local_upload("b.txt", b"second file"),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.job_id, b.job_id);
    assert_eq!(h.orchestrator.active_watchers().len(), 2);

    h.backend.emit(&a.job_id, 5);
    h.backend.emit_with_cause(&b.job_id, 3, "rejected");
    h.orchestrator.wait_for_watchers().await;

    let a_status = h
        .orchestrator
        .job_status_by_content_address(&a.content_address)
        .await
        .unwrap();
    let b_status = h
        .orchestrator
        .job_status_by_content_address(&b.content_address)
        .await
        .unwrap();
    assert_eq!(a_status.status, JobStatus::Success);
    assert_eq!(b_status.status, JobStatus::Failed);
    assert!(h.staged_files().is_empty());
}
