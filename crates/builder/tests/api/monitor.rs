use crate::helpers::{job_reporting, logger, MockJob};
use builder::{monitor_job, ExportError, JobOutcome, JobState, PollSettings};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

fn settings() -> PollSettings {
    PollSettings {
        interval: Duration::from_secs(60),
        timeout: Duration::from_secs(600),
    }
}

#[tokio::test(start_paused = true)]
async fn succeeds_after_pending_polls() {
    let job = job_reporting(vec![JobState::Pending, JobState::Pending, JobState::Success]);
    let started = Instant::now();

    let outcome = monitor_job(&job, settings(), &CancellationToken::new(), &logger()).await;

    assert_eq!(outcome, JobOutcome::Succeeded);
    // first poll is immediate, two more intervals after that
    assert_eq!(started.elapsed(), Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn reports_failure() {
    let job = job_reporting(vec![JobState::Pending, JobState::Failure]);
    let outcome = monitor_job(&job, settings(), &CancellationToken::new(), &logger()).await;
    assert_eq!(outcome, JobOutcome::Failed);
}

#[tokio::test(start_paused = true)]
async fn reports_cancellation_by_the_service() {
    let job = job_reporting(vec![JobState::Cancelled]);
    let outcome = monitor_job(&job, settings(), &CancellationToken::new(), &logger()).await;
    assert_eq!(outcome, JobOutcome::Cancelled);
    assert!(!outcome.is_success());
}

#[tokio::test(start_paused = true)]
async fn gives_up_at_the_deadline() {
    let job = job_reporting(vec![JobState::Pending]);
    let started = Instant::now();

    let outcome = monitor_job(&job, settings(), &CancellationToken::new(), &logger()).await;

    assert_eq!(outcome, JobOutcome::TimedOut);
    assert_eq!(started.elapsed(), Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn stops_when_the_run_is_cancelled() {
    let job = job_reporting(vec![JobState::Pending]);
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            sleep(Duration::from_secs(90)).await;
            cancel.cancel();
        }
    });

    let outcome = monitor_job(&job, settings(), &cancel, &logger()).await;
    assert_eq!(outcome, JobOutcome::Interrupted);
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_skips_polling() {
    let mut job = MockJob::new();
    job.expect_id().return_const("export-2".to_string());
    job.expect_status().never();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = monitor_job(&job, settings(), &cancel, &logger()).await;
    assert_eq!(outcome, JobOutcome::Interrupted);
}

#[tokio::test(start_paused = true)]
async fn failed_status_checks_count_as_pending() {
    let mut job = MockJob::new();
    job.expect_id().return_const("export-3".to_string());
    let mut calls = 0;
    job.expect_status().times(3).returning(move || {
        calls += 1;
        match calls {
            1 | 2 => Err(ExportError::Request("503 Service Unavailable".into())),
            _ => Ok(JobState::Success),
        }
    });

    let outcome = monitor_job(&job, settings(), &CancellationToken::new(), &logger()).await;
    assert_eq!(outcome, JobOutcome::Succeeded);
}
