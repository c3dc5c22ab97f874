//! Runner lifecycle and registration tests.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use cast_models::{ActionType, JobState, WorkerStatus};
use cast_worker::{Action, JobContext, WorkerError};

use common::ScriptedControlPlane;

#[tokio::test]
async fn test_jobs_run_in_parallel_and_leave_the_table() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = common::runner(tmp.path(), 3, Arc::new(ScriptedControlPlane::default()));
    let release = CancellationToken::new();

    for _ in 0..3 {
        let release = release.clone();
        runner
            .add_job(
                JobContext::new(),
                vec![Action::from_fn(ActionType::Transcode, move |ctx, _| {
                    let release = release.clone();
                    async move {
                        release.cancelled().await;
                        Ok(ctx)
                    }
                })],
            )
            .unwrap();
    }

    assert_eq!(runner.job_count(), 3);
    assert_eq!(runner.status(), WorkerStatus::Working);

    release.cancel();
    tokio::time::timeout(Duration::from_secs(5), runner.wait_idle())
        .await
        .unwrap();
    assert_eq!(runner.job_count(), 0);
    assert_eq!(*runner.subscribe_job_count().borrow(), 0);
}

#[tokio::test]
async fn test_failed_job_is_removed_too() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = common::runner(tmp.path(), 3, Arc::new(ScriptedControlPlane::default()));

    // Transcode without a file list fails on its missing input.
    let id = runner
        .add_job(
            JobContext::new(),
            runner.pipeline(&[ActionType::Transcode, ActionType::Thumbnail]),
        )
        .unwrap();
    let job = runner.find_job(id.as_str()).unwrap();

    assert_eq!(job.wait().await, JobState::Failed);
    assert!(job.actions()[1].handle().is_none());
    tokio::time::timeout(Duration::from_secs(5), runner.wait_idle())
        .await
        .unwrap();
    assert!(runner.find_job(id.as_str()).is_none());
}

#[tokio::test]
async fn test_panicking_action_does_not_leak_the_job() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = common::runner(tmp.path(), 3, Arc::new(ScriptedControlPlane::default()));

    let id = runner
        .add_job(
            JobContext::new(),
            vec![Action::from_fn(ActionType::Transcode, |_, _| async move {
                panic!("encoder blew up")
            })],
        )
        .unwrap();
    let job = runner.find_job(id.as_str()).unwrap();

    tokio::time::timeout(Duration::from_secs(2), runner.wait_idle())
        .await
        .unwrap();
    assert_eq!(runner.job_count(), 0);
    assert_eq!(runner.status(), WorkerStatus::Idle);
    assert_eq!(job.state(), JobState::Failed);
}

#[tokio::test]
async fn test_empty_action_id_is_not_addressable() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = common::runner(tmp.path(), 3, Arc::new(ScriptedControlPlane::default()));
    let release = CancellationToken::new();

    let gate = release.clone();
    runner
        .add_job(
            JobContext::new().with_action_id(""),
            vec![Action::from_fn(ActionType::Stream, move |ctx, _| {
                let gate = gate.clone();
                async move {
                    gate.cancelled().await;
                    Ok(ctx)
                }
            })],
        )
        .unwrap();

    assert!(runner.find_job("").is_none());
    let err = runner
        .cancel_actions("", "stream end", &[ActionType::Stream])
        .unwrap_err();
    assert!(matches!(err, WorkerError::JobNotFound(_)));

    release.cancel();
    tokio::time::timeout(Duration::from_secs(5), runner.wait_idle())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_drain_lets_running_jobs_finish() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = common::runner(tmp.path(), 3, Arc::new(ScriptedControlPlane::default()));
    let release = CancellationToken::new();

    let gate = release.clone();
    runner
        .add_job(
            JobContext::new(),
            vec![Action::from_fn(ActionType::Upload, move |ctx, _| {
                let gate = gate.clone();
                async move {
                    gate.cancelled().await;
                    Ok(ctx)
                }
            })],
        )
        .unwrap();

    runner.drain();
    let err = runner.add_job(JobContext::new(), Vec::new()).unwrap_err();
    assert!(matches!(err, WorkerError::Draining));
    assert_eq!(runner.job_count(), 1);

    release.cancel();
    tokio::time::timeout(Duration::from_secs(5), runner.wait_idle())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_registration_succeeds_after_a_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let control_plane = Arc::new(ScriptedControlPlane::failing_registrations(1));
    let runner = common::runner(tmp.path(), 3, Arc::clone(&control_plane));

    tokio_test::assert_ok!(runner.register().await);
    assert_eq!(control_plane.registrations(), 2);
}

#[tokio::test]
async fn test_registration_exhausts_its_budget() {
    let tmp = tempfile::tempdir().unwrap();
    let control_plane = Arc::new(ScriptedControlPlane::failing_registrations(u32::MAX));
    let runner = common::runner(tmp.path(), 3, Arc::clone(&control_plane));

    let started = Instant::now();
    let err = runner.register().await.unwrap_err();

    assert!(matches!(err, WorkerError::RegistrationExhausted { attempts: 3 }));
    assert_eq!(control_plane.registrations(), 3);
    // Waits of 0, 1 and 2 units (10 ms each), the last before giving up.
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_heartbeat_loop_reports_until_shutdown() {
    let tmp = tempfile::tempdir().unwrap();
    let control_plane = Arc::new(ScriptedControlPlane::default());
    let runner = common::runner(tmp.path(), 3, Arc::clone(&control_plane));
    let shutdown = CancellationToken::new();

    let looping = {
        let runner = Arc::clone(&runner);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            runner
                .run_heartbeat_loop(Duration::from_millis(20), shutdown)
                .await
        })
    };

    tokio::time::timeout(Duration::from_secs(10), async {
        while control_plane.heartbeats() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), looping)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_self_stream_request_goes_through_the_runner() {
    let tmp = tempfile::tempdir().unwrap();
    let control_plane = Arc::new(ScriptedControlPlane::default());
    let runner = common::runner(tmp.path(), 3, Arc::clone(&control_plane));

    let stream = runner
        .request_self_stream("key-1", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stream.stream, 77);
    assert_eq!(stream.course, 5);
}
