//! Readiness polling against the in-memory platform.

use std::time::Duration;
use tokio::time::Instant;
use vmprobe::test_utils::{FakePlatform, VmPlan};
use vmprobe::{Error, Platform, ReadinessConfig, VmPhase, VmSpec, wait_running};

async fn created(plan: VmPlan) -> (FakePlatform, vmprobe::VmHandle) {
    let platform = FakePlatform::new().with_plan(plan);
    let vm = platform.create_vm(&VmSpec::random()).await.unwrap();
    (platform, vm)
}

#[tokio::test(start_paused = true)]
async fn returns_once_running() {
    let (platform, vm) =
        created(VmPlan::new().phases([VmPhase::Pending, VmPhase::Scheduled, VmPhase::Running]))
            .await;

    wait_running(&platform, &vm, Duration::from_secs(60), &ReadinessConfig::default())
        .await
        .unwrap();
    assert_eq!(platform.polls(&vm), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_vm_returns_without_waiting_out_the_timeout() {
    let (platform, vm) = created(VmPlan::new().phases([VmPhase::Pending, VmPhase::Failed])).await;

    let started = Instant::now();
    let err = wait_running(&platform, &vm, Duration::from_secs(300), &ReadinessConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotRunning { .. }), "{err}");
    assert!(err.to_string().contains("failed"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn succeeded_vm_is_terminal_too() {
    let (platform, vm) = created(VmPlan::new().phase(VmPhase::Succeeded)).await;
    let err = wait_running(&platform, &vm, Duration::from_secs(30), &ReadinessConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotRunning { .. }));
    assert_eq!(platform.polls(&vm), 1);
}

#[tokio::test(start_paused = true)]
async fn pending_past_timeout_is_not_running() {
    let (platform, vm) = created(VmPlan::new().phase(VmPhase::Pending)).await;
    let config = ReadinessConfig {
        poll_interval: Duration::from_secs(2),
        ..ReadinessConfig::default()
    };

    let started = Instant::now();
    let err = wait_running(&platform, &vm, Duration::from_secs(9), &config)
        .await
        .unwrap_err();

    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(9) && waited < Duration::from_secs(10));
    match err {
        Error::NotRunning { reason, .. } => assert!(reason.contains("still pending"), "{reason}"),
        other => panic!("unexpected error: {other}"),
    }
    // polls at 0, 2, 4, 6, 8 and a final one at the deadline
    assert_eq!(platform.polls(&vm), 6);
}

#[tokio::test(start_paused = true)]
async fn transient_poll_errors_are_retried() {
    let plan = VmPlan::new()
        .poll_error("apiserver unavailable")
        .poll_error("apiserver unavailable")
        .phase(VmPhase::Pending)
        .poll_error("apiserver unavailable")
        .phase(VmPhase::Running);
    let (platform, vm) = created(plan).await;

    wait_running(&platform, &vm, Duration::from_secs(60), &ReadinessConfig::default())
        .await
        .unwrap();
    assert_eq!(platform.polls(&vm), 5);
}

#[tokio::test(start_paused = true)]
async fn persistent_poll_errors_surface_as_poll_error() {
    let (platform, vm) = created(VmPlan::new().poll_error("forbidden")).await;
    let config = ReadinessConfig {
        max_poll_errors: 2,
        ..ReadinessConfig::default()
    };

    let err = wait_running(&platform, &vm, Duration::from_secs(60), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PollError { .. }), "{err}");
    assert!(matches!(err.root(), Error::Platform(msg) if msg == "forbidden"));
    assert_eq!(platform.polls(&vm), 3);
}

#[tokio::test(start_paused = true)]
async fn stalled_poll_is_abandoned_at_the_deadline() {
    let (platform, vm) = created(VmPlan::new().phase(VmPhase::Pending).hang_poll()).await;

    let started = Instant::now();
    let err = tokio::time::timeout(
        Duration::from_secs(3600),
        wait_running(&platform, &vm, Duration::from_secs(10), &ReadinessConfig::default()),
    )
    .await
    .expect("wait_running outlived its timeout")
    .unwrap_err();

    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(11));
    match err {
        Error::NotRunning { reason, .. } => assert!(reason.contains("still pending"), "{reason}"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(platform.polls(&vm), 2);
}
