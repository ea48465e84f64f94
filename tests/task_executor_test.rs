//! 截止时间赛跑与会话释放测试

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use fleet_agent::models::{OutcomeStatus, RawOutcome, WorkType, TIMEOUT_ERROR_KIND};
use fleet_agent::workflow::{TaskCtx, TaskExecutor};

async fn execute(
    sessions: Arc<FakeSessions>,
    automation: Arc<FakeAutomation>,
    work_type: WorkType,
    deadline_ms: u64,
) -> (RawOutcome, OutcomeStatus) {
    let task = task("k-1", "running shoes", work_type, deadline_ms);
    let executor = TaskExecutor::new(sessions, automation);
    let raw = executor.execute(&task, &TaskCtx::new(1, &task)).await;
    let status = classifier().classify(&raw, &task).status;
    (raw, status)
}

#[tokio::test(start_paused = true)]
async fn deadline_with_enough_pages_is_partial_success() {
    let sessions = Arc::new(FakeSessions::new());
    let automation = Arc::new(FakeAutomation::new(Behavior::Hang { pages: 6 }));

    let (raw, status) = execute(sessions.clone(), automation, WorkType::Rank, 1_000).await;

    assert_eq!(raw.error_kind.as_deref(), Some(TIMEOUT_ERROR_KIND));
    assert_eq!(raw.pages_completed, 6);
    assert!(raw.elapsed_ms >= 1_000);
    assert_eq!(status, OutcomeStatus::PartialSuccess);
    assert_eq!(sessions.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_with_few_pages_is_timeout() {
    let sessions = Arc::new(FakeSessions::new());
    let automation = Arc::new(FakeAutomation::new(Behavior::Hang { pages: 3 }));

    let (raw, status) = execute(sessions.clone(), automation, WorkType::Rank, 1_000).await;

    assert_eq!(raw.pages_completed, 3);
    assert_eq!(status, OutcomeStatus::Timeout);
    assert_eq!(sessions.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn automation_winning_the_race_is_used_directly() {
    let sessions = Arc::new(FakeSessions::new());
    let automation = Arc::new(FakeAutomation::new(Behavior::ReturnAfter(
        Duration::from_millis(400),
        success_outcome(10),
    )));

    let (raw, status) = execute(sessions.clone(), automation, WorkType::Rank, 1_000).await;

    assert!(raw.error_kind.is_none());
    assert_eq!(raw.elapsed_ms, 400);
    assert_eq!(status, OutcomeStatus::Success);
    assert_eq!(sessions.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn automation_error_keeps_partial_progress() {
    let sessions = Arc::new(FakeSessions::new());
    let automation = Arc::new(FakeAutomation::new(Behavior::Fail {
        kind: Some("proxy".to_string()),
        message: "net::ERR_TUNNEL_CONNECTION_FAILED".to_string(),
        partial: Some(RawOutcome {
            pages_completed: 2,
            ..Default::default()
        }),
    }));

    let (raw, status) = execute(sessions.clone(), automation, WorkType::Click, 90_000).await;

    assert_eq!(raw.pages_completed, 2);
    assert_eq!(raw.error_kind.as_deref(), Some("proxy"));
    assert_eq!(status, OutcomeStatus::ProxyError);
    assert_eq!(sessions.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn panicking_automation_still_releases_session() {
    let sessions = Arc::new(FakeSessions::new());
    let automation = Arc::new(FakeAutomation::new(Behavior::Panic));

    let (raw, status) = execute(sessions.clone(), automation, WorkType::Info, 90_000).await;

    assert_eq!(raw.error_kind.as_deref(), Some("panic"));
    assert_eq!(status, OutcomeStatus::UnknownError);
    assert_eq!(sessions.acquired(), 1);
    assert_eq!(sessions.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_session_acquire_is_reported_not_raised() {
    let sessions = Arc::new(FakeSessions::failing());
    let automation = Arc::new(FakeAutomation::new(Behavior::Return(success_outcome(10))));

    let (raw, status) = execute(sessions.clone(), automation.clone(), WorkType::Rank, 90_000).await;

    assert_eq!(raw.error_kind.as_deref(), Some("session"));
    assert_eq!(status, OutcomeStatus::UnknownError);
    assert_eq!(automation.calls(), 0);
    assert_eq!(sessions.released(), 0);
}

#[tokio::test(start_paused = true)]
async fn blocked_connection_is_classified_blocked() {
    let sessions = Arc::new(FakeSessions::new());
    let automation = Arc::new(FakeAutomation::new(blocked_behavior()));

    let (_, status) = execute(sessions, automation, WorkType::Rank, 90_000).await;

    assert_eq!(status, OutcomeStatus::Blocked);
}
