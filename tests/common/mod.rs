//! 测试用的内存实现：hub、会话提供者、页面自动化
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fleet_agent::browser::{PageAutomation, Session, SessionProvider};
use fleet_agent::clients::HubClient;
use fleet_agent::error::{
    AllocationError, AllocationErrorKind, AutomationError, SessionError, SubmissionError,
    SubmissionErrorKind,
};
use fleet_agent::models::{ClassifiedResult, RawOutcome, Task, WorkType};
use fleet_agent::orchestrator::{HubFactory, RunMode, SchedulerSettings, WorkScheduler};
use fleet_agent::retry::RetryPolicy;
use fleet_agent::services::{
    BackoffPolicy, BlockCorrelationDetector, ClassifierConfig, OutcomeClassifier,
};
use fleet_agent::workflow::TaskExecutor;

// ========== hub ==========

/// 一次分配请求的脚本化响应
#[derive(Debug, Clone)]
pub enum Alloc {
    Task(Task),
    Nothing,
    NoWork,
    NoResource,
    Transient,
    Panic,
}

#[derive(Default)]
struct HubState {
    scripts: HashMap<usize, VecDeque<Alloc>>,
    allocate_calls: HashMap<usize, usize>,
    in_flight: HashMap<usize, String>,
    violations: usize,
    submit_attempts: usize,
    submit_failure: Option<SubmissionErrorKind>,
    submissions: Vec<ClassifiedResult>,
}

/// 按工作者编号脚本化的 hub；脚本用完后返回 `fallback`
#[derive(Clone)]
pub struct FakeHub {
    state: Arc<Mutex<HubState>>,
    fallback: Alloc,
    healthy: bool,
}

impl FakeHub {
    pub fn new(fallback: Alloc) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::default())),
            fallback,
            healthy: true,
        }
    }

    pub fn script(&self, worker_id: usize, items: Vec<Alloc>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(worker_id, items.into());
    }

    /// 之后的每次提交都以该类别失败
    pub fn fail_submissions(&self, kind: SubmissionErrorKind) {
        self.state.lock().unwrap().submit_failure = Some(kind);
    }

    pub fn submissions(&self) -> Vec<ClassifiedResult> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn submit_attempts(&self) -> usize {
        self.state.lock().unwrap().submit_attempts
    }

    pub fn allocate_calls(&self, worker_id: usize) -> usize {
        self.state
            .lock()
            .unwrap()
            .allocate_calls
            .get(&worker_id)
            .copied()
            .unwrap_or(0)
    }

    /// 工作者在上一条任务提交之前又拿到新任务的次数
    pub fn in_flight_violations(&self) -> usize {
        self.state.lock().unwrap().violations
    }

    pub fn factory(&self) -> HubFactory {
        let hub = self.clone();
        Arc::new(move |_| Arc::new(hub.clone()) as Arc<dyn HubClient>)
    }
}

#[async_trait]
impl HubClient for FakeHub {
    async fn allocate(&self, worker_id: usize) -> Result<Option<Task>, AllocationError> {
        let next = {
            let mut state = self.state.lock().unwrap();
            *state.allocate_calls.entry(worker_id).or_default() += 1;
            state
                .scripts
                .get_mut(&worker_id)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| self.fallback.clone())
        };

        match next {
            Alloc::Task(task) => {
                let mut state = self.state.lock().unwrap();
                if state.in_flight.contains_key(&worker_id) {
                    state.violations += 1;
                }
                state
                    .in_flight
                    .insert(worker_id, task.allocation_key.clone());
                Ok(Some(task))
            }
            Alloc::Nothing => Ok(None),
            Alloc::NoWork => Err(AllocationError::no_work()),
            Alloc::NoResource => Err(AllocationError::new(
                AllocationErrorKind::NoResource,
                "no_resource",
            )),
            Alloc::Transient => Err(AllocationError::new(
                AllocationErrorKind::Transient,
                "HTTP 502",
            )),
            Alloc::Panic => panic!("hub client exploded"),
        }
    }

    async fn submit(&self, result: &ClassifiedResult) -> Result<(), SubmissionError> {
        let mut state = self.state.lock().unwrap();
        state.submit_attempts += 1;
        state
            .in_flight
            .retain(|_, key| key != &result.allocation_key);
        match state.submit_failure {
            Some(kind) => Err(SubmissionError::new(kind, "HTTP 503")),
            None => {
                state.submissions.push(result.clone());
                Ok(())
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

// ========== 会话 ==========

#[derive(Default)]
pub struct FakeSessions {
    acquired: AtomicUsize,
    released: AtomicUsize,
    fail: bool,
}

impl FakeSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for FakeSessions {
    async fn acquire(&self, task: &Task) -> Result<Session, SessionError> {
        if self.fail {
            return Err(SessionError::CreationFailed("profile locked".to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Session::detached(format!("fake-{}", task.allocation_key)))
    }

    async fn release(&self, _session: Session) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ========== 自动化 ==========

/// 自动化的脚本化行为
#[derive(Debug, Clone)]
pub enum Behavior {
    Return(RawOutcome),
    ReturnAfter(Duration, RawOutcome),
    Fail {
        kind: Option<String>,
        message: String,
        partial: Option<RawOutcome>,
    },
    /// 记录已完成页数后永不返回
    Hang { pages: u32 },
    Panic,
}

/// 按检索词选择行为的自动化
pub struct FakeAutomation {
    behaviors: Mutex<HashMap<String, Behavior>>,
    default: Behavior,
    calls: AtomicUsize,
}

impl FakeAutomation {
    pub fn new(default: Behavior) -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            default,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on_query(self, query: &str, behavior: Behavior) -> Self {
        self.behaviors
            .lock()
            .unwrap()
            .insert(query.to_string(), behavior);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageAutomation for FakeAutomation {
    async fn execute(&self, session: &Session, task: &Task) -> Result<RawOutcome, AutomationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&task.query)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        match behavior {
            Behavior::Return(raw) => {
                session.progress().observe_pages(raw.pages_completed);
                Ok(raw)
            }
            Behavior::ReturnAfter(delay, raw) => {
                for _ in 0..raw.pages_completed {
                    session.progress().record_page(None);
                }
                tokio::time::sleep(delay).await;
                Ok(raw)
            }
            Behavior::Fail {
                kind,
                message,
                partial,
            } => {
                let err = AutomationError::new(kind, message);
                Err(match partial {
                    Some(partial) => err.with_partial(partial),
                    None => err,
                })
            }
            Behavior::Hang { pages } => {
                session.progress().observe_pages(pages);
                std::future::pending::<Result<RawOutcome, AutomationError>>().await
            }
            Behavior::Panic => panic!("automation exploded"),
        }
    }
}

// ========== 构造辅助 ==========

pub fn task(key: &str, query: &str, work_type: WorkType, deadline_ms: u64) -> Task {
    Task {
        allocation_key: key.to_string(),
        query: query.to_string(),
        target_id: "shop-42".to_string(),
        work_type,
        proxy_assignment: None,
        excluded_resources: Vec::new(),
        deadline_ms,
    }
}

pub fn rank_task(key: &str, query: &str) -> Task {
    task(key, query, WorkType::Rank, 90_000)
}

/// 正常完成并找到目标
pub fn success_outcome(pages: u32) -> RawOutcome {
    RawOutcome {
        succeeded: true,
        found: true,
        pages_completed: pages,
        referrer: Some("https://www.example.com/search?q=shoes".to_string()),
        ..Default::default()
    }
}

/// 连接被目标站点重置（以原始结果形式返回）
pub fn blocked_outcome() -> RawOutcome {
    RawOutcome {
        error_kind: Some("navigation".to_string()),
        error_message: Some("net::ERR_CONNECTION_RESET".to_string()),
        ..Default::default()
    }
}

/// 连接被目标站点重置（以错误形式抛出）
pub fn blocked_behavior() -> Behavior {
    Behavior::Fail {
        kind: Some("navigation".to_string()),
        message: "net::ERR_CONNECTION_RESET".to_string(),
        partial: None,
    }
}

pub fn settings(run_mode: RunMode) -> SchedulerSettings {
    SchedulerSettings {
        run_mode,
        start_stagger: Duration::ZERO,
        idle_backoff: Duration::from_secs(1),
        error_cooldown: Duration::from_secs(3),
        max_jitter: Duration::ZERO,
        task_deadline_ms: 90_000,
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay_ms: 10,
        multiplier: 2.0,
        max_delay_ms: 100,
    }
}

pub fn classifier() -> OutcomeClassifier {
    OutcomeClassifier::new(&ClassifierConfig::default()).unwrap()
}

pub fn scheduler(
    hub: &FakeHub,
    sessions: Arc<FakeSessions>,
    automation: Arc<FakeAutomation>,
    settings: SchedulerSettings,
    backoff: BackoffPolicy,
) -> WorkScheduler {
    WorkScheduler::new(
        hub.factory(),
        TaskExecutor::new(sessions, automation),
        classifier(),
        Arc::new(BlockCorrelationDetector::new(backoff)),
        settings,
    )
    .with_submit_retry(fast_retry())
}
