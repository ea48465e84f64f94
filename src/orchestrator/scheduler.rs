//! 工作调度器 - 编排层
//!
//! ## 职责
//!
//! 持有 N 个工作者循环，每个循环各自拥有 hub 客户端、任务与会话，
//! 没有本地任务队列，分配完全由 hub 决定。
//!
//! ## 运行模式
//!
//! - `Continuous`：一直运行，直到收到外部停止信号
//! - `Drain`：hub 明确告知某个工作者不再有任务时，该工作者退出；
//!   所有工作者都退出后，完成闩（`FleetCompletion`）才会就绪

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{info, warn};

use crate::clients::HubClient;
use crate::config::Config;
use crate::models::{WorkerState, WorkerStatus};
use crate::orchestrator::worker_loop::{CycleOutcome, WorkerLoop};
use crate::retry::RetryPolicy;
use crate::services::{
    BlockCorrelationDetector, CounterSnapshot, FleetCounters, OutcomeClassifier, ResultReporter,
};
use crate::workflow::TaskExecutor;

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// 运行模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Continuous,
    Drain,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" => Ok(RunMode::Continuous),
            "drain" => Ok(RunMode::Drain),
            other => Err(format!("未知的运行模式: {}", other)),
        }
    }
}

impl Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Continuous => write!(f, "continuous"),
            RunMode::Drain => write!(f, "drain"),
        }
    }
}

/// 调度相关的时间参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    pub run_mode: RunMode,
    /// 第 i 个工作者首次申请前等待 i * start_stagger
    pub start_stagger: Duration,
    /// 暂无任务时的等待
    pub idle_backoff: Duration,
    /// 出错后的冷却
    pub error_cooldown: Duration,
    /// 随机抖动上限
    pub max_jitter: Duration,
    /// 任务未带截止时间时的默认值（毫秒）
    pub task_deadline_ms: u64,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            run_mode: config.run_mode,
            start_stagger: Duration::from_millis(config.start_stagger_ms),
            idle_backoff: Duration::from_millis(config.idle_backoff_ms),
            error_cooldown: Duration::from_millis(config.error_cooldown_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
            task_deadline_ms: config.task_deadline_ms,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// 工作者退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// 收到停止信号
    Stopped,
    /// hub 已无任务（仅 Drain 模式）
    Drained,
}

/// 工作者退出通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub worker_id: usize,
    pub reason: ExitReason,
}

/// 工作者事件，供监控与测试订阅
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// 状态迁移
    Transition {
        worker_id: usize,
        from: WorkerStatus,
        to: WorkerStatus,
    },
    /// 一轮结束后的等待（不含抖动）
    Backoff {
        worker_id: usize,
        outcome: CycleOutcome,
        delay: Duration,
    },
}

/// 某一时刻的集群快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSnapshot {
    pub workers: Vec<WorkerState>,
    pub counters: CounterSnapshot,
    /// 是否处于关联封锁状态
    pub correlated: bool,
    /// 窗口内被封的不同工作者数
    pub blocked_workers: usize,
}

/// 每个工作者一个 hub 客户端
pub type HubFactory = Arc<dyn Fn(usize) -> Arc<dyn HubClient> + Send + Sync>;

/// 停止信号句柄
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// 通知所有工作者在本轮结束后退出
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// 只读的集群视图
#[derive(Clone)]
pub struct FleetView {
    workers: Vec<watch::Receiver<WorkerState>>,
    counters: Arc<FleetCounters>,
    detector: Arc<BlockCorrelationDetector>,
}

impl FleetView {
    pub fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot {
            workers: self.workers.iter().map(|rx| rx.borrow().clone()).collect(),
            counters: self.counters.snapshot(),
            correlated: self.detector.is_correlated(),
            blocked_workers: self.detector.distinct_blocked_workers(),
        }
    }

    /// 指定工作者的状态（编号从 1 开始）
    pub fn worker(&self, worker_id: usize) -> Option<WorkerState> {
        worker_id
            .checked_sub(1)
            .and_then(|i| self.workers.get(i))
            .map(|rx| rx.borrow().clone())
    }
}

/// 完成闩：所有工作者都退出后就绪
pub struct FleetCompletion {
    rx: mpsc::Receiver<WorkerExit>,
    // 保证等待期间停止信号的发送端存活
    _stop: Arc<watch::Sender<bool>>,
}

impl FleetCompletion {
    /// 等待所有工作者退出，返回各自的退出原因
    pub async fn wait(mut self) -> Vec<WorkerExit> {
        let mut exits = Vec::new();
        while let Some(exit) = self.rx.recv().await {
            exits.push(exit);
        }
        exits.sort_by_key(|e| e.worker_id);
        exits
    }
}

/// 工作调度器
pub struct WorkScheduler {
    hubs: HubFactory,
    executor: Arc<TaskExecutor>,
    classifier: Arc<OutcomeClassifier>,
    detector: Arc<BlockCorrelationDetector>,
    counters: Arc<FleetCounters>,
    submit_retry: RetryPolicy,
    settings: SchedulerSettings,
    stop_tx: Arc<watch::Sender<bool>>,
    events: broadcast::Sender<WorkerEvent>,
    workers: Mutex<Vec<watch::Receiver<WorkerState>>>,
}

impl WorkScheduler {
    pub fn new(
        hubs: HubFactory,
        executor: TaskExecutor,
        classifier: OutcomeClassifier,
        detector: Arc<BlockCorrelationDetector>,
        settings: SchedulerSettings,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            hubs,
            executor: Arc::new(executor),
            classifier: Arc::new(classifier),
            detector,
            counters: Arc::new(FleetCounters::new()),
            submit_retry: RetryPolicy::default(),
            settings,
            stop_tx: Arc::new(stop_tx),
            events,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// 替换结果提交的重试策略
    pub fn with_submit_retry(mut self, retry: RetryPolicy) -> Self {
        self.submit_retry = retry;
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn counters(&self) -> Arc<FleetCounters> {
        self.counters.clone()
    }

    pub fn detector(&self) -> Arc<BlockCorrelationDetector> {
        self.detector.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    /// 订阅停止信号
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    /// 订阅工作者事件，需在 `start` 之前订阅才能收到全部事件
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// 启动 n 个工作者循环
    ///
    /// 第 i 个工作者（从 0 计）在首次申请前等待 `i * start_stagger`，
    /// 避免对 hub 造成同步突发。
    pub async fn start(&self, n: usize) -> FleetCompletion {
        let hubs: Vec<Arc<dyn HubClient>> = (1..=n).map(|id| (self.hubs)(id)).collect();

        if let Some(hub) = hubs.first() {
            if hub.health_check().await {
                info!("✓ hub 健康检查通过");
            } else {
                warn!("⚠️ hub 健康检查失败，工作者仍将启动并按退避重试");
            }
        }

        let (done_tx, done_rx) = mpsc::channel(n.max(1));
        let mut receivers = Vec::with_capacity(n);

        for (index, hub) in hubs.into_iter().enumerate() {
            let worker_id = index + 1;
            let (state_tx, state_rx) = watch::channel(WorkerState::new(worker_id));
            receivers.push(state_rx);

            let reporter = ResultReporter::new(
                worker_id,
                hub.clone(),
                self.submit_retry,
                self.counters.clone(),
            );
            let worker = WorkerLoop::new(
                worker_id,
                hub,
                self.executor.clone(),
                self.classifier.clone(),
                self.detector.clone(),
                reporter,
                self.counters.clone(),
                self.settings,
                state_tx,
                self.events.clone(),
                self.stop_tx.subscribe(),
            );
            let stagger = self.settings.start_stagger * index as u32;
            let done = done_tx.clone();

            tokio::spawn(async move {
                let reason = worker.run(stagger).await;
                let _ = done.send(WorkerExit { worker_id, reason }).await;
            });
        }

        *self.workers.lock().unwrap_or_else(|e| e.into_inner()) = receivers;
        info!("✓ 已启动 {} 个工作者 ({})", n, self.settings.run_mode);

        FleetCompletion {
            rx: done_rx,
            _stop: self.stop_tx.clone(),
        }
    }

    /// 启动并等待所有工作者退出，返回最终快照
    pub async fn run(&self, n: usize) -> FleetSnapshot {
        let exits = self.start(n).await.wait().await;
        let drained = exits
            .iter()
            .filter(|e| e.reason == ExitReason::Drained)
            .count();
        info!("✓ 所有工作者已退出 (排空 {} / 停止 {})", drained, exits.len() - drained);
        self.snapshot()
    }

    pub fn view(&self) -> FleetView {
        FleetView {
            workers: self
                .workers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            counters: self.counters.clone(),
            detector: self.detector.clone(),
        }
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        self.view().snapshot()
    }
}
