//! 单个工作者循环 - 编排层
//!
//! 每一轮严格按顺序执行：申请 → 执行 → 分类 → 记录封锁 → 上报，
//! 然后按本轮结果与关联封锁状态选择等待时间。

use chrono::Utc;
use futures::FutureExt;
use rand::Rng;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::clients::HubClient;
use crate::error::{AllocationErrorKind, AppResult};
use crate::models::{OutcomeStatus, Task, WorkerState, WorkerStatus};
use crate::orchestrator::scheduler::{ExitReason, RunMode, SchedulerSettings, WorkerEvent};
use crate::services::{BlockCorrelationDetector, FleetCounters, OutcomeClassifier, ResultReporter};
use crate::utils::panic_message;
use crate::workflow::{TaskCtx, TaskExecutor};

/// 一轮循环的结果类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// hub 暂无任务
    Idle,
    /// hub 表示该工作者不会再有任务
    NoMoreWork,
    /// hub 暂时没有可用资源
    Unavailable,
    /// 处理了一条任务
    Processed(OutcomeStatus),
    /// 本轮出错或发生 panic
    Faulted,
}

/// 选择下一轮之前的等待（不含抖动）
///
/// - 处理了任务：使用检测器的建议值
/// - 空闲或出错：使用对应的等待，关联封锁时不低于建议值
pub fn choose_delay(
    outcome: CycleOutcome,
    settings: &SchedulerSettings,
    recommended: Duration,
    correlated: bool,
) -> Duration {
    let class_delay = match outcome {
        CycleOutcome::Processed(_) => return recommended,
        CycleOutcome::Faulted => settings.error_cooldown,
        CycleOutcome::Idle | CycleOutcome::NoMoreWork | CycleOutcome::Unavailable => {
            settings.idle_backoff
        }
    };
    if correlated {
        class_delay.max(recommended)
    } else {
        class_delay
    }
}

/// `[0, max]` 之间的随机抖动
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

pub(crate) struct WorkerLoop {
    worker_id: usize,
    hub: Arc<dyn HubClient>,
    executor: Arc<TaskExecutor>,
    classifier: Arc<OutcomeClassifier>,
    detector: Arc<BlockCorrelationDetector>,
    reporter: ResultReporter,
    counters: Arc<FleetCounters>,
    settings: SchedulerSettings,
    state: watch::Sender<WorkerState>,
    events: broadcast::Sender<WorkerEvent>,
    stop: watch::Receiver<bool>,
}

impl WorkerLoop {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        worker_id: usize,
        hub: Arc<dyn HubClient>,
        executor: Arc<TaskExecutor>,
        classifier: Arc<OutcomeClassifier>,
        detector: Arc<BlockCorrelationDetector>,
        reporter: ResultReporter,
        counters: Arc<FleetCounters>,
        settings: SchedulerSettings,
        state: watch::Sender<WorkerState>,
        events: broadcast::Sender<WorkerEvent>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            worker_id,
            hub,
            executor,
            classifier,
            detector,
            reporter,
            counters,
            settings,
            state,
            events,
            stop,
        }
    }

    /// 运行循环直到停止或排空
    pub(crate) async fn run(mut self, stagger: Duration) -> ExitReason {
        if !stagger.is_zero() {
            debug!("[工作者 {}] 错峰等待 {}ms", self.worker_id, stagger.as_millis());
            if self.sleep_or_stop(stagger).await {
                return self.exit(ExitReason::Stopped);
            }
        }

        loop {
            if self.is_stopped() {
                return self.exit(ExitReason::Stopped);
            }

            let outcome = match AssertUnwindSafe(self.process_one_task())
                .catch_unwind()
                .await
            {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    error!("[工作者 {}] ❌ 本轮出错: {}", self.worker_id, e);
                    self.transition(WorkerStatus::Error, None);
                    CycleOutcome::Faulted
                }
                Err(panic) => {
                    error!(
                        "[工作者 {}] ❌ 本轮发生 panic: {}",
                        self.worker_id,
                        panic_message(panic.as_ref())
                    );
                    self.transition(WorkerStatus::Error, None);
                    CycleOutcome::Faulted
                }
            };

            if outcome == CycleOutcome::NoMoreWork && self.settings.run_mode == RunMode::Drain {
                info!("[工作者 {}] 🏁 hub 已无任务，工作者退出", self.worker_id);
                return self.exit(ExitReason::Drained);
            }

            let delay = choose_delay(
                outcome,
                &self.settings,
                self.detector.recommended_delay(),
                self.detector.is_correlated(),
            );
            let _ = self.events.send(WorkerEvent::Backoff {
                worker_id: self.worker_id,
                outcome,
                delay,
            });
            let total = delay + jitter(self.settings.max_jitter);
            debug!("[工作者 {}] 等待 {}ms", self.worker_id, total.as_millis());

            if self.sleep_or_stop(total).await {
                return self.exit(ExitReason::Stopped);
            }
            if outcome == CycleOutcome::Faulted {
                self.transition(WorkerStatus::Idle, None);
            }
        }
    }

    /// 执行一轮：申请 → 执行 → 分类 → 记录封锁 → 上报
    async fn process_one_task(&self) -> AppResult<CycleOutcome> {
        self.transition(WorkerStatus::Requesting, None);

        let task = match self.hub.allocate(self.worker_id).await {
            Ok(Some(task)) => task.with_default_deadline(self.settings.task_deadline_ms),
            Ok(None) => {
                debug!("[工作者 {}] 暂无任务", self.worker_id);
                self.transition(WorkerStatus::Idle, None);
                return Ok(CycleOutcome::Idle);
            }
            Err(e) => match e.kind {
                AllocationErrorKind::NoWork => {
                    info!("[工作者 {}] 💤 hub 已无更多任务", self.worker_id);
                    self.transition(WorkerStatus::Idle, None);
                    return Ok(CycleOutcome::NoMoreWork);
                }
                AllocationErrorKind::NoResource => {
                    info!("[工作者 {}] ⏸️ hub 暂无可用资源: {}", self.worker_id, e.message);
                    self.transition(WorkerStatus::Idle, None);
                    return Ok(CycleOutcome::Unavailable);
                }
                AllocationErrorKind::Transient | AllocationErrorKind::Malformed => {
                    return Err(e.into())
                }
            },
        };

        self.counters.record_assigned();
        let ctx = TaskCtx::new(self.worker_id, &task);
        self.transition(WorkerStatus::Executing, Some(task.clone()));

        let raw = self.executor.execute(&task, &ctx).await;
        let result = self.classifier.classify(&raw, &task);
        match result.status {
            OutcomeStatus::Success | OutcomeStatus::PartialSuccess => {
                info!("{} ✓ 分类结果: {} ({})", ctx, result.status, result.detail)
            }
            _ => warn!("{} ⚠️ 分类结果: {} ({})", ctx, result.status, result.detail),
        }

        if result.status.is_blocked() {
            self.detector.record_block(self.worker_id, result.detail.clone());
        }

        self.transition(WorkerStatus::Submitting, Some(task));
        self.reporter.submit(&result).await;

        self.transition(WorkerStatus::Completed, None);
        self.transition(WorkerStatus::Idle, None);
        Ok(CycleOutcome::Processed(result.status))
    }

    /// 更新自己的状态并广播迁移事件
    fn transition(&self, to: WorkerStatus, current_task: Option<Task>) {
        let mut from = to;
        self.state.send_modify(|state| {
            from = state.status;
            state.status = to;
            state.current_task = current_task;
            state.last_update = Utc::now();
        });
        let _ = self.events.send(WorkerEvent::Transition {
            worker_id: self.worker_id,
            from,
            to,
        });
    }

    fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// 可被停止信号打断的等待；返回是否已收到停止信号
    async fn sleep_or_stop(&mut self, duration: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            changed = self.stop.changed() => changed.is_err() || *self.stop.borrow(),
        }
    }

    fn exit(&self, reason: ExitReason) -> ExitReason {
        if self.state.borrow().status != WorkerStatus::Idle {
            self.transition(WorkerStatus::Idle, None);
        }
        debug!("[工作者 {}] 退出: {:?}", self.worker_id, reason);
        reason
    }
}
