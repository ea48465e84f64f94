//! 任务执行器 - 流程层
//!
//! 核心职责：执行恰好一条任务
//!
//! 流程顺序：
//! 1. 获取会话
//! 2. 自动化与硬截止时间赛跑
//! 3. 截止时间先到时检查会话状态，合成带 `timeout` 的原始结果
//! 4. 释放会话（任何退出路径都会执行）

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::browser::{DepthProbe, PageAutomation, Session, SessionProvider};
use crate::error::{AutomationError, SessionError};
use crate::models::{RawOutcome, Task};
use crate::utils::panic_message;
use crate::workflow::task_ctx::TaskCtx;

/// 截止时间到达后检查会话状态的时间上限
pub const DEFAULT_INSPECT_BUDGET: Duration = Duration::from_secs(2);

/// 任务执行器
///
/// - 不持有会话，只在单个任务期间借用
/// - 不做分类，只产出原始结果
pub struct TaskExecutor {
    sessions: Arc<dyn SessionProvider>,
    automation: Arc<dyn PageAutomation>,
    inspect_budget: Duration,
}

impl TaskExecutor {
    pub fn new(sessions: Arc<dyn SessionProvider>, automation: Arc<dyn PageAutomation>) -> Self {
        Self {
            sessions,
            automation,
            inspect_budget: DEFAULT_INSPECT_BUDGET,
        }
    }

    pub fn with_inspect_budget(mut self, budget: Duration) -> Self {
        self.inspect_budget = budget;
        self
    }

    /// 获取会话
    pub async fn acquire_session(&self, task: &Task) -> Result<Session, SessionError> {
        self.sessions.acquire(task).await
    }

    /// 释放会话
    pub async fn release(&self, session: Session) {
        self.sessions.release(session).await
    }

    /// 完整执行一条任务，总是返回原始结果
    ///
    /// 会话获取失败、自动化出错甚至 panic 都会被转换成原始结果，
    /// 且会话在所有路径上都会被释放。
    pub async fn execute(&self, task: &Task, ctx: &TaskCtx) -> RawOutcome {
        let started = Instant::now();
        let session = match self.acquire_session(task).await {
            Ok(session) => session,
            Err(e) => {
                warn!("{} ⚠️ 获取会话失败: {}", ctx, e);
                return RawOutcome::failed(
                    Some("session".to_string()),
                    e.to_string(),
                    elapsed_ms(started),
                );
            }
        };

        let raw = match AssertUnwindSafe(self.run(task, &session, ctx))
            .catch_unwind()
            .await
        {
            Ok(raw) => raw,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("{} ❌ 自动化发生 panic: {}", ctx, message);
                RawOutcome::failed(Some("panic".to_string()), message, elapsed_ms(started))
            }
        };

        self.release(session).await;
        debug!("{} 会话已释放", ctx);
        raw
    }

    /// 在会话中执行自动化，并与任务的硬截止时间赛跑
    pub async fn run(&self, task: &Task, session: &Session, ctx: &TaskCtx) -> RawOutcome {
        let started = Instant::now();
        let deadline = task.deadline();
        info!(
            "{} ▶️ 开始执行: {} (截止 {}s)",
            ctx,
            ctx.query_preview,
            deadline.as_secs()
        );

        match tokio::time::timeout(deadline, self.automation.execute(session, task)).await {
            Ok(Ok(mut raw)) => {
                raw.elapsed_ms = elapsed_ms(started);
                raw
            }
            Ok(Err(e)) => {
                warn!("{} ⚠️ 自动化失败: {}", ctx, e);
                from_automation_error(e, elapsed_ms(started))
            }
            Err(_) => {
                // 自动化不一定能干净地取消，会话可能比截止时间活得更久，随后由 execute 强制释放
                let probe = session.inspect_depth(self.inspect_budget).await;
                match probe {
                    DepthProbe::Inspected(pages) => {
                        warn!("{} ⏰ 达到截止时间，已完成 {} 页", ctx, pages)
                    }
                    DepthProbe::Estimated(pages) => {
                        warn!("{} ⏰ 达到截止时间，会话不可检查，估计完成 {} 页", ctx, pages)
                    }
                }
                RawOutcome::timed_out(probe.pages(), elapsed_ms(started))
            }
        }
    }
}

/// 自动化错误转换为原始结果：优先使用附带的部分结果
fn from_automation_error(e: AutomationError, elapsed: u64) -> RawOutcome {
    match e.partial {
        Some(mut partial) => {
            partial.elapsed_ms = elapsed;
            partial.succeeded = false;
            if partial.error_kind.is_none() {
                partial.error_kind = Some(e.kind.unwrap_or_else(|| "automation".to_string()));
            }
            if partial.error_message.is_none() {
                partial.error_message = Some(e.message);
            }
            partial
        }
        None => RawOutcome::failed(
            Some(e.kind.unwrap_or_else(|| "automation".to_string())),
            e.message,
            elapsed,
        ),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_outcome_keeps_progress_and_gains_error_kind() {
        let err = AutomationError::new(Some("navigation".to_string()), "net::ERR_CONNECTION_RESET")
            .with_partial(RawOutcome {
                pages_completed: 3,
                referrer: Some("https://example.com/search".to_string()),
                ..Default::default()
            });
        let raw = from_automation_error(err, 1234);
        assert_eq!(raw.pages_completed, 3);
        assert_eq!(raw.error_kind.as_deref(), Some("navigation"));
        assert_eq!(raw.error_message.as_deref(), Some("net::ERR_CONNECTION_RESET"));
        assert_eq!(raw.elapsed_ms, 1234);
        assert!(!raw.succeeded);
    }

    #[test]
    fn missing_partial_is_synthesized() {
        let raw = from_automation_error(AutomationError::new(None, "boom"), 10);
        assert_eq!(raw.error_kind.as_deref(), Some("automation"));
        assert_eq!(raw.pages_completed, 0);
    }
}
