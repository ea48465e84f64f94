//! 跨工作者封锁关联检测 - 业务能力层
//!
//! 单个工作者被封多半是代理质量问题；多个独立工作者在短时间窗口内接连被封，
//! 说明目标站点已对整个集群提升检测等级，所有工作者都需要统一放慢。

use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 进程级退避配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// 未出现关联封锁时每轮之间的等待
    pub base_delay_ms: u64,
    /// 出现关联封锁时每轮之间的等待
    pub extended_delay_ms: u64,
    /// 封锁事件的滑动窗口
    pub window_ms: u64,
    /// 判定为关联封锁所需的不同工作者数
    pub min_workers_for_escalation: usize,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 5_000,
            extended_delay_ms: 60_000,
            window_ms: 120_000,
            min_workers_for_escalation: 2,
        }
    }
}

impl BackoffPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn extended_delay(&self) -> Duration {
        Duration::from_millis(self.extended_delay_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// 一次封锁事件
#[derive(Debug, Clone)]
pub struct BlockEvent {
    pub worker_id: usize,
    pub timestamp: Instant,
    pub reason_code: String,
}

/// 封锁关联检测器
///
/// 进程内只有一个实例，所有修改都在互斥锁内串行完成。
pub struct BlockCorrelationDetector {
    policy: BackoffPolicy,
    events: Mutex<VecDeque<BlockEvent>>,
}

impl BlockCorrelationDetector {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// 记录一次封锁，并清理窗口外的事件
    pub fn record_block(&self, worker_id: usize, reason_code: impl Into<String>) {
        let now = Instant::now();
        let reason_code = reason_code.into();
        let mut events = self.lock_events();
        Self::prune(&mut events, now, self.policy.window());
        debug!("[工作者 {}] 记录封锁事件: {}", worker_id, reason_code);
        events.push_back(BlockEvent {
            worker_id,
            timestamp: now,
            reason_code,
        });

        let distinct = Self::distinct_workers(&events);
        if distinct >= self.policy.min_workers_for_escalation {
            warn!(
                "🚨 {} 个工作者在 {}s 内被封锁，集群进入延长退避",
                distinct,
                self.policy.window_ms / 1000
            );
        }
    }

    /// 窗口内是否有足够多的不同工作者被封锁
    pub fn is_correlated(&self) -> bool {
        self.distinct_blocked_workers() >= self.policy.min_workers_for_escalation
    }

    /// 窗口内被封锁的不同工作者数量
    pub fn distinct_blocked_workers(&self) -> usize {
        let mut events = self.lock_events();
        Self::prune(&mut events, Instant::now(), self.policy.window());
        Self::distinct_workers(&events)
    }

    /// 当前建议的轮间等待
    pub fn recommended_delay(&self) -> Duration {
        if self.is_correlated() {
            self.policy.extended_delay()
        } else {
            self.policy.base_delay()
        }
    }

    /// 窗口内仍然有效的事件数
    pub fn live_event_count(&self) -> usize {
        let mut events = self.lock_events();
        Self::prune(&mut events, Instant::now(), self.policy.window());
        events.len()
    }

    fn lock_events(&self) -> std::sync::MutexGuard<'_, VecDeque<BlockEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    // 事件按时间顺序追加，只需从队头弹出
    fn prune(events: &mut VecDeque<BlockEvent>, now: Instant, window: Duration) {
        while let Some(front) = events.front() {
            if now.saturating_duration_since(front.timestamp) >= window {
                events.pop_front();
            } else {
                break;
            }
        }
    }

    fn distinct_workers(events: &VecDeque<BlockEvent>) -> usize {
        events
            .iter()
            .map(|e| e.worker_id)
            .collect::<HashSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> BlockCorrelationDetector {
        BlockCorrelationDetector::new(BackoffPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn single_worker_is_not_correlated() {
        let d = detector();
        d.record_block(1, "captcha");
        d.record_block(1, "captcha");
        assert!(!d.is_correlated());
        assert_eq!(d.recommended_delay(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn two_distinct_workers_within_window_escalate() {
        let d = detector();
        d.record_block(1, "captcha");
        tokio::time::advance(Duration::from_secs(10)).await;
        d.record_block(2, "connection_reset");
        assert!(d.is_correlated());
        assert_eq!(d.recommended_delay(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn correlation_reverts_once_events_age_out() {
        let d = detector();
        d.record_block(1, "captcha");
        tokio::time::advance(Duration::from_secs(30)).await;
        d.record_block(2, "captcha");
        assert!(d.is_correlated());

        // 第一条事件过期，只剩 worker 2
        tokio::time::advance(Duration::from_secs(91)).await;
        assert!(!d.is_correlated());
        assert_eq!(d.live_event_count(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(d.live_event_count(), 0);
        assert_eq!(d.recommended_delay(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_stays_extended_while_correlation_persists() {
        let d = detector();
        d.record_block(1, "captcha");
        d.record_block(2, "captcha");
        for worker in 3..8 {
            tokio::time::advance(Duration::from_secs(20)).await;
            d.record_block(worker, "captcha");
            assert_eq!(d.recommended_delay(), Duration::from_secs(60));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn events_outside_window_are_not_retained() {
        let d = BlockCorrelationDetector::new(BackoffPolicy {
            window_ms: 1_000,
            ..BackoffPolicy::default()
        });
        d.record_block(1, "captcha");
        tokio::time::advance(Duration::from_millis(1_500)).await;
        d.record_block(2, "captcha");
        assert_eq!(d.live_event_count(), 1);
        assert!(!d.is_correlated());
    }
}
