//! 集群聚合计数器
//!
//! 计数只增不减，与封锁事件一样用互斥锁保护。

use serde::Serialize;
use std::sync::Mutex;

use crate::models::OutcomeStatus;

/// 计数器快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// 已分配到的任务数
    pub assigned: u64,
    /// 分类为成功或部分成功的任务数
    pub completed: u64,
    /// 分类为失败的任务数（含被封锁）
    pub failed: u64,
    /// 分类为被封锁的任务数
    pub blocked: u64,
    /// 重试耗尽后被丢弃的提交数
    pub dropped_submissions: u64,
}

#[derive(Debug, Default)]
pub struct FleetCounters {
    inner: Mutex<CounterSnapshot>,
}

impl FleetCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_assigned(&self) {
        self.update(|c| c.assigned += 1);
    }

    /// 按分类结果计数，在提交之前调用
    pub fn record_classification(&self, status: OutcomeStatus) {
        self.update(|c| {
            if status.is_failure() {
                c.failed += 1;
            } else {
                c.completed += 1;
            }
            if status.is_blocked() {
                c.blocked += 1;
            }
        });
    }

    pub fn record_dropped_submission(&self) {
        self.update(|c| c.dropped_submissions += 1);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut CounterSnapshot)) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_counts_as_failed_too() {
        let counters = FleetCounters::new();
        counters.record_assigned();
        counters.record_assigned();
        counters.record_classification(OutcomeStatus::Blocked);
        counters.record_classification(OutcomeStatus::PartialSuccess);

        let snap = counters.snapshot();
        assert_eq!(snap.assigned, 2);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.blocked, 1);
    }
}
