//! 结果上报服务 - 业务能力层
//!
//! 把分类结果提交给 hub：暂时性故障按重试策略退避重试，
//! 最终失败只记日志并丢弃，绝不阻塞或中断工作者循环。

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::HubClient;
use crate::error::SubmissionError;
use crate::models::ClassifiedResult;
use crate::retry::RetryPolicy;
use crate::services::fleet_counters::FleetCounters;

/// 一次提交的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// hub 已确认
    Acknowledged { attempts: u32 },
    /// 已放弃
    Dropped { attempts: u32, reason: String },
}

impl SubmitOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, SubmitOutcome::Acknowledged { .. })
    }
}

/// 结果上报器（每个工作者一个，与其 hub 客户端绑定）
pub struct ResultReporter {
    worker_id: usize,
    hub: Arc<dyn HubClient>,
    retry: RetryPolicy,
    counters: Arc<FleetCounters>,
}

impl ResultReporter {
    pub fn new(
        worker_id: usize,
        hub: Arc<dyn HubClient>,
        retry: RetryPolicy,
        counters: Arc<FleetCounters>,
    ) -> Self {
        Self {
            worker_id,
            hub,
            retry,
            counters,
        }
    }

    /// 更新计数并提交结果
    ///
    /// 计数在提交之前更新，因此即使提交最终失败，计数也反映最近一次分类。
    pub async fn submit(&self, result: &ClassifiedResult) -> SubmitOutcome {
        self.counters.record_classification(result.status);

        let op_name = format!("[工作者 {}] 提交结果 {}", self.worker_id, result.allocation_key);
        let (outcome, attempts) = self
            .retry
            .run(&op_name, SubmissionError::is_transient, |_| {
                self.hub.submit(result)
            })
            .await;

        match outcome {
            Ok(()) => {
                info!(
                    "[工作者 {}] ✓ 结果已提交: {} → {} (尝试 {} 次)",
                    self.worker_id, result.allocation_key, result.status, attempts
                );
                SubmitOutcome::Acknowledged { attempts }
            }
            Err(e) => {
                self.counters.record_dropped_submission();
                if e.is_transient() {
                    error!(
                        "[工作者 {}] ❌ 重试 {} 次后仍无法提交，丢弃结果 {} ({}): {}",
                        self.worker_id, attempts, result.allocation_key, result.status, e
                    );
                } else {
                    warn!(
                        "[工作者 {}] ⚠️ hub 拒绝结果 {} ({})，丢弃: {}",
                        self.worker_id, result.allocation_key, result.status, e
                    );
                }
                SubmitOutcome::Dropped {
                    attempts,
                    reason: e.to_string(),
                }
            }
        }
    }
}
