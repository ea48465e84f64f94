use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::work_type::WorkType;

/// 未指定截止时间时使用的默认值（毫秒）
pub const DEFAULT_TASK_DEADLINE_MS: u64 = 90_000;

/// 代理分配
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyAssignment {
    /// 代理地址，例如 `http://10.0.0.2:3128`
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bypass_list: Option<String>,
}

/// 由 hub 分配的一条任务，分配后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// 分配键，关联本次分配与结果提交
    pub allocation_key: String,
    /// 检索词
    pub query: String,
    /// 目标标识
    pub target_id: String,
    pub work_type: WorkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_assignment: Option<ProxyAssignment>,
    /// 需要屏蔽的资源（URL 模式）
    #[serde(default)]
    pub excluded_resources: Vec<String>,
    /// 截止时间（毫秒），0 表示由客户端填充默认值
    #[serde(default)]
    pub deadline_ms: u64,
}

impl Task {
    /// 单个任务的硬截止时间
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// 截止时间缺省时填充默认值
    pub fn with_default_deadline(mut self, default_ms: u64) -> Self {
        if self.deadline_ms == 0 {
            self.deadline_ms = default_ms;
        }
        self
    }
}
