//! 工作者状态（仅由所属循环写入，外部只读）

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::task::Task;

/// 工作者所处阶段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum WorkerStatus {
    #[default]
    Idle,
    Requesting,
    Executing,
    Submitting,
    Completed,
    Error,
}

/// 单个工作者的状态快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerState {
    pub id: usize,
    pub status: WorkerStatus,
    pub current_task: Option<Task>,
    pub last_update: DateTime<Utc>,
}

impl WorkerState {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            status: WorkerStatus::Idle,
            current_task: None,
            last_update: Utc::now(),
        }
    }

    /// 是否持有进行中的任务
    pub fn has_task_in_flight(&self) -> bool {
        self.current_task.is_some()
    }
}
