//! 任务处理上下文
//!
//! 封装"哪个工作者正在处理哪条任务"这一信息

use std::fmt::Display;

use crate::models::{Task, WorkType};
use crate::utils::logging::truncate_text;

/// 任务处理上下文
#[derive(Debug, Clone)]
pub struct TaskCtx {
    /// 工作者编号
    pub worker_id: usize,
    /// 分配键
    pub allocation_key: String,
    pub work_type: WorkType,
    /// 检索词预览（仅用于日志显示）
    pub query_preview: String,
}

impl TaskCtx {
    pub fn new(worker_id: usize, task: &Task) -> Self {
        Self {
            worker_id,
            allocation_key: task.allocation_key.clone(),
            work_type: task.work_type,
            query_preview: truncate_text(&task.query, 40),
        }
    }
}

impl Display for TaskCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[工作者 {} 任务#{} 类型#{}]",
            self.worker_id, self.allocation_key, self.work_type
        )
    }
}
