//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责工作者调度与生命周期，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行、清理）
//! - 持有浏览器资源，组装调度器
//! - 处理 Ctrl-C，输出全局统计信息
//!
//! ### `scheduler` - 工作调度器
//! - 启动 N 个错峰的工作者循环
//! - 运行模式（Continuous / Drain）与完成闩
//! - 停止信号、状态快照、事件订阅
//!
//! ### `worker_loop` - 单个工作者循环
//! - 申请 → 执行 → 分类 → 记录封锁 → 上报
//! - 按结果与关联封锁选择等待时间
//! - 在循环边界捕获错误与 panic
//!
//! ### `monitor` - 周期性状态日志
//!
//! ## 层次关系
//!
//! ```text
//! app (组装资源)
//!     ↓
//! scheduler (N 个 worker_loop)
//!     ↓
//! workflow::TaskExecutor (处理单个 Task)
//!     ↓
//! services (能力层：classifier / detector / reporter)
//!     ↓
//! browser / clients / infrastructure
//! ```
//!
//! ## 设计原则
//!
//! 1. **无共享队列**：任务分配完全由 hub 决定，工作者之间不协调
//! 2. **故障隔离**：单个工作者的错误不会影响其他工作者或调度器
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure

pub mod app;
pub mod monitor;
pub mod scheduler;
pub mod worker_loop;

// 重新导出主要类型
pub use app::App;
pub use scheduler::{
    ExitReason, FleetCompletion, FleetSnapshot, FleetView, HubFactory, RunMode,
    SchedulerSettings, StopHandle, WorkScheduler, WorkerEvent, WorkerExit,
};
pub use worker_loop::{choose_delay, CycleOutcome};
