//! # Fleet Agent
//!
//! 从协调服务（hub）拉取检索任务、通过浏览器自动化执行、分类结果并上报的集群工作者
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `browser/` - 连接或启动浏览器、会话提供者、页面自动化
//! - `clients/` - hub 客户端（申请任务、提交结果、健康检查）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不持有任务
//! - `OutcomeClassifier` - 原始结果 → 最终状态的决策表
//! - `BlockCorrelationDetector` - 跨工作者封锁关联与退避建议
//! - `ResultReporter` - 带重试的结果上报与聚合计数
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一条任务"的执行流程
//! - `TaskCtx` - 上下文封装（工作者编号 + 分配键）
//! - `TaskExecutor` - 获取会话 → 与截止时间赛跑 → 释放会话
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/scheduler` - 工作调度器，管理 N 个工作者循环与运行模式
//! - `orchestrator/worker_loop` - 单个工作者循环
//! - `orchestrator/app` - 应用入口，管理资源
//!
//! ## 模块结构

pub mod browser;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{ClassifiedResult, OutcomeStatus, RawOutcome, Task, WorkType};
pub use orchestrator::{App, FleetSnapshot, RunMode, WorkScheduler};
pub use retry::RetryPolicy;
pub use workflow::{TaskCtx, TaskExecutor};
