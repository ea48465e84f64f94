/// 日志工具模块
///
/// 提供日志初始化、启动横幅与统计输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::WorkerStatus;
use crate::orchestrator::FleetSnapshot;

/// 初始化全局日志
///
/// 优先使用 `RUST_LOG`；未设置时按 `verbose` 选择 `debug` 或 `info`。
/// 重复调用是安全的（测试中会多次调用）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 集群工作者模式");
    info!("📊 工作者数量: {}", config.worker_count);
    info!("🔁 运行模式: {}", config.run_mode);
    info!("🌐 Hub 地址: {}", config.hub_base_url);
    info!(
        "⏱️ 任务截止: {}s, 基础等待: {}s, 关联封锁等待: {}s",
        config.task_deadline_ms / 1000,
        config.backoff.base_delay_ms / 1000,
        config.backoff.extended_delay_ms / 1000
    );
    info!("{}", "=".repeat(60));
}

/// 记录一次集群状态
pub fn log_snapshot(snapshot: &FleetSnapshot) {
    let count = |status: WorkerStatus| {
        snapshot
            .workers
            .iter()
            .filter(|w| w.status == status)
            .count()
    };
    let c = &snapshot.counters;
    info!(
        "📈 状态: 执行中 {} / 提交中 {} / 空闲 {} / 异常 {} | 分配 {} 完成 {} 失败 {} 封锁 {} 丢弃 {}{}",
        count(WorkerStatus::Executing),
        count(WorkerStatus::Submitting),
        count(WorkerStatus::Idle),
        count(WorkerStatus::Error),
        c.assigned,
        c.completed,
        c.failed,
        c.blocked,
        c.dropped_submissions,
        if snapshot.correlated {
            format!(" | ⚠️ 关联封锁 ({} 个工作者)", snapshot.blocked_workers)
        } else {
            String::new()
        }
    );
}

/// 打印最终统计信息
pub fn print_final_stats(snapshot: &FleetSnapshot) {
    let c = &snapshot.counters;
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📥 分配: {}", c.assigned);
    info!("✅ 完成: {}/{}", c.completed, c.assigned);
    info!("❌ 失败: {} (其中封锁 {})", c.failed, c.blocked);
    info!("🗑️ 丢弃的提交: {}", c.dropped_submissions);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（按字符计）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
