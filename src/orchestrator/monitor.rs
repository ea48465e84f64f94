//! 周期性状态日志

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::orchestrator::scheduler::FleetView;
use crate::utils::logging::log_snapshot;

/// 按间隔输出集群快照，收到停止信号后退出
///
/// `interval` 为 0 时不启动。
pub fn spawn(
    view: FleetView,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // 第一次 tick 立即完成，跳过
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => log_snapshot(&view.snapshot()),
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("状态监控已停止");
    }))
}
