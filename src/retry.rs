//! 重试策略
//!
//! 作为显式的值注入到 hub 客户端与结果上报器中，便于在没有网络的情况下测试。

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// 带上限的指数退避重试策略
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次）
    pub max_attempts: u32,
    /// 第一次重试前的等待
    pub initial_delay_ms: u64,
    /// 每次重试的等待倍数
    pub multiplier: f64,
    /// 单次等待上限
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// 只尝试一次，不重试
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 第 `retry` 次重试（从 0 开始）之前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(31) as i32);
        let delay_ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// 按策略执行 `op`，仅对 `is_transient` 判定为暂时性的错误重试
    ///
    /// 返回最后一次的结果以及实际尝试次数。
    pub async fn run<T, E, F, Fut>(
        &self,
        op_name: &str,
        is_transient: impl Fn(&E) -> bool,
        mut op: F,
    ) -> (Result<T, E>, u32)
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if is_transient(&e) && attempt < max_attempts => {
                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        "{} 暂时失败 (尝试 {}/{}): {}，{}ms 后重试",
                        op_name,
                        attempt,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}
