//! 自动化原始结果与分类结果

use serde::{Deserialize, Serialize};

/// 截止时间到达时合成结果使用的错误类型
pub const TIMEOUT_ERROR_KIND: &str = "timeout";

/// 页面自动化返回的原始结果
///
/// 即使自动化抛错或超时也一定存在：缺失时由执行器合成一个默认值。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOutcome {
    #[serde(default)]
    pub succeeded: bool,
    #[serde(default)]
    pub found: bool,
    #[serde(default)]
    pub pages_completed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl RawOutcome {
    /// 截止时间到达后合成的结果
    pub fn timed_out(pages_completed: u32, elapsed_ms: u64) -> Self {
        Self {
            pages_completed,
            error_kind: Some(TIMEOUT_ERROR_KIND.to_string()),
            error_message: Some(format!("任务在 {}ms 后达到截止时间", elapsed_ms)),
            elapsed_ms,
            ..Default::default()
        }
    }

    /// 自动化抛错且没有附带部分结果时合成的结果
    pub fn failed(error_kind: Option<String>, message: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            error_kind,
            error_message: Some(message.into()),
            elapsed_ms,
            ..Default::default()
        }
    }

    /// 是否带有错误类型
    pub fn has_error(&self) -> bool {
        self.error_kind.is_some()
    }

    /// 错误类型是否为超时
    pub fn is_timeout_kind(&self) -> bool {
        self.error_kind
            .as_deref()
            .is_some_and(|kind| kind.eq_ignore_ascii_case(TIMEOUT_ERROR_KIND))
    }
}

/// 最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    PartialSuccess,
    Blocked,
    Timeout,
    ProxyError,
    UnknownError,
}

impl OutcomeStatus {
    /// 是否属于自动化失败（Timeout / Blocked / ProxyError / UnknownError）
    pub fn is_failure(self) -> bool {
        !matches!(self, OutcomeStatus::Success | OutcomeStatus::PartialSuccess)
    }

    pub fn is_blocked(self) -> bool {
        self == OutcomeStatus::Blocked
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutcomeStatus::Success => "Success",
            OutcomeStatus::PartialSuccess => "PartialSuccess",
            OutcomeStatus::Blocked => "Blocked",
            OutcomeStatus::Timeout => "Timeout",
            OutcomeStatus::ProxyError => "ProxyError",
            OutcomeStatus::UnknownError => "UnknownError",
        };
        write!(f, "{}", name)
    }
}

/// 随结果上报的指标
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetrics {
    pub pages_completed: u32,
    pub elapsed_ms: u64,
    pub found: bool,
}

/// 分类后的结果，每个任务最多提交一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedResult {
    pub allocation_key: String,
    pub status: OutcomeStatus,
    /// 命中的判定规则说明
    pub detail: String,
    pub metrics: ResultMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_out_outcome_carries_timeout_kind() {
        let raw = RawOutcome::timed_out(4, 90_000);
        assert!(raw.is_timeout_kind());
        assert_eq!(raw.pages_completed, 4);
        assert!(!raw.succeeded);
    }

    #[test]
    fn deserializes_partial_automation_payload() {
        let raw: RawOutcome =
            serde_json::from_str(r#"{"succeeded":true,"found":true,"pagesCompleted":2}"#).unwrap();
        assert!(raw.succeeded && raw.found);
        assert_eq!(raw.pages_completed, 2);
        assert!(!raw.has_error());
    }

    #[test]
    fn failure_statuses() {
        assert!(!OutcomeStatus::Success.is_failure());
        assert!(!OutcomeStatus::PartialSuccess.is_failure());
        assert!(OutcomeStatus::Timeout.is_failure());
        assert!(OutcomeStatus::Blocked.is_blocked());
    }
}
