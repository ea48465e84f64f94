//! 结果分类服务 - 业务能力层
//!
//! 把自动化给出的嘈杂、不完整甚至互相矛盾的信号归并成唯一的最终状态。
//! 判定表按顺序求值，第一条命中的规则生效：
//!
//! 1. 超时且完成页数达到阈值 → `PartialSuccess`
//! 2. 超时且未达阈值 → `Timeout`
//! 3. 非超时错误命中封锁特征（协议层连接错误、验证码）→ `Blocked`
//! 4. 无错误，但缺少应有的来源页痕迹 → `Blocked`
//! 5. 无错误、未找到目标且翻页数不足预期（排除"无结果"）→ `Blocked`
//! 6. 命中代理层故障特征 → `ProxyError`
//! 7. 其余：成功 → `Success`，否则 → `UnknownError`

use regex::RegexSet;
use serde::Deserialize;

use crate::error::AppResult;
use crate::models::{ClassifiedResult, OutcomeStatus, RawOutcome, ResultMetrics, Task};

/// 封锁特征（正则，忽略大小写）
///
/// `ERR_BLOCKED_BY_CLIENT` / `ERR_BLOCKED_BY_RESPONSE` 是浏览器自身取消的请求，不算封锁。
pub const BLOCK_SIGNATURES: &[&str] = &[
    r"captcha",
    r"unusual traffic",
    r"\b(?:access|request|you)\s+(?:has\s+been\s+|have\s+been\s+|was\s+|were\s+|are\s+)?blocked\b",
    r"ERR_HTTP2_PROTOCOL_ERROR",
    r"ERR_CONNECTION_RESET",
    r"ERR_CONNECTION_CLOSED",
    r"ERR_EMPTY_RESPONSE",
    r"ERR_QUIC_PROTOCOL_ERROR",
];

/// 代理层故障特征（正则，忽略大小写）
pub const PROXY_SIGNATURES: &[&str] = &[
    r"proxy",
    r"ERR_TUNNEL_CONNECTION_FAILED",
    r"ERR_SOCKS_CONNECTION_FAILED",
    r"\b(?:HTTP|status)[\s/:]*(?:1\.[01]\s+)?407\b",
];

/// "无结果"哨兵
pub const NO_RESULTS_ERROR_KIND: &str = "no_results";
const NO_RESULTS_MESSAGE: &str = "no results";

/// 分类配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// 正常完成后来源页 URL 中应包含的标记
    pub referrer_marker: String,
    /// 额外的封锁特征（按字面子串匹配）
    pub extra_block_signatures: Vec<String>,
    /// 额外的代理故障特征（按字面子串匹配）
    pub extra_proxy_signatures: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            referrer_marker: "search".to_string(),
            extra_block_signatures: Vec::new(),
            extra_proxy_signatures: Vec::new(),
        }
    }
}

/// 结果分类器
///
/// `classify` 是全函数且确定：相同的 `(raw, task)` 总得到相同的结果。
pub struct OutcomeClassifier {
    referrer_marker: String,
    block_signatures: RegexSet,
    proxy_signatures: RegexSet,
}

impl OutcomeClassifier {
    pub fn new(config: &ClassifierConfig) -> AppResult<Self> {
        let block_signatures = build_signature_set(BLOCK_SIGNATURES, &config.extra_block_signatures)?;
        let proxy_signatures = build_signature_set(PROXY_SIGNATURES, &config.extra_proxy_signatures)?;
        Ok(Self {
            referrer_marker: config.referrer_marker.to_ascii_lowercase(),
            block_signatures,
            proxy_signatures,
        })
    }

    /// 对一次自动化结果做最终分类
    pub fn classify(&self, raw: &RawOutcome, task: &Task) -> ClassifiedResult {
        let (status, detail) = self.decide(raw, task);
        ClassifiedResult {
            allocation_key: task.allocation_key.clone(),
            status,
            detail,
            metrics: ResultMetrics {
                pages_completed: raw.pages_completed,
                elapsed_ms: raw.elapsed_ms,
                found: raw.found,
            },
        }
    }

    fn decide(&self, raw: &RawOutcome, task: &Task) -> (OutcomeStatus, String) {
        let profile = task.work_type.profile();
        let timed_out = raw.is_timeout_kind()
            || (task.deadline_ms > 0 && raw.elapsed_ms >= task.deadline_ms);

        if timed_out {
            if raw.pages_completed >= profile.partial_success_threshold {
                return (
                    OutcomeStatus::PartialSuccess,
                    format!(
                        "超时前已完成 {} 页 (阈值 {})",
                        raw.pages_completed, profile.partial_success_threshold
                    ),
                );
            }
            return (
                OutcomeStatus::Timeout,
                format!(
                    "超时，仅完成 {} 页 (阈值 {})",
                    raw.pages_completed, profile.partial_success_threshold
                ),
            );
        }

        let error_text = error_text(raw);
        if let Some(text) = &error_text {
            if self.block_signatures.is_match(text) {
                return (OutcomeStatus::Blocked, format!("命中封锁特征: {}", text));
            }
        }

        let no_results = is_no_results(raw);
        if !raw.has_error() && !no_results {
            if profile.expects_referrer_trail && !self.has_referrer_trail(raw) {
                return (
                    OutcomeStatus::Blocked,
                    format!("缺少来源页痕迹 (referrer: {:?})", raw.referrer),
                );
            }
            if !raw.found && raw.pages_completed < profile.max_pages {
                return (
                    OutcomeStatus::Blocked,
                    format!(
                        "未找到目标且翻页中断于第 {} 页 (预期 {})",
                        raw.pages_completed, profile.max_pages
                    ),
                );
            }
        }

        if let Some(text) = &error_text {
            if self.proxy_signatures.is_match(text) {
                return (OutcomeStatus::ProxyError, format!("命中代理故障特征: {}", text));
            }
        }

        if raw.succeeded {
            (OutcomeStatus::Success, "自动化正常完成".to_string())
        } else {
            (
                OutcomeStatus::UnknownError,
                format!("未识别的失败: {}", error_text.unwrap_or_default()),
            )
        }
    }

    fn has_referrer_trail(&self, raw: &RawOutcome) -> bool {
        raw.referrer
            .as_deref()
            .is_some_and(|r| r.to_ascii_lowercase().contains(&self.referrer_marker))
    }
}

fn build_signature_set(builtin: &[&str], extra: &[String]) -> AppResult<RegexSet> {
    let patterns = builtin
        .iter()
        .map(|p| format!("(?i){}", p))
        .chain(extra.iter().map(|s| format!("(?i){}", regex::escape(s))));
    Ok(RegexSet::new(patterns)?)
}

/// 错误类型与错误信息拼接后的文本
fn error_text(raw: &RawOutcome) -> Option<String> {
    match (&raw.error_kind, &raw.error_message) {
        (None, None) => None,
        (Some(kind), None) => Some(kind.clone()),
        (None, Some(message)) => Some(message.clone()),
        (Some(kind), Some(message)) => Some(format!("{}: {}", kind, message)),
    }
}

fn is_no_results(raw: &RawOutcome) -> bool {
    raw.error_kind
        .as_deref()
        .is_some_and(|k| k.eq_ignore_ascii_case(NO_RESULTS_ERROR_KIND))
        || raw
            .error_message
            .as_deref()
            .is_some_and(|m| m.to_ascii_lowercase().contains(NO_RESULTS_MESSAGE))
}
