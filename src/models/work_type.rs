//! 任务类型及其经验参数
//!
//! 页数上限与部分成功阈值都是针对目标站点行为调出来的经验值，
//! 不能从原理推导，站点改版后需要重新验证。

use serde::{Deserialize, Serialize};

/// Rank 任务最多翻页数
pub const RANK_MAX_PAGES: u32 = 10;
/// Rank 任务超时后视为部分成功的最少完成页数
pub const RANK_PARTIAL_SUCCESS_THRESHOLD: u32 = 5;
/// Click 任务最多翻页数
pub const CLICK_MAX_PAGES: u32 = 10;
/// Click 任务超时后视为部分成功的最少完成页数
pub const CLICK_PARTIAL_SUCCESS_THRESHOLD: u32 = 5;
/// Info 任务只访问一个页面
pub const INFO_MAX_PAGES: u32 = 1;
/// Info 任务超时后视为部分成功的最少完成页数
pub const INFO_PARTIAL_SUCCESS_THRESHOLD: u32 = 1;

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkType {
    /// 排名检索：逐页翻找目标
    Rank,
    /// 点击：找到目标后点击进入
    Click,
    /// 信息：直接访问单个页面
    Info,
}

/// 某一任务类型的分类参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkTypeProfile {
    /// 预期最大翻页数
    pub max_pages: u32,
    /// 超时后判定为部分成功的页数阈值
    pub partial_success_threshold: u32,
    /// 正常完成时是否一定会留下来源页（referrer）痕迹
    pub expects_referrer_trail: bool,
}

impl WorkType {
    /// 获取该类型的分类参数
    pub fn profile(self) -> WorkTypeProfile {
        match self {
            WorkType::Rank => WorkTypeProfile {
                max_pages: RANK_MAX_PAGES,
                partial_success_threshold: RANK_PARTIAL_SUCCESS_THRESHOLD,
                expects_referrer_trail: true,
            },
            WorkType::Click => WorkTypeProfile {
                max_pages: CLICK_MAX_PAGES,
                partial_success_threshold: CLICK_PARTIAL_SUCCESS_THRESHOLD,
                expects_referrer_trail: true,
            },
            WorkType::Info => WorkTypeProfile {
                max_pages: INFO_MAX_PAGES,
                partial_success_threshold: INFO_PARTIAL_SUCCESS_THRESHOLD,
                expects_referrer_trail: false,
            },
        }
    }

    /// 协议中使用的编码
    pub fn code(self) -> &'static str {
        match self {
            WorkType::Rank => "rank",
            WorkType::Click => "click",
            WorkType::Info => "info",
        }
    }

    /// 从协议编码解析（忽略大小写）
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "rank" => Some(WorkType::Rank),
            "click" => Some(WorkType::Click),
            "info" => Some(WorkType::Info),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_profile_matches_tuned_constants() {
        let profile = WorkType::Rank.profile();
        assert_eq!(profile.max_pages, 10);
        assert_eq!(profile.partial_success_threshold, 5);
        assert!(profile.expects_referrer_trail);
    }

    #[test]
    fn from_code_ignores_case_and_whitespace() {
        assert_eq!(WorkType::from_code(" Rank "), Some(WorkType::Rank));
        assert_eq!(WorkType::from_code("CLICK"), Some(WorkType::Click));
        assert_eq!(WorkType::from_code("lookup"), None);
    }

    #[test]
    fn deserializes_lowercase_wire_code() {
        let wt: WorkType = serde_json::from_str("\"info\"").unwrap();
        assert_eq!(wt, WorkType::Info);
    }
}
