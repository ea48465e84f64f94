use thiserror::Error;

use crate::models::RawOutcome;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 任务分配错误
    #[error("分配错误: {0}")]
    Allocation(#[from] AllocationError),
    /// 结果提交错误
    #[error("提交错误: {0}")]
    Submission(#[from] SubmissionError),
    /// 浏览器会话错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 页面自动化错误
    #[error("自动化错误: {0}")]
    Automation(#[from] AutomationError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

// ========== 分配 ==========

/// 分配错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationErrorKind {
    /// hub 明确表示该工作者不会再有任务
    NoWork,
    /// hub 暂时没有可用资源（代理、配额等）
    NoResource,
    /// 网络或服务端的暂时性故障
    Transient,
    /// hub 已完成分配但任务无法解析；重发会再分配一条，不可重试
    Malformed,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct AllocationError {
    pub kind: AllocationErrorKind,
    pub message: String,
}

impl AllocationError {
    pub fn new(kind: AllocationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn no_work() -> Self {
        Self::new(AllocationErrorKind::NoWork, "hub 已无可分配任务")
    }

    pub fn is_transient(&self) -> bool {
        self.kind == AllocationErrorKind::Transient
    }
}

// ========== 提交 ==========

/// 提交错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionErrorKind {
    /// 分配键无效、过期或已提交
    InvalidKey,
    /// 服务端内部错误
    ServerFault,
    /// 网络或网关的暂时性故障
    Transient,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct SubmissionError {
    pub kind: SubmissionErrorKind,
    pub message: String,
}

impl SubmissionError {
    pub fn new(kind: SubmissionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == SubmissionErrorKind::Transient
    }
}

// ========== 会话 ==========

/// 浏览器会话错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器: {0}")]
    ConnectionFailed(String),
    /// 创建页面或浏览器上下文失败
    #[error("创建会话失败: {0}")]
    CreationFailed(String),
    /// 会话已失效
    #[error("会话已失效: {0}")]
    Gone(String),
}

// ========== 自动化 ==========

/// 页面自动化抛出的错误，可附带部分结果
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AutomationError {
    pub kind: Option<String>,
    pub message: String,
    pub partial: Option<RawOutcome>,
}

impl AutomationError {
    pub fn new(kind: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            partial: None,
        }
    }

    pub fn with_partial(mut self, partial: RawOutcome) -> Self {
        self.partial = Some(partial);
        self
    }
}

// ========== 配置 ==========

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取或解析失败
    #[error("配置文件 {path} 加载失败: {reason}")]
    FileLoadFailed { path: String, reason: String },
    /// 取值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: String, reason: String },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Session(SessionError::CreationFailed(err.to_string()))
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::Config(ConfigError::Invalid {
            field: "signatures".to_string(),
            reason: err.to_string(),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建配置项不合法错误
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_helpers() {
        assert!(AllocationError::new(AllocationErrorKind::Transient, "x").is_transient());
        assert!(!AllocationError::no_work().is_transient());
        assert!(!AllocationError::new(AllocationErrorKind::Malformed, "x").is_transient());
        assert!(SubmissionError::new(SubmissionErrorKind::Transient, "x").is_transient());
        assert!(!SubmissionError::new(SubmissionErrorKind::InvalidKey, "x").is_transient());
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppError>();
    }
}
