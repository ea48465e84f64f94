use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use crate::error::{AppResult, ConfigError};
use crate::models::DEFAULT_TASK_DEADLINE_MS;
use crate::orchestrator::RunMode;
use crate::retry::RetryPolicy;
use crate::services::{BackoffPolicy, ClassifierConfig};

/// 程序配置
///
/// 加载顺序：默认值 ← `FLEET_CONFIG` 指定的 TOML 文件 ← 环境变量。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 并发工作者数量
    pub worker_count: usize,
    /// 运行模式
    pub run_mode: RunMode,
    /// 第 i 个工作者首次申请任务前等待 i * start_stagger_ms
    pub start_stagger_ms: u64,
    /// hub 未给出截止时间时的默认值
    pub task_deadline_ms: u64,
    /// 暂无任务时的等待
    pub idle_backoff_ms: u64,
    /// 一轮出错后的冷却时间
    pub error_cooldown_ms: u64,
    /// 每轮等待附加的随机抖动上限
    pub max_jitter_ms: u64,
    // --- hub 配置 ---
    pub hub_base_url: String,
    pub hub_token: Option<String>,
    pub hub_request_timeout_ms: u64,
    pub hub_retry: RetryPolicy,
    pub submit_retry: RetryPolicy,
    // --- 浏览器配置 ---
    /// 已启动浏览器的调试端口；为空时启动无头浏览器
    pub browser_debug_port: Option<u16>,
    /// 无头模式下的浏览器可执行文件
    pub browser_executable: Option<String>,
    /// 自动化脚本路径
    pub automation_script_path: Option<String>,
    /// 入口地址模板，`{query}` 会被替换为编码后的检索词
    pub entry_url_template: String,
    // --- 退避与分类 ---
    pub backoff: BackoffPolicy,
    pub classifier: ClassifierConfig,
    /// 周期性状态日志间隔，0 表示关闭
    pub status_report_interval_ms: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: 4,
            run_mode: RunMode::Continuous,
            start_stagger_ms: 2_000,
            task_deadline_ms: DEFAULT_TASK_DEADLINE_MS,
            idle_backoff_ms: 10_000,
            error_cooldown_ms: 30_000,
            max_jitter_ms: 1_000,
            hub_base_url: "http://127.0.0.1:8080/api".to_string(),
            hub_token: None,
            hub_request_timeout_ms: 30_000,
            hub_retry: RetryPolicy::default(),
            submit_retry: RetryPolicy::default(),
            browser_debug_port: None,
            browser_executable: None,
            automation_script_path: None,
            entry_url_template: "https://www.google.com/search?q={query}".to_string(),
            backoff: BackoffPolicy::default(),
            classifier: ClassifierConfig::default(),
            status_report_interval_ms: 60_000,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 按 默认值 → 配置文件 → 环境变量 的顺序加载并校验
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("FLEET_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_toml_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 只从环境变量加载（其余取默认值）
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载，缺省字段取默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let load_failed = |reason: String| ConfigError::FileLoadFailed {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
        let config: Config = toml::from_str(&content).map_err(|e| load_failed(e.to_string()))?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::FileLoadFailed {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// 用环境变量覆盖已有取值
    pub fn with_env_overrides(mut self) -> AppResult<Self> {
        self.worker_count = env_parse("WORKER_COUNT", self.worker_count)?;
        if let Some(mode) = env_string("RUN_MODE") {
            self.run_mode = mode.parse().map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: "RUN_MODE".to_string(),
                value: mode.clone(),
                expected_type: "continuous | drain".to_string(),
            })?;
        }
        self.start_stagger_ms = env_parse("START_STAGGER_MS", self.start_stagger_ms)?;
        self.task_deadline_ms = env_parse("TASK_DEADLINE_MS", self.task_deadline_ms)?;
        self.idle_backoff_ms = env_parse("IDLE_BACKOFF_MS", self.idle_backoff_ms)?;
        self.error_cooldown_ms = env_parse("ERROR_COOLDOWN_MS", self.error_cooldown_ms)?;
        self.max_jitter_ms = env_parse("MAX_JITTER_MS", self.max_jitter_ms)?;
        self.hub_base_url = env_string("HUB_BASE_URL").unwrap_or(self.hub_base_url);
        self.hub_token = env_string("HUB_TOKEN").or(self.hub_token);
        self.hub_request_timeout_ms =
            env_parse("HUB_REQUEST_TIMEOUT_MS", self.hub_request_timeout_ms)?;
        self.submit_retry.max_attempts =
            env_parse("SUBMIT_MAX_ATTEMPTS", self.submit_retry.max_attempts)?;
        if let Some(port) = env_string("BROWSER_DEBUG_PORT") {
            self.browser_debug_port = Some(parse_value("BROWSER_DEBUG_PORT", &port)?);
        }
        self.browser_executable = env_string("BROWSER_EXECUTABLE").or(self.browser_executable);
        self.automation_script_path =
            env_string("AUTOMATION_SCRIPT").or(self.automation_script_path);
        self.entry_url_template = env_string("ENTRY_URL_TEMPLATE").unwrap_or(self.entry_url_template);
        self.backoff.base_delay_ms = env_parse("BASE_DELAY_MS", self.backoff.base_delay_ms)?;
        self.backoff.extended_delay_ms =
            env_parse("EXTENDED_DELAY_MS", self.backoff.extended_delay_ms)?;
        self.backoff.window_ms = env_parse("BLOCK_WINDOW_MS", self.backoff.window_ms)?;
        self.backoff.min_workers_for_escalation = env_parse(
            "MIN_WORKERS_FOR_ESCALATION",
            self.backoff.min_workers_for_escalation,
        )?;
        self.status_report_interval_ms =
            env_parse("STATUS_REPORT_INTERVAL_MS", self.status_report_interval_ms)?;
        self.verbose_logging = env_parse("VERBOSE_LOGGING", self.verbose_logging)?;
        Ok(self)
    }

    /// 校验取值
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        };
        if self.worker_count == 0 {
            return Err(invalid("worker_count", "至少需要一个工作者"));
        }
        if self.hub_retry.max_attempts == 0 || self.submit_retry.max_attempts == 0 {
            return Err(invalid("max_attempts", "重试次数不能为 0"));
        }
        if self.backoff.window_ms == 0 {
            return Err(invalid("backoff.window_ms", "窗口不能为 0"));
        }
        if self.backoff.min_workers_for_escalation == 0 {
            return Err(invalid("backoff.min_workers_for_escalation", "不能为 0"));
        }
        if self.hub_base_url.trim().is_empty() {
            return Err(invalid("hub_base_url", "不能为空"));
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str, current: T) -> Result<T, ConfigError> {
    match env_string(name) {
        Some(value) => parse_value(name, &value),
        None => Ok(current),
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: name.to_string(),
            value: value.to_string(),
            expected_type: std::any::type_name::<T>().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.task_deadline_ms, 90_000);
        assert_eq!(config.backoff.min_workers_for_escalation, 2);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            worker_count = 8
            run_mode = "drain"

            [backoff]
            extended_delay_ms = 90000

            [submit_retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.run_mode, RunMode::Drain);
        assert_eq!(config.backoff.extended_delay_ms, 90_000);
        assert_eq!(config.backoff.base_delay_ms, 5_000);
        assert_eq!(config.submit_retry.max_attempts, 5);
        assert_eq!(config.hub_retry.max_attempts, 3);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        assert!(Config::from_toml_str("worker_count = \"many\"").is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = Config {
            worker_count: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "worker_count"
        ));
    }

    #[test]
    fn parse_value_reports_variable_name() {
        let err = parse_value::<u64>("IDLE_BACKOFF_MS", "soon").unwrap_err();
        assert!(err.to_string().contains("IDLE_BACKOFF_MS"));
    }
}
