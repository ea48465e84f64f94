//! 页面自动化
//!
//! 具体站点的导航与抽取不在本程序内实现：`ScriptedAutomation` 打开入口页后
//! 执行一段外部提供的脚本，由脚本负责翻页并返回原始结果。

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use url::form_urlencoded;

use crate::browser::session::Session;
use crate::error::AutomationError;
use crate::models::{RawOutcome, Task};

/// 页面自动化接口
#[async_trait]
pub trait PageAutomation: Send + Sync {
    /// 在会话中执行任务；出错时可在错误中附带部分结果
    async fn execute(&self, session: &Session, task: &Task) -> Result<RawOutcome, AutomationError>;
}

/// 未配置脚本时使用的默认脚本：只检查入口页是否包含目标
pub const DEFAULT_AUTOMATION_SCRIPT: &str = r#"
async (task) => {
    const text = document.body ? document.body.innerText : '';
    window.sessionStorage.setItem('__fleet_pages_completed', '1');
    return {
        succeeded: true,
        found: text.includes(task.targetId),
        pagesCompleted: 1,
        referrer: document.referrer || window.location.href,
    };
}
"#;

/// 脚本驱动的自动化
pub struct ScriptedAutomation {
    entry_url_template: String,
    script: String,
}

impl ScriptedAutomation {
    pub fn new(entry_url_template: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            entry_url_template: entry_url_template.into(),
            script: script.into(),
        }
    }

    /// 使用默认脚本
    pub fn with_default_script(entry_url_template: impl Into<String>) -> Self {
        Self::new(entry_url_template, DEFAULT_AUTOMATION_SCRIPT)
    }

    /// 由模板生成入口地址
    pub fn entry_url(&self, task: &Task) -> String {
        self.entry_url_template
            .replace("{query}", &encode_query(&task.query))
            .replace("{target}", &encode_query(&task.target_id))
    }

    fn build_script(&self, task: &Task) -> Result<String, AutomationError> {
        let task_json = serde_json::to_string(&json!({
            "allocationKey": task.allocation_key,
            "query": task.query,
            "targetId": task.target_id,
            "workType": task.work_type.code(),
            "excludedResources": task.excluded_resources,
            "maxPages": task.work_type.profile().max_pages,
        }))
        .map_err(|e| AutomationError::new(Some("script".to_string()), e.to_string()))?;

        Ok(format!("({})({})", self.script.trim(), task_json))
    }
}

#[async_trait]
impl PageAutomation for ScriptedAutomation {
    async fn execute(&self, session: &Session, task: &Task) -> Result<RawOutcome, AutomationError> {
        let executor = session.executor().ok_or_else(|| {
            AutomationError::new(Some("session".to_string()), "会话没有可用页面")
        })?;

        let url = self.entry_url(task);
        debug!("会话 {} 导航到: {}", session.id(), url);
        executor.page().goto(url.as_str()).await.map_err(|e| {
            AutomationError::new(Some("navigation".to_string()), e.to_string())
        })?;

        let script = self.build_script(task)?;
        let outcome: RawOutcome = executor.eval_as(script).await.map_err(|e| {
            let partial = RawOutcome {
                pages_completed: session.progress().pages_completed(),
                ..Default::default()
            };
            AutomationError::new(Some("script".to_string()), e.to_string()).with_partial(partial)
        })?;

        session.progress().observe_pages(outcome.pages_completed);
        Ok(outcome)
    }
}

/// 对检索词做 URL 编码（application/x-www-form-urlencoded）
fn encode_query(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
