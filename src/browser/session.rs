//! 浏览器会话
//!
//! 会话的获取与释放由 `SessionProvider` 负责；执行器只借用会话，
//! 截止时间到达后还可以对会话做一次非阻塞的状态检查。

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::network::SetBlockedUrLsParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::Browser;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::infrastructure::JsExecutor;
use crate::models::Task;

/// 读取页面深度的脚本：优先读取自动化写入的计数，否则按历史记录估算
pub const PAGE_DEPTH_PROBE_JS: &str = r#"
(() => {
    const recorded = Number(window.sessionStorage.getItem('__fleet_pages_completed'));
    if (Number.isFinite(recorded) && recorded > 0) {
        return recorded;
    }
    return Math.max(window.history.length - 1, 0);
})()
"#;

/// 会话内的进度记录，自动化每完成一页写一次
#[derive(Debug, Default)]
pub struct SessionProgress {
    pages_completed: AtomicU32,
    last_url: Mutex<Option<String>>,
}

impl SessionProgress {
    /// 记录完成了一页
    pub fn record_page(&self, url: Option<&str>) {
        self.pages_completed.fetch_add(1, Ordering::SeqCst);
        if let Some(url) = url {
            *self.last_url.lock().unwrap_or_else(|e| e.into_inner()) = Some(url.to_string());
        }
    }

    /// 直接设置已完成页数（只增不减）
    pub fn observe_pages(&self, pages: u32) {
        self.pages_completed.fetch_max(pages, Ordering::SeqCst);
    }

    pub fn pages_completed(&self) -> u32 {
        self.pages_completed.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<String> {
        self.last_url.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// 截止时间到达后对会话的检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthProbe {
    /// 从会话状态中读到的页数
    Inspected(u32),
    /// 会话已不可用，使用本地记录的保守估计
    Estimated(u32),
}

impl DepthProbe {
    pub fn pages(self) -> u32 {
        match self {
            DepthProbe::Inspected(pages) | DepthProbe::Estimated(pages) => pages,
        }
    }
}

/// 一个可以执行页面自动化的会话
pub struct Session {
    id: String,
    progress: Arc<SessionProgress>,
    executor: Option<JsExecutor>,
    context_id: Option<BrowserContextId>,
}

impl Session {
    /// 不带页面的会话（由外部自动化自行管理页面）
    pub fn detached(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            progress: Arc::new(SessionProgress::default()),
            executor: None,
            context_id: None,
        }
    }

    /// 持有浏览器页面的会话
    pub fn with_page(
        id: impl Into<String>,
        executor: JsExecutor,
        context_id: Option<BrowserContextId>,
    ) -> Self {
        Self {
            id: id.into(),
            progress: Arc::new(SessionProgress::default()),
            executor: Some(executor),
            context_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn progress(&self) -> &SessionProgress {
        &self.progress
    }

    pub fn executor(&self) -> Option<&JsExecutor> {
        self.executor.as_ref()
    }

    /// 非阻塞地检查会话当前的页面深度
    ///
    /// 页面检查最多占用 `budget`；会话已失效时退回本地记录的页数。
    pub async fn inspect_depth(&self, budget: Duration) -> DepthProbe {
        let recorded = self.progress.pages_completed();
        let Some(executor) = &self.executor else {
            return DepthProbe::Inspected(recorded);
        };
        match executor
            .eval_with_timeout::<u32>(PAGE_DEPTH_PROBE_JS, budget)
            .await
        {
            Ok(depth) => DepthProbe::Inspected(depth.max(recorded)),
            Err(e) => {
                debug!("会话 {} 检查失败，使用本地记录: {}", self.id, e);
                DepthProbe::Estimated(recorded)
            }
        }
    }
}

/// 会话提供者（浏览器进程、配置文件、缓存的生命周期都在这一侧）
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// 为任务获取一个会话
    async fn acquire(&self, task: &Task) -> Result<Session, SessionError>;

    /// 释放会话，任何退出路径都会调用
    async fn release(&self, session: Session);
}

/// 基于 CDP 的会话提供者：每个任务一个独立的浏览器上下文与页面
pub struct CdpSessionProvider {
    browser: Arc<Browser>,
}

impl CdpSessionProvider {
    pub fn new(browser: Browser) -> Self {
        Self {
            browser: Arc::new(browser),
        }
    }

    /// 连接到已启动的浏览器
    pub async fn connect(port: u16) -> Result<Self, SessionError> {
        let browser = super::connection::connect_to_browser(port)
            .await
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(browser))
    }

    /// 启动无头浏览器
    pub async fn launch(executable: Option<&std::path::Path>) -> Result<Self, SessionError> {
        let browser = super::headless::launch_headless_browser(executable)
            .await
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(browser))
    }

    async fn create_context(&self, task: &Task) -> Result<Option<BrowserContextId>, SessionError> {
        let Some(proxy) = &task.proxy_assignment else {
            return Ok(None);
        };
        let mut builder = CreateBrowserContextParams::builder()
            .dispose_on_detach(true)
            .proxy_server(proxy.server.clone());
        if let Some(bypass) = &proxy.bypass_list {
            builder = builder.proxy_bypass_list(bypass.clone());
        }
        let params = builder.build();

        let response = self
            .browser
            .execute(params)
            .await
            .map_err(|e| SessionError::CreationFailed(format!("代理上下文 {}: {}", proxy.server, e)))?;
        Ok(Some(response.result.browser_context_id))
    }
}

#[async_trait]
impl SessionProvider for CdpSessionProvider {
    async fn acquire(&self, task: &Task) -> Result<Session, SessionError> {
        let context_id = self.create_context(task).await?;

        let mut target = CreateTargetParams::new("about:blank");
        target.browser_context_id = context_id.clone();

        let page = match self.browser.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                if let Some(id) = context_id {
                    let _ = self.browser.execute(DisposeBrowserContextParams::new(id)).await;
                }
                return Err(SessionError::CreationFailed(e.to_string()));
            }
        };

        let session_id = format!("session-{}", task.allocation_key);
        if let Some(patterns) = blocked_url_patterns(task) {
            let count = patterns.len();
            match page.execute(SetBlockedUrLsParams::new(patterns)).await {
                Ok(_) => debug!("会话 {} 已屏蔽 {} 类资源", session_id, count),
                Err(e) => warn!("⚠️ 会话 {} 设置资源屏蔽失败: {}", session_id, e),
            }
        }
        info!("✓ 会话已创建: {}", session_id);
        Ok(Session::with_page(session_id, JsExecutor::new(page), context_id))
    }

    async fn release(&self, session: Session) {
        let Session {
            id,
            executor,
            context_id,
            ..
        } = session;

        if let Some(executor) = executor {
            if let Err(e) = executor.into_page().close().await {
                warn!("⚠️ 关闭会话 {} 的页面失败: {}", id, e);
            }
        }
        if let Some(context_id) = context_id {
            if let Err(e) = self
                .browser
                .execute(DisposeBrowserContextParams::new(context_id))
                .await
            {
                warn!("⚠️ 销毁会话 {} 的浏览器上下文失败: {}", id, e);
            }
        }
        debug!("会话已释放: {}", id);
    }
}

/// 任务要求屏蔽的资源 URL 模式（去掉空白项）
fn blocked_url_patterns(task: &Task) -> Option<Vec<String>> {
    let patterns: Vec<String> = task
        .excluded_resources
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    (!patterns.is_empty()).then_some(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detached_session_reports_recorded_progress() {
        let session = Session::detached("s-1");
        session.progress().record_page(Some("https://example.com/search?page=1"));
        session.progress().record_page(None);
        assert_eq!(
            session.inspect_depth(Duration::from_millis(10)).await,
            DepthProbe::Inspected(2)
        );
        assert_eq!(
            session.progress().last_url().as_deref(),
            Some("https://example.com/search?page=1")
        );
    }

    #[test]
    fn observed_pages_never_decrease() {
        let progress = SessionProgress::default();
        progress.observe_pages(4);
        progress.observe_pages(2);
        assert_eq!(progress.pages_completed(), 4);
    }

    #[test]
    fn excluded_resources_become_blocked_patterns() {
        let mut task = Task {
            allocation_key: "k".to_string(),
            query: "q".to_string(),
            target_id: "t".to_string(),
            work_type: crate::models::WorkType::Rank,
            proxy_assignment: None,
            excluded_resources: vec![" *.png ".to_string(), "".to_string(), "*/ads/*".to_string()],
            deadline_ms: 90_000,
        };
        assert_eq!(
            blocked_url_patterns(&task),
            Some(vec!["*.png".to_string(), "*/ads/*".to_string()])
        );

        task.excluded_resources = vec!["  ".to_string()];
        assert_eq!(blocked_url_patterns(&task), None);
    }
}
