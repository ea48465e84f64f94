//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：连接或启动浏览器、创建 hub 客户端、组装调度器
//! 2. **运行**：启动工作者、状态监控与 Ctrl-C 处理，等待完成闩
//! 3. **全局统计**：输出最终快照
//!
//! 只有本模块持有浏览器，工作者只通过 `SessionProvider` 借用会话。

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::browser::{CdpSessionProvider, PageAutomation, ScriptedAutomation, SessionProvider};
use crate::clients::{HttpHubClient, HubClient};
use crate::config::Config;
use crate::orchestrator::monitor;
use crate::orchestrator::scheduler::{FleetSnapshot, HubFactory, SchedulerSettings, WorkScheduler};
use crate::services::{BlockCorrelationDetector, OutcomeClassifier};
use crate::utils::logging::{log_startup, print_final_stats};
use crate::workflow::TaskExecutor;

/// 应用主结构
pub struct App {
    config: Config,
    scheduler: WorkScheduler,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let sessions: Arc<dyn SessionProvider> = match config.browser_debug_port {
            Some(port) => Arc::new(CdpSessionProvider::connect(port).await?),
            None => Arc::new(
                CdpSessionProvider::launch(config.browser_executable.as_deref().map(Path::new))
                    .await?,
            ),
        };

        let automation: Arc<dyn PageAutomation> = match &config.automation_script_path {
            Some(path) => {
                let script = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("无法读取自动化脚本: {}", path))?;
                info!("✓ 已加载自动化脚本: {}", path);
                Arc::new(ScriptedAutomation::new(&config.entry_url_template, script))
            }
            None => Arc::new(ScriptedAutomation::with_default_script(
                &config.entry_url_template,
            )),
        };

        let hub = HttpHubClient::new(&config)?;
        let hubs: HubFactory = Arc::new(move |_| Arc::new(hub.clone()) as Arc<dyn HubClient>);

        let scheduler = WorkScheduler::new(
            hubs,
            TaskExecutor::new(sessions, automation),
            OutcomeClassifier::new(&config.classifier)?,
            Arc::new(BlockCorrelationDetector::new(config.backoff)),
            SchedulerSettings::from_config(&config),
        )
        .with_submit_retry(config.submit_retry);

        Ok(Self { config, scheduler })
    }

    /// 运行应用主逻辑，直到所有工作者退出
    pub async fn run(&self) -> Result<FleetSnapshot> {
        let stop = self.scheduler.stop_handle();
        let completion = self.scheduler.start(self.config.worker_count).await;

        let monitor = monitor::spawn(
            self.scheduler.view(),
            Duration::from_millis(self.config.status_report_interval_ms),
            self.scheduler.stop_signal(),
        );

        let ctrl_c = tokio::spawn({
            let stop = stop.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("⚠️ 收到中断信号，工作者将在本轮结束后退出");
                    stop.stop();
                }
            }
        });

        completion.wait().await;
        ctrl_c.abort();

        // 结束状态监控
        stop.stop();
        if let Some(monitor) = monitor {
            let _ = monitor.await;
        }

        let snapshot = self.scheduler.snapshot();
        print_final_stats(&snapshot);
        Ok(snapshot)
    }
}
