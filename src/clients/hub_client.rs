//! Hub API 客户端
//!
//! 封装与协调服务（hub）之间的全部调用：分配任务、提交结果、健康检查。
//! 每个工作者持有自己的客户端实例。

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::{
    AllocationError, AllocationErrorKind, AppError, AppResult, SubmissionError,
    SubmissionErrorKind,
};
use crate::models::{ClassifiedResult, Task};
use crate::retry::RetryPolicy;

/// hub 在资源不足时返回的响应体标记
const NO_RESOURCE_MARKER: &str = "no_resource";

/// hub 客户端接口
#[async_trait]
pub trait HubClient: Send + Sync {
    /// 为指定工作者申请一条任务；`Ok(None)` 表示当前暂无任务
    async fn allocate(&self, worker_id: usize) -> Result<Option<Task>, AllocationError>;

    /// 提交一条分类结果（单次尝试，重试由上报器负责）
    async fn submit(&self, result: &ClassifiedResult) -> Result<(), SubmissionError>;

    /// hub 是否可用
    async fn health_check(&self) -> bool;
}

/// 基于 HTTP 的 hub 客户端
#[derive(Clone)]
pub struct HttpHubClient {
    base_url: Url,
    token: Option<String>,
    client: Client,
    retry: RetryPolicy,
    default_deadline_ms: u64,
}

impl HttpHubClient {
    /// 创建新的 hub 客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_millis(config.hub_request_timeout_ms))
            .build()
            .map_err(|e| AppError::Other(format!("无法创建 HTTP 客户端: {}", e)))?;

        let base_url = Url::parse(&config.hub_base_url)
            .map_err(|e| AppError::Other(format!("hub 地址无效 {}: {}", config.hub_base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Other(format!(
                "hub 地址不能作为基础路径: {}",
                config.hub_base_url
            )));
        }

        Ok(Self {
            base_url,
            token: config.hub_token.clone().filter(|t| !t.is_empty()),
            client,
            retry: config.hub_retry,
            default_deadline_ms: config.task_deadline_ms,
        })
    }

    /// 替换分配请求的重试策略
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 在基础路径后追加路径段；每段单独转义，键里的 `/`、`?`、`#` 不会改变路由
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn post(&self, segments: &[&str]) -> reqwest::RequestBuilder {
        let request = self.client.post(self.endpoint(segments));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn allocate_once(&self, worker_id: usize) -> Result<Option<Task>, AllocationError> {
        let response = self
            .post(&["tasks", "allocate"])
            .json(&json!({ "workerId": worker_id }))
            .send()
            .await
            .map_err(|e| AllocationError::new(AllocationErrorKind::Transient, e.to_string()))?;

        let status = response.status();
        debug!("[工作者 {}] 分配请求返回 {}", worker_id, status);

        match status {
            StatusCode::OK => {
                let body = response.text().await.map_err(|e| {
                    AllocationError::new(
                        AllocationErrorKind::Malformed,
                        format!("任务响应读取失败: {}", e),
                    )
                })?;
                let task = parse_task(worker_id, &body)?;
                Ok(Some(task.with_default_deadline(self.default_deadline_ms)))
            }
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::GONE => Err(AllocationError::no_work()),
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => {
                let body = response.text().await.unwrap_or_default();
                let kind = if body.contains(NO_RESOURCE_MARKER) {
                    AllocationErrorKind::NoResource
                } else {
                    AllocationErrorKind::Transient
                };
                Err(AllocationError::new(kind, format!("HTTP {}: {}", status, body)))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(AllocationError::new(
                    AllocationErrorKind::Transient,
                    format!("HTTP {}: {}", status, body),
                ))
            }
        }
    }
}

/// 解析分配到的任务；失败时尽量带上已分配的键
fn parse_task(worker_id: usize, body: &str) -> Result<Task, AllocationError> {
    serde_json::from_str::<Task>(body).map_err(|e| {
        let key = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("allocationKey")?.as_str().map(str::to_string));
        error!(
            "[工作者 {}] ❌ hub 已分配的任务无法解析 (allocationKey: {}): {}",
            worker_id,
            key.as_deref().unwrap_or("<未知>"),
            e
        );
        AllocationError::new(
            AllocationErrorKind::Malformed,
            format!("任务解析失败 (allocationKey: {:?}): {}", key, e),
        )
    })
}

#[async_trait]
impl HubClient for HttpHubClient {
    async fn allocate(&self, worker_id: usize) -> Result<Option<Task>, AllocationError> {
        let op_name = format!("[工作者 {}] 申请任务", worker_id);
        let (result, _) = self
            .retry
            .run(&op_name, AllocationError::is_transient, |_| {
                self.allocate_once(worker_id)
            })
            .await;
        result
    }

    async fn submit(&self, result: &ClassifiedResult) -> Result<(), SubmissionError> {
        let response = self
            .post(&["tasks", result.allocation_key.as_str(), "result"])
            .json(result)
            .send()
            .await
            .map_err(|e| SubmissionError::new(SubmissionErrorKind::Transient, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("HTTP {}: {}", status, body);
        let kind = match status {
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::CONFLICT => {
                SubmissionErrorKind::InvalidKey
            }
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS => SubmissionErrorKind::Transient,
            _ => SubmissionErrorKind::ServerFault,
        };
        Err(SubmissionError::new(kind, message))
    }

    async fn health_check(&self) -> bool {
        let mut request = self.client.get(self.endpoint(&["health"]));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("hub 健康检查失败: {}", e);
                false
            }
        }
    }
}
