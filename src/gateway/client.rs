//! # 推理传输层
//!
//! ## 设计思路
//!
//! `InferenceBackend` 是网关与网络之间的唯一接缝：生产环境使用 `GeminiClient`
//! 走 HTTP，测试中换成脚本化实现，编排层与操作层对此无感知。
//!
//! ## 实现思路
//!
//! - HTTP 客户端在构造时一次建好并复用（超时、连接超时来自配置）。
//! - 不做自动重试：每一次调用都对应一次用户显式触发。
//! - 非 2xx 响应优先取服务端 `error.message`，否则使用本地化状态文案。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::GatewayError;
use super::wire::{ErrorEnvelope, GenerateContentRequest, GenerateContentResponse};
use crate::config::StudioConfig;

/// 远程 `generateContent` 调用的抽象。
pub trait InferenceBackend: Send + Sync + 'static {
    fn generate_content(
        &self,
        model: &str,
        request: GenerateContentRequest,
    ) -> impl Future<Output = Result<GenerateContentResponse, GatewayError>> + Send;
}

impl<B: InferenceBackend> InferenceBackend for Arc<B> {
    fn generate_content(
        &self,
        model: &str,
        request: GenerateContentRequest,
    ) -> impl Future<Output = Result<GenerateContentResponse, GatewayError>> + Send {
        (**self).generate_content(model, request)
    }
}

/// 基于 reqwest 的 Gemini REST 客户端。
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    request_timeout_secs: u64,
}

impl GeminiClient {
    /// 根据配置创建客户端；未配置 API Key 时直接失败。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use cutout_studio::config::StudioConfig;
    /// use cutout_studio::gateway::GeminiClient;
    ///
    /// let client = GeminiClient::new(&StudioConfig::default())?;
    /// # Ok::<(), cutout_studio::gateway::GatewayError>(())
    /// ```
    pub fn new(config: &StudioConfig) -> Result<Self, GatewayError> {
        let api_key = config
            .resolved_api_key()
            .ok_or_else(|| GatewayError::Configuration("未配置 API Key（GEMINI_API_KEY / API_KEY）".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Configuration(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key,
            request_timeout_secs: config.request_timeout_secs,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> GatewayError {
        // 错误文本中不带请求地址
        let e = e.without_url();
        if e.is_timeout() {
            GatewayError::Request(format!("请求超时（{}秒）", self.request_timeout_secs))
        } else if e.is_connect() {
            GatewayError::Request(format!("无法连接：{}", e))
        } else {
            GatewayError::Request(format!("请求失败：{}", e))
        }
    }
}

impl InferenceBackend for GeminiClient {
    async fn generate_content(
        &self,
        model: &str,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GatewayError> {
        let url = self.endpoint(model);
        let body = serde_json::to_vec(&request)
            .map_err(|e| GatewayError::Request(format!("请求序列化失败：{}", e)))?;

        log::debug!("📡 调用推理服务 - model: {} 请求体: {}KB", model, body.len() / 1024);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| self.map_reqwest_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorEnvelope>(&bytes)
                .ok()
                .map(|envelope| envelope.error.message)
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| status_message(status.as_u16()).to_string());

            return Err(GatewayError::Http {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| GatewayError::Request(format!("响应不是合法 JSON：{}", e)))
    }
}

/// 常见 HTTP 状态码本地化文案。
fn status_message(code: u16) -> &'static str {
    match code {
        400 => "请求参数错误",
        401 | 403 => "访问被拒绝",
        404 => "模型不存在",
        429 => "请求过于频繁",
        500..=599 => "服务器错误",
        _ => "请求失败",
    }
}
