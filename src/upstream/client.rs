//! # 上游 HTTP 客户端
//!
//! 非流式请求共享带整体超时的客户端；流式请求只限制建连时间

use reqwest::Client;
use std::sync::Arc;

use super::headers::HeadersInfo;
use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};

/// Copilot API 端点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ChatCompletions,
    Embeddings,
    Models,
}

impl Endpoint {
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::ChatCompletions => "chat/completions",
            Self::Embeddings => "embeddings",
            Self::Models => "models",
        }
    }
}

/// 上游客户端集合
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    buffered: Client,
    streaming: Client,
    config: UpstreamConfig,
    headers: Arc<HeadersInfo>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig, headers: Arc<HeadersInfo>) -> Result<Self> {
        let buffered = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ProxyError::config_with_source("创建上游HTTP客户端失败", e))?;

        let streaming = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ProxyError::config_with_source("创建上游流式HTTP客户端失败", e))?;

        Ok(Self {
            buffered,
            streaming,
            config: config.clone(),
            headers,
        })
    }

    /// 带整体超时的客户端
    #[must_use]
    pub const fn buffered(&self) -> &Client {
        &self.buffered
    }

    /// 不设整体超时的客户端，流的生命周期由客户端连接决定
    #[must_use]
    pub const fn streaming(&self) -> &Client {
        &self.streaming
    }

    #[must_use]
    pub fn headers(&self) -> &HeadersInfo {
        &self.headers
    }

    #[must_use]
    pub fn url(&self, endpoint: Endpoint) -> String {
        self.config.endpoint(endpoint.path())
    }

    #[must_use]
    pub fn token_url(&self) -> &str {
        &self.config.token_url
    }
}
