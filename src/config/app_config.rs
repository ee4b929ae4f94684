//! # 应用配置结构定义

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ProxyError, Result};

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 监听配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: super::DatabaseConfig,
    /// 上游 Copilot 服务配置
    pub upstream: UpstreamConfig,
    /// 客户端认证策略
    pub auth: AuthConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 端口被占用时是否尝试下一个端口
    pub port_fallback: bool,
    /// 请求体大小上限（字节），图片以 base64 内联时请求体较大
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            port_fallback: true,
            max_body_bytes: 100 * 1024 * 1024,
        }
    }
}

/// 上游服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// chat/embeddings/models 的公共前缀
    pub api_base_url: String,
    /// 长期凭证换取临时令牌的地址
    pub token_url: String,
    /// 非流式请求超时（秒）
    pub timeout_seconds: u64,
    /// 建连超时（秒），流式请求只受此限制
    pub connect_timeout_seconds: u64,
    pub editor_version: String,
    pub editor_plugin_version: String,
    pub user_agent: String,
    pub api_version: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.individual.githubcopilot.com".to_string(),
            token_url: "https://api.github.com/copilot_internal/v2/token".to_string(),
            timeout_seconds: 60,
            connect_timeout_seconds: 10,
            editor_version: "vscode/1.98.0-insider".to_string(),
            editor_plugin_version: "copilot/1.270.0".to_string(),
            user_agent: "GitHubCopilotChat/0.23.2".to_string(),
            api_version: "2025-01-21".to_string(),
        }
    }
}

impl UpstreamConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// 拼接上游端点，例如 `endpoint("chat/completions")`
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url.trim_end_matches('/'), path)
    }
}

/// 认证策略
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 未携带凭证的请求是否随机借用已存储的凭证
    pub allow_anonymous: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_anonymous: true,
        }
    }
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ProxyError::config("服务器端口不能为0"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ProxyError::config("请求体大小上限必须大于0"));
        }
        if self.database.url.is_empty() {
            return Err(ProxyError::config("数据库URL不能为空"));
        }
        if self.database.max_connections == 0 {
            return Err(ProxyError::config("数据库最大连接数必须大于0"));
        }
        if self.upstream.timeout_seconds == 0 || self.upstream.connect_timeout_seconds == 0 {
            return Err(ProxyError::config("上游超时时间必须大于0"));
        }
        for (name, value) in [
            ("upstream.api_base_url", &self.upstream.api_base_url),
            ("upstream.token_url", &self.upstream.token_url),
        ] {
            url::Url::parse(value).map_err(|e| {
                ProxyError::config_with_source(format!("无效的URL {name}: {value}"), e)
            })?;
        }
        Ok(())
    }
}
