//! # 错误类型定义

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::json;
use thiserror::Error;

/// 上游凭证交换失败时返回给客户端的固定文案
pub const TOKEN_GENERATION_FAILED: &str = "Unable to generate new temporary token";
/// 与上游通信失败时返回给客户端的固定文案
pub const UPSTREAM_COMMUNICATION_FAILED: &str = "Failed to communicate with upstream API";
/// 内部错误的固定文案，细节只写日志
pub const INTERNAL_SERVER_ERROR: &str = "Internal server error";

/// 应用主要错误类型
#[derive(Debug, Error)]
pub enum ProxyError {
    /// 配置相关错误
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 数据库相关错误
    #[error("数据库错误: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 网络通信错误
    #[error("网络错误: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 客户端凭证缺失或格式错误
    #[error("认证错误: {message}")]
    Unauthorized { message: String },

    /// 长期凭证换取临时令牌失败
    ///
    /// `rejected` 为 true 表示上游明确拒绝（非 2xx）
    #[error("令牌交换失败: {message}")]
    UpstreamAuth {
        message: String,
        rejected: bool,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 请求体校验失败
    #[error("请求无效: {message}")]
    InvalidRequest { message: String },

    /// 请求体超出大小限制
    #[error("请求体过大: {message}")]
    PayloadTooLarge { message: String },

    /// 上游返回的非 2xx 响应，原样透传
    #[error("上游返回错误状态: {status}")]
    Upstream { status: StatusCode, body: Bytes },

    /// 路由存在但方法不支持
    #[error("Method Not Allowed")]
    MethodNotAllowed,

    /// 系统内部错误
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// IO相关错误
    #[error("IO错误: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// 附加上下文的错误
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ProxyError>,
    },
}

impl ProxyError {
    /// 将错误转换为HTTP状态码和错误代码
    #[must_use]
    pub fn to_http_response_parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::UpstreamAuth { rejected: true, .. } => {
                (StatusCode::UNAUTHORIZED, "UPSTREAM_AUTH_REJECTED")
            }
            Self::UpstreamAuth { rejected: false, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_AUTH_ERROR")
            }
            Self::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            Self::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            Self::Upstream { status, .. } => (*status, "UPSTREAM_ERROR"),
            Self::Network { .. } => (StatusCode::BAD_GATEWAY, "NETWORK_ERROR"),
            Self::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED"),
            Self::Config { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Self::Database { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Self::Context { source, .. } => source.to_http_response_parts(),
        }
    }

    /// 返回给客户端的错误文案，内部细节不外泄
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Unauthorized { message }
            | Self::InvalidRequest { message }
            | Self::PayloadTooLarge { message } => message.clone(),
            Self::UpstreamAuth { .. } => TOKEN_GENERATION_FAILED.to_string(),
            Self::Network { .. } => UPSTREAM_COMMUNICATION_FAILED.to_string(),
            Self::MethodNotAllowed => "Method Not Allowed".to_string(),
            Self::Upstream { body, .. } => String::from_utf8_lossy(body).into_owned(),
            Self::Context { source, .. } => source.client_message(),
            Self::Config { .. }
            | Self::Database { .. }
            | Self::Internal { .. }
            | Self::Io { .. } => INTERNAL_SERVER_ERROR.to_string(),
        }
    }

    /// 剥离上下文包装后的根错误
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// 创建配置错误
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的配置错误
    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建数据库错误
    pub fn database<T: Into<String>>(message: T) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的数据库错误
    pub fn database_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建网络错误
    pub fn network<T: Into<String>>(message: T) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的网络错误
    pub fn network_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建未授权错误
    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// 上游拒绝了凭证交换
    pub fn upstream_auth_rejected<T: Into<String>>(message: T) -> Self {
        Self::UpstreamAuth {
            message: message.into(),
            rejected: true,
            source: None,
        }
    }

    /// 凭证交换过程出错（网络、响应格式等）
    pub fn upstream_auth_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::UpstreamAuth {
            message: message.into(),
            rejected: false,
            source: Some(source.into()),
        }
    }

    /// 凭证交换得到了无法识别的响应
    pub fn upstream_auth_malformed<T: Into<String>>(message: T) -> Self {
        Self::UpstreamAuth {
            message: message.into(),
            rejected: false,
            source: None,
        }
    }

    /// 创建请求无效错误
    pub fn invalid_request<T: Into<String>>(message: T) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// 请求体超出大小限制
    pub fn payload_too_large<T: Into<String>>(message: T) -> Self {
        Self::PayloadTooLarge {
            message: message.into(),
        }
    }

    /// 包装上游的非 2xx 响应
    pub fn upstream<B: Into<Bytes>>(status: StatusCode, body: B) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    /// 创建内部错误
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的内部错误
    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, code) = self.to_http_response_parts();

        if let Self::Upstream { body, .. } = self.root() {
            let mut response = (status, body.clone()).into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            return response;
        }

        if status.is_server_error() {
            tracing::error!(
                error_code = code,
                status = status.as_u16(),
                error = ?self,
                "request failed"
            );
        } else {
            tracing::warn!(
                error_code = code,
                status = status.as_u16(),
                error = %self,
                "request rejected"
            );
        }

        (status, Json(json!({ "error": self.client_message() }))).into_response()
    }
}

// 自动转换常见错误类型
impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: "文件操作失败".to_string(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for ProxyError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("TOML解析失败", err)
    }
}

impl From<sea_orm::error::DbErr> for ProxyError {
    fn from(err: sea_orm::error::DbErr) -> Self {
        Self::database_with_source("数据库操作失败", err)
    }
}

// Reqwest错误转换
impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        Self::network_with_source("HTTP请求失败", err)
    }
}
