//! # 日志配置模块
//!
//! 初始化 tracing 订阅器，并提供带阶段/组件字段的结构化日志宏

use std::env;
use std::fmt;
use tracing_subscriber::{
    EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// 请求处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    Startup,
    Shutdown,
    Configuration,
    Db,
    Authentication,
    RequestStart,
    RequestModify,
    UpstreamRequest,
    Response,
    ResponseFailure,
    ExternalApi,
    Internal,
}

impl LogStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Configuration => "configuration",
            Self::Db => "db",
            Self::Authentication => "authentication",
            Self::RequestStart => "request_start",
            Self::RequestModify => "request_modify",
            Self::UpstreamRequest => "upstream_request",
            Self::Response => "response",
            Self::ResponseFailure => "response_failure",
            Self::ExternalApi => "external_api",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    Main,
    Config,
    Database,
    CredentialStore,
    Broker,
    TokenExchange,
    Translator,
    Relay,
    Catalog,
    ServerSetup,
    DeviceFlow,
}

impl LogComponent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::Database => "database",
            Self::CredentialStore => "credential_store",
            Self::Broker => "broker",
            Self::TokenExchange => "token_exchange",
            Self::Translator => "translator",
            Self::Relay => "relay",
            Self::Catalog => "catalog",
            Self::ServerSetup => "server_setup",
            Self::DeviceFlow => "device_flow",
        }
    }
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 结构化 info 日志
///
/// `linfo!(request_id, stage, component, operation, message, field = value, ...)`
#[macro_export]
macro_rules! linfo {
    (
        $request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr
        $(, $($fields:tt)+)?
    ) => {
        ::tracing::info!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

/// 结构化 debug 日志
#[macro_export]
macro_rules! ldebug {
    (
        $request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr
        $(, $($fields:tt)+)?
    ) => {
        ::tracing::debug!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

/// 结构化 warn 日志
#[macro_export]
macro_rules! lwarn {
    (
        $request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr
        $(, $($fields:tt)+)?
    ) => {
        ::tracing::warn!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

/// 结构化 error 日志
#[macro_export]
macro_rules! lerror {
    (
        $request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr
        $(, $($fields:tt)+)?
    ) => {
        ::tracing::error!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

/// 凭证脱敏：只保留前 6 个字符
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    if secret.chars().count() <= 6 {
        "***".to_string()
    } else {
        format!("{prefix}***")
    }
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先；否则使用给定级别，并关闭 sqlx 的逐条查询日志
pub fn init_optimized_logging(log_level: Option<&str>) {
    let level = log_level.unwrap_or("info");

    let default_filter = format!(
        "{level},copilot_gateway=debug,sqlx::query=off,sea_orm::query=warn,sqlx=warn"
    );

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();

    if result.is_err() {
        // 订阅器已被设置（例如测试中重复初始化）
        return;
    }

    if env::var("RUST_LOG")
        .is_ok_and(|v| v.contains("sqlx::query=info") || v.contains("sqlx::query=debug"))
    {
        tracing::info!("SQLx database query logging enabled");
    }
}
