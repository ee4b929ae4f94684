//! # HTTP 服务器
//!
//! 路由、CORS 中间件、端口回退绑定与优雅停机

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{chat_completions, embeddings, list_models, method_not_allowed, welcome_page};
use super::state::ProxyState;
use crate::config::ServerConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{lerror, linfo, lwarn};

/// 构建路由
pub fn create_router(state: ProxyState) -> Router {
    let body_limit = state.config.server.max_body_bytes;
    Router::new()
        .route("/v1/chat/completions", get(welcome_page).post(chat_completions))
        .route("/v1/embeddings", post(embeddings))
        .route("/v1/models", get(list_models))
        .method_not_allowed_fallback(method_not_allowed)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(cors_middleware))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// 为所有响应附加 CORS 头，`OPTIONS` 直接返回 204
pub async fn cors_middleware(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    apply_cors_headers(response.headers_mut());
    response
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
}

/// 绑定监听端口；开启回退时端口被占用会依次尝试下一个端口
pub async fn bind_listener(config: &ServerConfig) -> Result<TcpListener> {
    let mut port = config.port;
    loop {
        let addr = format!("{}:{port}", config.host);
        match TcpListener::bind(&addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && config.port_fallback => {
                let Some(next) = port.checked_add(1) else {
                    return Err(ProxyError::config_with_source("没有可用的端口", e));
                };
                lwarn!(
                    "system",
                    LogStage::Startup,
                    LogComponent::ServerSetup,
                    "port_in_use",
                    &format!("端口 {port} 已被占用，尝试 {next}")
                );
                port = next;
            }
            Err(e) => {
                return Err(ProxyError::config_with_source(
                    format!("无法监听 {addr}"),
                    e,
                ));
            }
        }
    }
}

/// 启动服务，直到收到停机信号
pub async fn serve(listener: TcpListener, state: ProxyState) -> Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::ServerSetup,
        "server_start",
        &format!("🚀 服务已启动: http://{addr}")
    );

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ProxyError::internal_with_source("HTTP服务异常退出", e))?;

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::ServerSetup,
        "server_stopped",
        "服务正常关闭"
    );
    Ok(())
}

/// Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::ServerSetup,
                "ctrl_c_error",
                &format!("Failed to listen for Ctrl+C: {e:?}")
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::ServerSetup,
        "shutdown_signal",
        "收到停机信号"
    );
}
