//! # 错误处理测试

use crate::error::{Context, ProxyError, RequestError, StoreError};
use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
use pretty_assertions::assert_eq;
use std::error::Error;

async fn response_parts(err: ProxyError) -> (StatusCode, String, Option<String>) {
    let response = err.into_response();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap(), content_type)
}

#[test]
fn test_config_error_with_source() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "文件不存在");
    let err = ProxyError::config_with_source("配置文件加载失败", io_err);

    assert!(matches!(err, ProxyError::Config { .. }));
    assert!(err.to_string().contains("配置错误: 配置文件加载失败"));
    assert!(err.source().is_some());
}

#[test]
fn test_status_mapping() {
    let cases = [
        (ProxyError::unauthorized("x"), StatusCode::UNAUTHORIZED),
        (ProxyError::upstream_auth_rejected("x"), StatusCode::UNAUTHORIZED),
        (ProxyError::upstream_auth_malformed("x"), StatusCode::INTERNAL_SERVER_ERROR),
        (ProxyError::invalid_request("x"), StatusCode::BAD_REQUEST),
        (ProxyError::payload_too_large("x"), StatusCode::PAYLOAD_TOO_LARGE),
        (ProxyError::network("x"), StatusCode::BAD_GATEWAY),
        (ProxyError::MethodNotAllowed, StatusCode::METHOD_NOT_ALLOWED),
        (ProxyError::database("x"), StatusCode::INTERNAL_SERVER_ERROR),
        (
            ProxyError::upstream(StatusCode::TOO_MANY_REQUESTS, "{}"),
            StatusCode::TOO_MANY_REQUESTS,
        ),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_http_response_parts().0, expected, "{err}");
    }
}

#[test]
fn test_context_keeps_root_status() {
    let result: std::result::Result<(), ProxyError> = Err(ProxyError::unauthorized("bad"));
    let err = result.context("resolving credential").unwrap_err();

    assert!(matches!(err, ProxyError::Context { .. }));
    assert_eq!(err.to_http_response_parts().0, StatusCode::UNAUTHORIZED);
    assert!(matches!(err.root(), ProxyError::Unauthorized { .. }));
    assert_eq!(err.client_message(), "bad");
}

#[test]
fn test_store_error_conversion() {
    let err: ProxyError = StoreError::NoCredentials.into();
    assert_eq!(err.to_http_response_parts().0, StatusCode::UNAUTHORIZED);

    let err: ProxyError = StoreError::NotFound("ghu_ab***".into()).into();
    assert_eq!(err.to_http_response_parts().0, StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_request_error_conversion() {
    let err: ProxyError = RequestError::EmptyMessages.into();
    assert_eq!(err.to_http_response_parts().0, StatusCode::BAD_REQUEST);
    assert!(err.client_message().contains("messages"));
}

#[tokio::test]
async fn test_internal_details_not_exposed() {
    let err = ProxyError::database_with_source(
        "connection refused at /var/secret.db",
        std::io::Error::other("boom"),
    );
    let (status, body, _) = response_parts(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, r#"{"error":"Internal server error"}"#);
}

#[tokio::test]
async fn test_upstream_auth_body() {
    let (status, body, _) = response_parts(ProxyError::upstream_auth_rejected("403")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Unable to generate new temporary token"}"#);

    let (status, body, _) = response_parts(ProxyError::network("timeout")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, r#"{"error":"Failed to communicate with upstream API"}"#);
}

#[tokio::test]
async fn test_upstream_error_passes_body_through() {
    let upstream_body = r#"{"error":{"message":"quota exceeded"}}"#;
    let err = ProxyError::upstream(StatusCode::TOO_MANY_REQUESTS, upstream_body);
    let (status, body, content_type) = response_parts(err).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, upstream_body);
    assert_eq!(content_type.as_deref(), Some("application/json"));
}
