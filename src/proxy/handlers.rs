//! # 请求处理器
//!
//! 每个请求：解析凭证 → 转换请求体 → 转发上游

use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{Html, IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use super::state::ProxyState;
use super::translator::{
    ChatCompletionRequest, EmbeddingRequest, parse_body, translate_chat, translate_embeddings,
};
use crate::auth::parse_authorization;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::upstream::{Endpoint, Intent};
use crate::{ldebug, linfo, lwarn};

const WELCOME_PAGE: &str = "<html><head><title>Welcome to API</title></head>\
<body><h1>Welcome to API</h1>\
<p>This API is used to interact with the GitHub Copilot model. \
You can send messages to the model and receive responses.</p></body></html>";

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// 请求体读取失败（超出大小限制等）转换为 JSON 错误
fn request_body(body: std::result::Result<Bytes, BytesRejection>) -> Result<Bytes> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ProxyError::payload_too_large(rejection.body_text())
        } else {
            ProxyError::invalid_request(rejection.body_text())
        }
    })
}

/// GET /v1/chat/completions
pub async fn welcome_page() -> Html<&'static str> {
    Html(WELCOME_PAGE)
}

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    let request_id = new_request_id();
    parse_authorization(authorization(&headers))?;

    let request: ChatCompletionRequest = parse_body(&request_body(body)?)?;
    let translated = translate_chat(&request)?;
    let token = state.broker.resolve(&request_id, authorization(&headers)).await?;

    linfo!(
        request_id,
        LogStage::RequestStart,
        LogComponent::Translator,
        "chat_request",
        "聊天请求",
        model = %translated.envelope.model,
        messages = translated.envelope.messages.len(),
        stream = translated.is_stream(),
        vision = translated.vision
    );

    let upstream_headers = state
        .relay
        .upstream()
        .headers()
        .chat_headers(&token, translated.vision);

    if translated.is_stream() {
        state
            .relay
            .forward_stream(
                &request_id,
                Endpoint::ChatCompletions,
                upstream_headers,
                &translated.envelope,
            )
            .await
    } else {
        state
            .relay
            .forward_buffered(
                &request_id,
                Endpoint::ChatCompletions,
                upstream_headers,
                &translated.envelope,
            )
            .await
    }
}

/// POST /v1/embeddings
pub async fn embeddings(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    let request_id = new_request_id();
    parse_authorization(authorization(&headers))?;

    let request: EmbeddingRequest = parse_body(&request_body(body)?)?;
    let translated = translate_embeddings(&request, &state.catalog)?;
    let token = state.broker.resolve(&request_id, authorization(&headers)).await?;

    if let Some(requested) = &translated.replaced_model {
        lwarn!(
            request_id,
            LogStage::RequestModify,
            LogComponent::Translator,
            "embedding_model_fallback",
            "未知的嵌入模型，使用默认模型",
            requested = %requested,
            model = %translated.envelope.model
        );
    }

    let upstream_headers = state
        .relay
        .upstream()
        .headers()
        .copilot_headers(&token, Intent::ConversationPanel);

    state
        .relay
        .forward_buffered(&request_id, Endpoint::Embeddings, upstream_headers, &translated.envelope)
        .await
}

/// GET /v1/models
///
/// 能解析出令牌且上游可用时返回实时列表，否则返回内置目录
pub async fn list_models(State(state): State<ProxyState>, headers: HeaderMap) -> Response {
    let request_id = new_request_id();

    let live = match state.broker.resolve(&request_id, authorization(&headers)).await {
        Ok(token) => state.relay.fetch_models(&request_id, &token).await,
        Err(e) => Err(e),
    };

    match live {
        Ok(data) => {
            ldebug!(
                request_id,
                LogStage::Response,
                LogComponent::Catalog,
                "models_live",
                "返回上游实时模型列表"
            );
            Json(json!({ "data": data, "object": "list" })).into_response()
        }
        Err(e) => {
            lwarn!(
                request_id,
                LogStage::Response,
                LogComponent::Catalog,
                "models_fallback",
                &format!("无法获取实时模型列表，使用内置目录: {e}")
            );
            Json(state.catalog.to_list_response()).into_response()
        }
    }
}

/// 已知路径上的其它方法
pub async fn method_not_allowed() -> ProxyError {
    ProxyError::MethodNotAllowed
}
