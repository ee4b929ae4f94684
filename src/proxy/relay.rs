//! # 转发中继
//!
//! 把转换后的请求发往 Copilot。非流式响应原样回写；流式响应按帧增量转发，不整体缓冲。

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use std::io;
use tokio_util::{codec::FramedRead, io::StreamReader};

use super::sse::SseLineDecoder;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::upstream::{Endpoint, Intent, UpstreamClient};
use crate::{ldebug, linfo, lwarn};

/// 转发中继
#[derive(Debug, Clone)]
pub struct ForwardingRelay {
    upstream: UpstreamClient,
}

impl ForwardingRelay {
    #[must_use]
    pub const fn new(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }

    #[must_use]
    pub const fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    /// 非流式转发：镜像上游状态码和响应体，统一以 JSON 返回
    pub async fn forward_buffered<T: Serialize + Sync>(
        &self,
        request_id: &str,
        endpoint: Endpoint,
        headers: HeaderMap,
        envelope: &T,
    ) -> Result<Response> {
        let url = self.upstream.url(endpoint);
        ldebug!(
            request_id,
            LogStage::UpstreamRequest,
            LogComponent::Relay,
            "forward_buffered",
            "转发非流式请求",
            url = %url
        );

        let response = self
            .upstream
            .buffered()
            .post(&url)
            .headers(headers)
            .json(envelope)
            .send()
            .await
            .map_err(|e| ProxyError::network_with_source("上游请求失败", e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::network_with_source("读取上游响应失败", e))?;

        log_upstream_status(request_id, status, &body);
        Ok(json_response(status, body))
    }

    /// 流式转发：上游非 2xx 时按非流式方式透传，否则逐帧转发 `data:` 行
    pub async fn forward_stream<T: Serialize + Sync>(
        &self,
        request_id: &str,
        endpoint: Endpoint,
        headers: HeaderMap,
        envelope: &T,
    ) -> Result<Response> {
        let url = self.upstream.url(endpoint);
        ldebug!(
            request_id,
            LogStage::UpstreamRequest,
            LogComponent::Relay,
            "forward_stream",
            "转发流式请求",
            url = %url
        );

        let response = self
            .upstream
            .streaming()
            .post(&url)
            .headers(headers)
            .json(envelope)
            .send()
            .await
            .map_err(|e| ProxyError::network_with_source("上游流式请求失败", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| ProxyError::network_with_source("读取上游错误响应失败", e))?;
            log_upstream_status(request_id, status, &body);
            return Ok(json_response(status, body));
        }

        let byte_stream = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let body_stream = sse_frames(request_id.to_string(), byte_stream);

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(body_stream))
            .map_err(|e| ProxyError::internal_with_source("构建流式响应失败", e))
    }

    /// 获取上游实时模型列表，返回 `data` 数组
    pub async fn fetch_models(&self, request_id: &str, token: &str) -> Result<Value> {
        let response = self
            .upstream
            .buffered()
            .get(self.upstream.url(Endpoint::Models))
            .headers(self.upstream.headers().copilot_headers(token, Intent::ModelAccess))
            .send()
            .await
            .map_err(|e| ProxyError::network_with_source("获取模型列表失败", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            log_upstream_status(request_id, status, &body);
            return Err(ProxyError::upstream(status, body));
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::network_with_source("模型列表响应格式错误", e))?;

        match body.get_mut("data") {
            Some(data) if data.is_array() => Ok(data.take()),
            _ => Err(ProxyError::internal("模型列表响应缺少data数组")),
        }
    }
}

/// 上游字节流重新切分为完整的 `data:` 帧
///
/// `[DONE]` 之后停止；读取出错时直接结束，不输出半帧
pub fn sse_frames<S>(
    request_id: String,
    upstream: S,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
{
    let frames = FramedRead::new(StreamReader::new(upstream), SseLineDecoder::new());

    futures::stream::unfold(
        (frames, false, 0usize),
        move |(mut frames, finished, sent)| {
            let request_id = request_id.clone();
            async move {
                if finished {
                    return None;
                }
                match frames.next().await {
                    Some(Ok(frame)) => {
                        let done = frame.is_done();
                        if done {
                            linfo!(
                                request_id,
                                LogStage::Response,
                                LogComponent::Relay,
                                "stream_done",
                                "流式响应完成",
                                frames = sent + 1
                            );
                        }
                        Some((Ok(frame.into_bytes()), (frames, done, sent + 1)))
                    }
                    Some(Err(e)) => {
                        lwarn!(
                            request_id,
                            LogStage::ResponseFailure,
                            LogComponent::Relay,
                            "stream_read_error",
                            &format!("上游流读取失败，提前结束: {e}"),
                            frames = sent
                        );
                        None
                    }
                    None => None,
                }
            }
        },
    )
}

fn json_response(status: StatusCode, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn log_upstream_status(request_id: &str, status: StatusCode, body: &Bytes) {
    if status.is_success() {
        ldebug!(
            request_id,
            LogStage::Response,
            LogComponent::Relay,
            "upstream_ok",
            "上游响应成功",
            status = status.as_u16(),
            bytes = body.len()
        );
    } else {
        lwarn!(
            request_id,
            LogStage::ResponseFailure,
            LogComponent::Relay,
            "upstream_error",
            "上游返回错误状态",
            status = status.as_u16(),
            body = %String::from_utf8_lossy(body)
        );
    }
}
