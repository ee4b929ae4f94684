//! # 凭证交换
//!
//! 用 GitHub 长期凭证向 `copilot_internal/v2/token` 换取 Copilot 临时令牌

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage, mask_secret};
use crate::upstream::UpstreamClient;
use crate::{ldebug, lwarn};

/// 长期凭证换取临时令牌
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, long_term: &str) -> Result<String>;
}

/// 调用 GitHub 令牌接口的实现
#[derive(Debug, Clone)]
pub struct CopilotTokenExchanger {
    upstream: UpstreamClient,
}

impl CopilotTokenExchanger {
    #[must_use]
    pub const fn new(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl TokenExchanger for CopilotTokenExchanger {
    async fn exchange(&self, long_term: &str) -> Result<String> {
        let masked = mask_secret(long_term);
        ldebug!(
            "system",
            LogStage::ExternalApi,
            LogComponent::TokenExchange,
            "exchange_start",
            "请求新的临时令牌",
            credential = %masked
        );

        let response = self
            .upstream
            .buffered()
            .get(self.upstream.token_url())
            .headers(self.upstream.headers().token_exchange_headers(long_term))
            .send()
            .await
            .map_err(|e| ProxyError::upstream_auth_with_source("令牌接口请求失败", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProxyError::upstream_auth_with_source("读取令牌接口响应失败", e))?;

        if !status.is_success() {
            lwarn!(
                "system",
                LogStage::ExternalApi,
                LogComponent::TokenExchange,
                "exchange_rejected",
                "令牌接口拒绝了长期凭证",
                credential = %masked,
                status = status.as_u16(),
                body = %body
            );
            return Err(ProxyError::upstream_auth_rejected(format!(
                "token endpoint returned {status}"
            )));
        }

        parse_token_response(&body)
    }
}

/// 解析 `{"token": "..."}`，缺少字符串 token 时视为响应格式错误
fn parse_token_response(body: &str) -> Result<String> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| ProxyError::upstream_auth_with_source("令牌接口响应不是JSON", e))?;

    if let Some(token) = json.get("token").and_then(Value::as_str) {
        return Ok(token.to_string());
    }

    let reason = json
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("token field missing");
    Err(ProxyError::upstream_auth_malformed(format!(
        "令牌接口响应缺少token: {reason}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::helpers::{init_test_env, test_config};
    use crate::upstream::HeadersInfo;
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn exchanger_for(server: &MockServer) -> CopilotTokenExchanger {
        init_test_env();
        let config = test_config(&server.uri());
        let headers = Arc::new(HeadersInfo::new(&config.upstream));
        CopilotTokenExchanger::new(UpstreamClient::new(&config.upstream, headers).unwrap())
    }

    #[tokio::test]
    async fn test_exchange_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/copilot_internal/v2/token"))
            .and(header("authorization", "token ghu_abc"))
            .and(header("editor-version", "vscode/1.98.0-insider"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "token": "tid=9;exp=123" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = exchanger_for(&server).await.exchange("ghu_abc").await.unwrap();
        assert_eq!(token, "tid=9;exp=123");
    }

    #[tokio::test]
    async fn test_exchange_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/copilot_internal/v2/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
            .mount(&server)
            .await;

        let err = exchanger_for(&server).await.exchange("ghu_bad").await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamAuth { rejected: true, .. }));
    }

    #[test]
    fn test_parse_token_response() {
        assert_eq!(
            parse_token_response(r#"{"token":"tid=1;exp=99","expires_at":99}"#).unwrap(),
            "tid=1;exp=99"
        );

        let err = parse_token_response(r#"{"error":"not entitled"}"#).unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamAuth { rejected: false, .. }));
        assert!(err.to_string().contains("not entitled"));

        assert!(parse_token_response(r#"{"token":42}"#).is_err());
        assert!(parse_token_response("<html>").is_err());
    }
}
