//! # GitHub 设备授权登录
//!
//! 通过 OAuth device flow 获取 `ghu_` 长期凭证

use reqwest::{Client, header::ACCEPT};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

pub const DEFAULT_CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";
pub const DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
pub const ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// 设备码响应
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

const fn default_expires_in() -> u64 {
    900
}

const fn default_interval() -> u64 {
    5
}

#[derive(Debug, Serialize)]
struct DeviceCodeRequest<'a> {
    client_id: &'a str,
    scope: &'a str,
}

#[derive(Debug, Serialize)]
struct AccessTokenRequest<'a> {
    client_id: &'a str,
    device_code: &'a str,
    grant_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// 单次轮询结果
#[derive(Debug, PartialEq, Eq)]
enum PollOutcome {
    Token(String),
    Pending,
    SlowDown,
}

/// 设备授权流程客户端
#[derive(Debug, Clone)]
pub struct GithubDeviceFlow {
    client: Client,
    client_id: String,
    device_code_url: String,
    access_token_url: String,
}

impl GithubDeviceFlow {
    pub fn new() -> Result<Self> {
        Self::with_urls(DEVICE_CODE_URL, ACCESS_TOKEN_URL)
    }

    /// 指定 OAuth 端点
    pub fn with_urls(device_code_url: &str, access_token_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProxyError::config_with_source("创建OAuth HTTP客户端失败", e))?;

        Ok(Self {
            client,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            device_code_url: device_code_url.to_string(),
            access_token_url: access_token_url.to_string(),
        })
    }

    /// 申请设备码
    pub async fn request_device_code(&self) -> Result<DeviceCode> {
        let response = self
            .client
            .post(&self.device_code_url)
            .header(ACCEPT, "application/json")
            .json(&DeviceCodeRequest {
                client_id: &self.client_id,
                scope: "read:user",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::upstream_auth_rejected(format!(
                "device code request failed with {status}: {body}"
            )));
        }

        let code: DeviceCode = response
            .json()
            .await
            .map_err(|e| ProxyError::upstream_auth_with_source("设备码响应格式错误", e))?;

        linfo!(
            "login",
            LogStage::ExternalApi,
            LogComponent::DeviceFlow,
            "device_code",
            "获取设备码成功",
            user_code = %code.user_code,
            interval = code.interval
        );
        Ok(code)
    }

    /// 轮询直到用户完成授权、拒绝或设备码过期
    pub async fn poll_access_token(&self, code: &DeviceCode) -> Result<String> {
        let deadline = Instant::now() + Duration::from_secs(code.expires_in);
        let mut interval = Duration::from_secs(code.interval);

        loop {
            if Instant::now() >= deadline {
                return Err(ProxyError::upstream_auth_rejected("device code expired"));
            }

            match self.poll_once(&code.device_code).await? {
                PollOutcome::Token(token) => return Ok(token),
                PollOutcome::Pending => {}
                PollOutcome::SlowDown => interval += SLOW_DOWN_STEP,
            }

            ldebug!(
                "login",
                LogStage::ExternalApi,
                LogComponent::DeviceFlow,
                "poll_wait",
                "等待用户授权",
                interval_secs = interval.as_secs()
            );
            tokio::time::sleep(interval).await;
        }
    }

    async fn poll_once(&self, device_code: &str) -> Result<PollOutcome> {
        let response: AccessTokenResponse = self
            .client
            .post(&self.access_token_url)
            .header(ACCEPT, "application/json")
            .json(&AccessTokenRequest {
                client_id: &self.client_id,
                device_code,
                grant_type: DEVICE_GRANT_TYPE,
            })
            .send()
            .await?
            .json()
            .await
            .map_err(|e| ProxyError::upstream_auth_with_source("令牌轮询响应格式错误", e))?;

        if let Some(token) = response.access_token.filter(|t| !t.is_empty()) {
            return Ok(PollOutcome::Token(token));
        }

        match response.error.as_deref() {
            Some("authorization_pending") => Ok(PollOutcome::Pending),
            Some("slow_down") => Ok(PollOutcome::SlowDown),
            Some("expired_token") => Err(ProxyError::upstream_auth_rejected("device code expired")),
            Some("access_denied") => Err(ProxyError::upstream_auth_rejected(
                "authorization was denied by the user",
            )),
            Some(other) => Err(ProxyError::upstream_auth_rejected(format!(
                "{other}: {}",
                response.error_description.unwrap_or_default()
            ))),
            None => Err(ProxyError::upstream_auth_malformed(
                "token response carried neither access_token nor error",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn flow(server: &MockServer) -> GithubDeviceFlow {
        GithubDeviceFlow::with_urls(
            &format!("{}/login/device/code", server.uri()),
            &format!("{}/login/oauth/access_token", server.uri()),
        )
        .unwrap()
    }

    fn code(interval: u64) -> DeviceCode {
        DeviceCode {
            device_code: "dev-123".into(),
            user_code: "ABCD-1234".into(),
            verification_uri: "https://github.com/login/device".into(),
            expires_in: 60,
            interval,
        }
    }

    #[tokio::test]
    async fn test_request_device_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/device/code"))
            .and(header("accept", "application/json"))
            .and(body_partial_json(json!({
                "client_id": DEFAULT_CLIENT_ID,
                "scope": "read:user"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": "dev-123",
                "user_code": "ABCD-1234",
                "verification_uri": "https://github.com/login/device",
                "expires_in": 899,
                "interval": 5
            })))
            .expect(1)
            .mount(&server)
            .await;

        let code = flow(&server).await.request_device_code().await.unwrap();
        assert_eq!(code.user_code, "ABCD-1234");
        assert_eq!(code.expires_in, 899);
    }

    #[tokio::test]
    async fn test_poll_until_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "authorization_pending"})),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(body_partial_json(json!({
                "device_code": "dev-123",
                "grant_type": DEVICE_GRANT_TYPE
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ghu_fromdeviceflow",
                "token_type": "bearer",
                "scope": ""
            })))
            .mount(&server)
            .await;

        let token = flow(&server).await.poll_access_token(&code(0)).await.unwrap();
        assert_eq!(token, "ghu_fromdeviceflow");
    }

    #[tokio::test]
    async fn test_poll_terminal_errors() {
        for error in ["access_denied", "expired_token", "unsupported_grant_type"] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/login/oauth/access_token"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "error": error,
                    "error_description": "nope"
                })))
                .mount(&server)
                .await;

            let err = flow(&server).await.poll_access_token(&code(0)).await.unwrap_err();
            assert!(matches!(err, ProxyError::UpstreamAuth { .. }), "{error}");
        }
    }

    #[tokio::test]
    async fn test_slow_down_is_not_fatal() {
        let server = MockServer::start().await;
        let flow = flow(&server).await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "slow_down"})))
            .mount(&server)
            .await;

        assert_eq!(flow.poll_once("dev-123").await.unwrap(), PollOutcome::SlowDown);
    }
}
