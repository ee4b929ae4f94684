//! # 上游请求头
//!
//! 伪装成 VS Code Copilot Chat 插件所需的请求头。机器 ID 与会话 ID 在进程启动时生成一次

use rand::{Rng, SeedableRng, rngs::StdRng};
use reqwest::header::{
    ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use std::sync::Mutex;

use crate::config::UpstreamConfig;

const REQUEST_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// 调用意图，对应 `openai-intent` 头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ConversationPanel,
    ModelAccess,
}

impl Intent {
    const fn as_header_value(self) -> &'static str {
        match self {
            Self::ConversationPanel => "conversation-panel",
            Self::ModelAccess => "model-access",
        }
    }
}

/// 进程级的上游身份信息
#[derive(Debug)]
pub struct HeadersInfo {
    machine_id: String,
    session_id: String,
    editor_version: HeaderValue,
    editor_plugin_version: HeaderValue,
    user_agent: HeaderValue,
    api_version: HeaderValue,
    rng: Mutex<StdRng>,
}

impl HeadersInfo {
    #[must_use]
    pub fn new(config: &UpstreamConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// 使用给定随机源构造，测试中用固定种子
    #[must_use]
    pub fn with_rng(config: &UpstreamConfig, mut rng: StdRng) -> Self {
        let machine_id = hex::encode(rng.r#gen::<[u8; 32]>());
        let session_id = uuid::Builder::from_random_bytes(rng.r#gen()).into_uuid().to_string();

        Self {
            machine_id,
            session_id,
            editor_version: header_value(&config.editor_version),
            editor_plugin_version: header_value(&config.editor_plugin_version),
            user_agent: header_value(&config.user_agent),
            api_version: header_value(&config.api_version),
            rng: Mutex::new(rng),
        }
    }

    #[must_use]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 生成 `8-4-4-4-12` 格式、由 `[a-z0-9]` 组成的请求 ID
    #[must_use]
    pub fn request_id(&self) -> String {
        let raw: Vec<u8> = {
            let mut rng = self
                .rng
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            (0..32)
                .map(|_| REQUEST_ID_ALPHABET[rng.gen_range(0..REQUEST_ID_ALPHABET.len())])
                .collect()
        };
        let raw = String::from_utf8_lossy(&raw);
        format!(
            "{}-{}-{}-{}-{}",
            &raw[0..8],
            &raw[8..12],
            &raw[12..16],
            &raw[16..20],
            &raw[20..32]
        )
    }

    /// 编辑器身份头，凭证交换与 API 调用共用
    fn identity_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("editor-version", self.editor_version.clone());
        headers.insert("editor-plugin-version", self.editor_plugin_version.clone());
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers
    }

    /// 凭证交换请求头：`Authorization: token <long-term>`
    #[must_use]
    pub fn token_exchange_headers(&self, long_term: &str) -> HeaderMap {
        let mut headers = self.identity_headers();
        if let Ok(value) = HeaderValue::from_str(&format!("token {long_term}")) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    /// Copilot API 请求头，每次调用生成新的 `X-Request-Id`
    #[must_use]
    pub fn copilot_headers(&self, bearer: &str, intent: Intent) -> HeaderMap {
        let mut headers = self.identity_headers();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "openai-organization",
            HeaderValue::from_static("github-copilot"),
        );
        headers.insert("openai-intent", HeaderValue::from_static(intent.as_header_value()));
        headers.insert("vscode-machineid", header_value(&self.machine_id));
        headers.insert("vscode-sessionid", header_value(&self.session_id));
        headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("no-cors"));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
        headers.insert("x-github-api-version", self.api_version.clone());
        headers.insert(
            HeaderName::from_static("x-request-id"),
            header_value(&self.request_id()),
        );
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {bearer}")) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    /// 聊天请求头，附带视觉请求标记
    #[must_use]
    pub fn chat_headers(&self, bearer: &str, vision: bool) -> HeaderMap {
        let mut headers = self.copilot_headers(bearer, Intent::ConversationPanel);
        headers.insert(
            "copilot-vision-request",
            HeaderValue::from_static(if vision { "true" } else { "false" }),
        );
        headers
    }
}

/// 配置项中的非法字符会被丢弃为空值
fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_info() -> HeadersInfo {
        HeadersInfo::with_rng(&UpstreamConfig::default(), StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_process_identifiers() {
        let info = headers_info();
        assert_eq!(info.machine_id().len(), 64);
        assert!(info.machine_id().chars().all(|c| c.is_ascii_hexdigit()));
        let session = uuid::Uuid::parse_str(info.session_id()).unwrap();
        assert_eq!(session.get_version_num(), 4);
    }

    #[test]
    fn test_request_id_format() {
        let info = headers_info();
        let id = info.request_id();
        let groups: Vec<usize> = id.split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);
        assert!(
            id.chars()
                .all(|c| c == '-' || c.is_ascii_lowercase() || c.is_ascii_digit())
        );
        assert_ne!(id, info.request_id());
    }

    #[test]
    fn test_chat_headers() {
        let info = headers_info();
        let headers = info.chat_headers("tid=1;exp=2", true);

        assert_eq!(headers["authorization"], "Bearer tid=1;exp=2");
        assert_eq!(headers["openai-intent"], "conversation-panel");
        assert_eq!(headers["copilot-vision-request"], "true");
        assert_eq!(headers["openai-organization"], "github-copilot");
        assert_eq!(headers["editor-version"], "vscode/1.98.0-insider");
        assert_eq!(headers["x-github-api-version"], "2025-01-21");
        assert_eq!(headers["vscode-machineid"], info.machine_id());
        assert!(headers.contains_key("x-request-id"));
    }

    #[test]
    fn test_token_exchange_headers() {
        let info = headers_info();
        let headers = info.token_exchange_headers("ghu_abc");
        assert_eq!(headers["authorization"], "token ghu_abc");
        assert_eq!(headers["user-agent"], "GitHubCopilotChat/0.23.2");
        assert!(!headers.contains_key("x-request-id"));

        let models = info.copilot_headers("t", Intent::ModelAccess);
        assert_eq!(models["openai-intent"], "model-access");
        assert!(!models.contains_key("copilot-vision-request"));
    }
}
