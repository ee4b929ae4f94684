//! # 请求转换
//!
//! 将 OpenAI 风格的请求体转换为 Copilot 上游期望的结构。
//! 转换总是生成新的信封，不会修改解析后的客户端请求。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::ModelCatalog;
use crate::error::RequestError;

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_TEMPERATURE: f64 = 0.6;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_MAX_TOKENS: u64 = 4096;
/// 只转发最近的若干条消息
pub const MAX_FORWARDED_MESSAGES: usize = 100;

/// `/v1/chat/completions` 请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<Value>>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    /// 其余字段，原样转发
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 发往上游的聊天请求
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEnvelope {
    pub model: String,
    pub messages: Vec<Value>,
    pub stream: bool,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u64,
    #[serde(flatten)]
    pub passthrough: Map<String, Value>,
}

/// 聊天请求转换结果
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedChat {
    pub envelope: ChatEnvelope,
    /// 是否包含图片输入，决定 `copilot-vision-request` 头
    pub vision: bool,
}

impl TranslatedChat {
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        self.envelope.stream
    }
}

/// `/v1/embeddings` 请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddingRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub user: Option<String>,
}

/// 发往上游的嵌入请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddingEnvelope {
    pub model: String,
    pub input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// 嵌入请求转换结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedEmbeddings {
    pub envelope: EmbeddingEnvelope,
    /// 目录中不存在、被替换为默认值的模型名
    pub replaced_model: Option<String>,
}

/// 解析请求体，类型不符同样视为无效 JSON
pub fn parse_body<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, RequestError> {
    serde_json::from_slice(body).map_err(|e| RequestError::InvalidJson(e.to_string()))
}

/// 转换聊天请求
pub fn translate_chat(request: &ChatCompletionRequest) -> Result<TranslatedChat, RequestError> {
    let mut messages: Vec<Value> = request
        .messages
        .iter()
        .flatten()
        .filter(|message| is_well_formed_message(message))
        .cloned()
        .collect();

    if messages.is_empty() {
        return Err(RequestError::EmptyMessages);
    }
    if messages.len() > MAX_FORWARDED_MESSAGES {
        messages.drain(..messages.len() - MAX_FORWARDED_MESSAGES);
    }

    let model = request
        .model
        .as_deref()
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_CHAT_MODEL)
        .to_string();

    // o1 系列不支持流式输出
    let stream = request.stream.unwrap_or(false) && !model.starts_with("o1");

    let vision = messages.iter().any(has_image_content);

    Ok(TranslatedChat {
        envelope: ChatEnvelope {
            model,
            messages,
            stream,
            temperature: non_zero(request.temperature).unwrap_or(DEFAULT_TEMPERATURE),
            top_p: non_zero(request.top_p).unwrap_or(DEFAULT_TOP_P),
            max_tokens: request
                .max_tokens
                .filter(|t| *t != 0)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            passthrough: request.extra.clone(),
        },
        vision,
    })
}

/// 转换嵌入请求，未知模型回退到默认嵌入模型
pub fn translate_embeddings(
    request: &EmbeddingRequest,
    catalog: &ModelCatalog,
) -> Result<TranslatedEmbeddings, RequestError> {
    let input = normalize_input(request.input.as_ref())?;

    let requested = request.model.as_deref().filter(|m| !m.is_empty());
    let (model, replaced_model) = match requested {
        None => (DEFAULT_EMBEDDING_MODEL.to_string(), None),
        Some(m) if catalog.contains(m) => (m.to_string(), None),
        Some(m) => (DEFAULT_EMBEDDING_MODEL.to_string(), Some(m.to_string())),
    };

    Ok(TranslatedEmbeddings {
        envelope: EmbeddingEnvelope {
            model,
            input,
            user: request.user.clone().filter(|u| !u.is_empty()),
        },
        replaced_model,
    })
}

/// 字符串或字符串数组统一为数组
fn normalize_input(input: Option<&Value>) -> Result<Vec<String>, RequestError> {
    match input {
        Some(Value::String(text)) => Ok(vec![text.clone()]),
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.as_str().map(ToString::to_string).ok_or_else(|| {
                    RequestError::InvalidInput("input array must contain only strings".into())
                })
            })
            .collect(),
        Some(Value::Array(_)) => Err(RequestError::InvalidInput(
            "input array must not be empty".into(),
        )),
        Some(_) => Err(RequestError::InvalidInput(
            "input must be a string or an array of strings".into(),
        )),
        None => Err(RequestError::InvalidInput("input is required".into())),
    }
}

fn is_well_formed_message(message: &Value) -> bool {
    message
        .get("role")
        .and_then(Value::as_str)
        .is_some_and(|role| !role.is_empty())
}

/// content 数组中存在带非空 URL 的 `image_url` 元素
fn has_image_content(message: &Value) -> bool {
    let Some(parts) = message.get("content").and_then(Value::as_array) else {
        return false;
    };

    parts.iter().any(|part| {
        if part.get("type").and_then(Value::as_str) != Some("image_url") {
            return false;
        }
        let url = part
            .get("image_url")
            .and_then(|image| image.get("url"))
            .or_else(|| part.get("url"))
            .and_then(Value::as_str);
        url.is_some_and(|u| !u.is_empty())
    })
}

fn non_zero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.abs() > f64::EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn chat(body: Value) -> ChatCompletionRequest {
        serde_json::from_value(body).unwrap()
    }

    fn user(content: &str) -> Value {
        json!({"role": "user", "content": content})
    }

    #[test]
    fn test_defaults_applied() {
        let translated = translate_chat(&chat(json!({
            "messages": [user("hi")],
            "temperature": 0,
            "top_p": 0.0,
            "max_tokens": 0
        })))
        .unwrap();

        let envelope = translated.envelope;
        assert_eq!(envelope.model, DEFAULT_CHAT_MODEL);
        assert!((envelope.temperature - DEFAULT_TEMPERATURE).abs() < f64::EPSILON);
        assert!((envelope.top_p - DEFAULT_TOP_P).abs() < f64::EPSILON);
        assert_eq!(envelope.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(!envelope.stream);
        assert!(!translated.vision);
    }

    #[test]
    fn test_explicit_values_kept() {
        let translated = translate_chat(&chat(json!({
            "model": "claude-3.5-sonnet",
            "messages": [user("hi")],
            "stream": true,
            "temperature": 1.2,
            "top_p": 0.5,
            "max_tokens": 128
        })))
        .unwrap();

        let envelope = &translated.envelope;
        assert_eq!(envelope.model, "claude-3.5-sonnet");
        assert!(translated.is_stream());
        assert!((envelope.temperature - 1.2).abs() < f64::EPSILON);
        assert_eq!(envelope.max_tokens, 128);
    }

    #[test]
    fn test_truncates_to_most_recent_messages() {
        let messages: Vec<Value> = (0..150).map(|i| user(&format!("m{i}"))).collect();
        let translated = translate_chat(&chat(json!({ "messages": messages }))).unwrap();

        let forwarded = &translated.envelope.messages;
        assert_eq!(forwarded.len(), MAX_FORWARDED_MESSAGES);
        assert_eq!(forwarded[0]["content"], "m50");
        assert_eq!(forwarded[99]["content"], "m149");
    }

    #[rstest]
    #[case("o1", true, false)]
    #[case("o1-mini", true, false)]
    #[case("o3-mini", true, true)]
    #[case("gpt-4o", false, false)]
    fn test_stream_flag(#[case] model: &str, #[case] requested: bool, #[case] expected: bool) {
        let translated = translate_chat(&chat(json!({
            "model": model,
            "messages": [user("hi")],
            "stream": requested
        })))
        .unwrap();
        assert_eq!(translated.is_stream(), expected);
    }

    #[rstest]
    #[case(json!({"messages": []}))]
    #[case(json!({}))]
    #[case(json!({"messages": ["just a string", {"content": "no role"}, {"role": ""}]}))]
    fn test_empty_messages_rejected(#[case] body: Value) {
        assert!(matches!(
            translate_chat(&chat(body)),
            Err(RequestError::EmptyMessages)
        ));
    }

    #[test]
    fn test_malformed_messages_dropped() {
        let translated = translate_chat(&chat(json!({
            "messages": [42, {"content": "orphan"}, user("kept")]
        })))
        .unwrap();
        assert_eq!(translated.envelope.messages, vec![user("kept")]);
    }

    #[rstest]
    #[case(json!({"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}), true)]
    #[case(json!({"type": "image_url", "url": "https://example.com/cat.png"}), true)]
    #[case(json!({"type": "image_url", "image_url": {"url": ""}}), false)]
    #[case(json!({"type": "text", "text": "no picture"}), false)]
    fn test_vision_detection(#[case] part: Value, #[case] expected: bool) {
        let translated = translate_chat(&chat(json!({
            "messages": [{"role": "user", "content": [{"type": "text", "text": "look"}, part]}]
        })))
        .unwrap();
        assert_eq!(translated.vision, expected);
    }

    #[test]
    fn test_unknown_fields_forwarded_verbatim() {
        let translated = translate_chat(&chat(json!({
            "messages": [user("hi")],
            "temperature": 0,
            "tools": [{"type": "function", "function": {"name": "f"}}],
            "seed": 7,
            "stop": null,
            "stream_options": {"include_usage": true},
            "parallel_tool_calls": false,
            "logit_bias": {"50256": -100},
            "intent": true
        })))
        .unwrap();

        let value = serde_json::to_value(&translated.envelope).unwrap();
        assert_eq!(value["seed"], 7);
        assert_eq!(value["tools"][0]["function"]["name"], "f");
        assert_eq!(value["stop"], Value::Null);
        assert_eq!(value["stream_options"], json!({"include_usage": true}));
        assert_eq!(value["parallel_tool_calls"], false);
        assert_eq!(value["logit_bias"], json!({"50256": -100}));
        assert_eq!(value["intent"], true);
        // 默认值仍然覆盖客户端的零值
        assert_eq!(value["temperature"], DEFAULT_TEMPERATURE);
        assert_eq!(value["model"], DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn test_request_not_mutated() {
        let request = chat(json!({"messages": [user("hi")], "model": ""}));
        let before = format!("{request:?}");
        translate_chat(&request).unwrap();
        assert_eq!(format!("{request:?}"), before);
    }

    #[test]
    fn test_wrong_field_type_is_invalid_json() {
        let err = parse_body::<ChatCompletionRequest>(br#"{"messages": "nope"}"#).unwrap_err();
        assert!(matches!(err, RequestError::InvalidJson(_)));
        assert!(parse_body::<ChatCompletionRequest>(b"{not json").is_err());
    }

    fn embeddings(body: Value) -> Result<TranslatedEmbeddings, RequestError> {
        let request: EmbeddingRequest = serde_json::from_value(body).unwrap();
        translate_embeddings(&request, &ModelCatalog::builtin().unwrap())
    }

    #[test]
    fn test_single_string_equals_one_element_list() {
        let single = embeddings(json!({"input": "hello"})).unwrap();
        let list = embeddings(json!({"input": ["hello"]})).unwrap();

        assert_eq!(single, list);
        assert_eq!(
            serde_json::to_value(&single.envelope).unwrap(),
            json!({"model": DEFAULT_EMBEDDING_MODEL, "input": ["hello"]})
        );
    }

    #[test]
    fn test_unknown_embedding_model_falls_back() {
        let translated = embeddings(json!({"model": "bogus-model", "input": "x"})).unwrap();
        assert_eq!(translated.envelope.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(translated.replaced_model.as_deref(), Some("bogus-model"));

        let known = embeddings(json!({"model": "text-embedding-ada-002", "input": "x"})).unwrap();
        assert_eq!(known.envelope.model, "text-embedding-ada-002");
        assert_eq!(known.replaced_model, None);
    }

    #[test]
    fn test_embedding_user_passthrough() {
        let translated = embeddings(json!({"input": "x", "user": "alice"})).unwrap();
        assert_eq!(translated.envelope.user.as_deref(), Some("alice"));

        let translated = embeddings(json!({"input": "x", "user": ""})).unwrap();
        assert_eq!(translated.envelope.user, None);
    }

    #[rstest]
    #[case(json!({}))]
    #[case(json!({"input": []}))]
    #[case(json!({"input": 42}))]
    #[case(json!({"input": ["ok", 1]}))]
    #[case(json!({"input": {"text": "x"}}))]
    fn test_invalid_embedding_input(#[case] body: Value) {
        assert!(matches!(embeddings(body), Err(RequestError::InvalidInput(_))));
    }
}
