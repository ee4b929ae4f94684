//! # 模型目录
//!
//! 启动时从内置 JSON 构建的只读模型列表，作为 `/v1/models` 的回退数据和嵌入模型校验依据

use serde_json::{Value, json};
use std::collections::HashSet;

use crate::error::{ProxyError, Result};

const BUILTIN_MODELS: &str = include_str!("../../data/models.json");

/// 只读模型目录
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<Value>,
    ids: HashSet<String>,
}

impl ModelCatalog {
    /// 内置模型目录
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_MODELS)
    }

    /// 从 JSON 数组构建，每个元素必须带字符串 `id`
    pub fn from_json(raw: &str) -> Result<Self> {
        let models: Vec<Value> = serde_json::from_str(raw)
            .map_err(|e| ProxyError::config_with_source("模型目录解析失败", e))?;

        let ids = models
            .iter()
            .map(|model| {
                model
                    .get("id")
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
                    .ok_or_else(|| ProxyError::config("模型目录中存在缺少id的条目"))
            })
            .collect::<Result<HashSet<_>>>()?;

        Ok(Self { models, ids })
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn models(&self) -> &[Value] {
        &self.models
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// OpenAI 风格的列表响应 `{data, object: "list"}`
    #[must_use]
    pub fn to_list_response(&self) -> Value {
        json!({
            "data": self.models,
            "object": "list",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = ModelCatalog::builtin().unwrap();
        for id in [
            "gpt-4o",
            "o1",
            "o3-mini",
            "claude-3.5-sonnet",
            "text-embedding-3-small",
            "text-embedding-ada-002",
        ] {
            assert!(catalog.contains(id), "{id}");
        }
        assert!(!catalog.contains("bogus-model"));
        assert_eq!(catalog.len(), catalog.models().len());
    }

    #[test]
    fn test_list_response_shape() {
        let catalog = ModelCatalog::from_json(r#"[{"id":"a","object":"model"}]"#).unwrap();
        assert_eq!(
            catalog.to_list_response(),
            json!({"data": [{"id": "a", "object": "model"}], "object": "list"})
        );
    }

    #[test]
    fn test_rejects_entries_without_id() {
        assert!(ModelCatalog::from_json(r#"[{"name":"nameless"}]"#).is_err());
        assert!(ModelCatalog::from_json("{}").is_err());
    }
}
