//! # 配置管理器
//!
//! 定位配置文件、解析 TOML 并应用环境变量覆盖

use std::env;
use std::path::{Path, PathBuf};

use super::AppConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "COPILOT_GATEWAY_CONFIG";

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: AppConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// 按约定位置加载配置
    ///
    /// 顺序：显式路径 > `$COPILOT_GATEWAY_CONFIG` > `config/config.{RUST_ENV}.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = explicit_path.map_or_else(Self::default_path, Path::to_path_buf);
        Self::from_file(&path, explicit_path.is_some())
    }

    fn default_path() -> PathBuf {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        PathBuf::from(format!("config/config.{env}.toml"))
    }

    /// 从指定文件创建配置管理器
    ///
    /// `required` 为 false 时文件缺失会回退到默认配置
    pub fn from_file(path: &Path, required: bool) -> Result<Self> {
        let (mut config, source) = if path.exists() {
            (Self::load_config_file(path)?, Some(path.to_path_buf()))
        } else if required {
            return Err(ProxyError::config(format!(
                "配置文件不存在: {}",
                path.display()
            )));
        } else {
            lwarn!(
                "system",
                LogStage::Configuration,
                LogComponent::Config,
                "config_file_missing",
                &format!("配置文件不存在，使用默认配置: {}", path.display())
            );
            (AppConfig::default(), None)
        };

        let applied = Self::apply_env_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;

        linfo!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "config_loaded",
            "配置加载完成",
            env_overrides = applied,
            port = config.server.port
        );

        Ok(Self { config, source })
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// 实际读取的配置文件，使用默认配置时为 None
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// 加载配置文件
    fn load_config_file(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| {
            ProxyError::config_with_source(
                format!("TOML解析失败 - 配置文件: {}", path.display()),
                e,
            )
        })
    }

    /// 应用环境变量覆盖，返回生效的覆盖数量
    fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<usize>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = 0;

        if let Some(value) = lookup("COPILOT_GATEWAY_PORT") {
            config.server.port = value.parse().map_err(|e| {
                ProxyError::config_with_source(format!("无效的端口号: {value}"), e)
            })?;
            applied += 1;
        }
        if let Some(value) = lookup("COPILOT_GATEWAY_DATABASE_URL") {
            config.database.url = value;
            applied += 1;
        }
        if let Some(value) = lookup("COPILOT_GATEWAY_API_BASE_URL") {
            config.upstream.api_base_url = value;
            applied += 1;
        }
        if let Some(value) = lookup("COPILOT_GATEWAY_TOKEN_URL") {
            config.upstream.token_url = value;
            applied += 1;
        }

        ldebug!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "env_overrides",
            &format!("应用了 {applied} 个环境变量覆盖")
        );
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("COPILOT_GATEWAY_PORT", "9191"),
            ("COPILOT_GATEWAY_TOKEN_URL", "http://127.0.0.1:1/token"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        let applied = ConfigManager::apply_env_overrides(&mut config, |key| {
            vars.get(key).map(ToString::to_string)
        })
        .unwrap();

        assert_eq!(applied, 2);
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.upstream.token_url, "http://127.0.0.1:1/token");
        assert_eq!(config.database.url, "sqlite://./data/tokens.db");
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = AppConfig::default();
        let result = ConfigManager::apply_env_overrides(&mut config, |key| {
            (key == "COPILOT_GATEWAY_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 18080\n\n[database]\nurl = \"sqlite::memory:\""
        )
        .unwrap();

        let manager = ConfigManager::from_file(file.path(), true).unwrap();
        assert_eq!(manager.source(), Some(file.path()));
        assert!(manager.config().database.is_memory_database());
    }

    #[test]
    fn test_missing_file() {
        let missing = Path::new("/definitely/not/here.toml");
        assert!(ConfigManager::from_file(missing, true).is_err());

        let manager = ConfigManager::from_file(missing, false).unwrap();
        assert!(manager.source().is_none());
    }
}
