//! # 配置管理模块
//!
//! 处理应用配置加载、环境变量覆盖和校验

mod app_config;
mod database;
mod manager;

pub use app_config::{AppConfig, AuthConfig, ServerConfig, UpstreamConfig};
pub use database::DatabaseConfig;
pub use manager::ConfigManager;
