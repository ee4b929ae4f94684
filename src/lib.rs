//! # Copilot Gateway
//!
//! 面向 GitHub Copilot 的 OpenAI 兼容网关：凭证交换缓存与流式转发

pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod upstream;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use app::AppContext;
pub use config::AppConfig;
pub use error::{ProxyError, Result};
