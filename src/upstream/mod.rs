//! # 上游通信
//!
//! Copilot API 的客户端、端点与请求头

pub mod client;
pub mod headers;

pub use client::{Endpoint, UpstreamClient};
pub use headers::{HeadersInfo, Intent};
