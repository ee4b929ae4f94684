//! # 代理服务模块
//!
//! OpenAI 兼容接口：请求转换、上游转发与 SSE 中继

pub mod handlers;
pub mod relay;
pub mod server;
pub mod sse;
pub mod state;
pub mod translator;

pub use relay::ForwardingRelay;
pub use server::{bind_listener, create_router, serve};
pub use state::ProxyState;
