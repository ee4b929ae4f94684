//! # 认证模块
//!
//! 长期凭证解析、临时令牌交换与缓存

pub mod broker;
pub mod credential_store;
pub mod device_flow;
pub mod header_parser;
pub mod token;
pub mod token_exchange;

pub use broker::CredentialBroker;
pub use credential_store::{CredentialStore, SeaOrmCredentialStore, StoredToken};
pub use device_flow::{DeviceCode, GithubDeviceFlow};
pub use header_parser::{PresentedCredential, parse_authorization};
pub use token_exchange::{CopilotTokenExchanger, TokenExchanger};
