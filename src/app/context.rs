//! 应用上下文（DI 容器）
//!
//! 统一持有跨模块共享的服务实例，便于在测试中注入替身实现。

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::auth::{CopilotTokenExchanger, CredentialBroker, SeaOrmCredentialStore};
use crate::catalog::ModelCatalog;
use crate::config::AppConfig;
use crate::error::Result;
use crate::proxy::relay::ForwardingRelay;
use crate::upstream::{HeadersInfo, UpstreamClient};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub broker: Arc<CredentialBroker>,
    pub relay: Arc<ForwardingRelay>,
    pub catalog: Arc<ModelCatalog>,
}

impl AppContext {
    pub const fn new(
        config: Arc<AppConfig>,
        broker: Arc<CredentialBroker>,
        relay: Arc<ForwardingRelay>,
        catalog: Arc<ModelCatalog>,
    ) -> Self {
        Self {
            config,
            broker,
            relay,
            catalog,
        }
    }

    /// 按配置装配全部服务
    pub fn build(config: AppConfig, db: DatabaseConnection) -> Result<Self> {
        let headers = Arc::new(HeadersInfo::new(&config.upstream));
        let upstream = UpstreamClient::new(&config.upstream, headers)?;

        let store = Arc::new(SeaOrmCredentialStore::new(db));
        let exchanger = Arc::new(CopilotTokenExchanger::new(upstream.clone()));
        let broker = Arc::new(CredentialBroker::new(
            store,
            exchanger,
            config.auth.allow_anonymous,
        ));

        Ok(Self::new(
            Arc::new(config),
            broker,
            Arc::new(ForwardingRelay::new(upstream)),
            Arc::new(ModelCatalog::builtin()?),
        ))
    }
}
