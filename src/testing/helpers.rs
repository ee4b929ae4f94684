//! # 测试辅助函数

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::sync::Once;
use tracing::Level;

use crate::config::AppConfig;

static INIT: Once = Once::new();

/// 初始化测试日志
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 创建已迁移的内存数据库
///
/// 每个连接都会打开独立的内存库，所以连接池固定为单个常驻连接
pub async fn create_test_db() -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    migration::Migrator::up(&db, None).await?;

    Ok(db)
}

/// 指向本地模拟上游的配置
#[must_use]
pub fn test_config(upstream_base: &str) -> AppConfig {
    let mut config = AppConfig::default();
    let base = upstream_base.trim_end_matches('/');
    config.upstream.api_base_url = base.to_string();
    config.upstream.token_url = format!("{base}/copilot_internal/v2/token");
    config.upstream.timeout_seconds = 5;
    config.upstream.connect_timeout_seconds = 2;
    config
}
