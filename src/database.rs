//! # 数据库模块
//!
//! 数据库连接和迁移管理

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::path::Path;

use crate::config::DatabaseConfig;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, linfo};

/// 初始化数据库连接
pub async fn init_database(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    connect(ConnectOptions::new(database_url)).await
}

/// 按配置初始化数据库连接池
pub async fn init_database_with_config(
    config: &DatabaseConfig,
) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(&config.url);
    options
        .max_connections(config.max_connections)
        .connect_timeout(config.connect_timeout())
        .sqlx_logging(false);
    connect(options).await
}

async fn connect(options: ConnectOptions) -> Result<DatabaseConnection, DbErr> {
    let database_url = options.get_url().to_string();
    linfo!(
        "system",
        LogStage::Db,
        LogComponent::Database,
        "connect",
        &format!("正在连接数据库: {database_url}")
    );

    if let Some(db_path) = sqlite_file_path(&database_url) {
        ensure_sqlite_file(db_path)?;
    }

    let db = Database::connect(options).await?;

    linfo!("system", LogStage::Db, LogComponent::Database, "connected", "数据库连接成功");
    Ok(db)
}

/// 提取 SQLite 文件路径；内存库或非 SQLite 返回 None
fn sqlite_file_path(database_url: &str) -> Option<&Path> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    Some(Path::new(path))
}

/// SQLite 不会自动创建文件，这里先建好目录和空文件
fn ensure_sqlite_file(db_path: &Path) -> Result<(), DbErr> {
    let missing_parent = db_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty() && !dir.exists());
    if let Some(parent_dir) = missing_parent {
        std::fs::create_dir_all(parent_dir).map_err(|e| {
            DbErr::Custom(format!("无法创建数据库目录 {}: {e}", parent_dir.display()))
        })?;
        ldebug!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "create_db_dir",
            &format!("数据库目录创建成功: {}", parent_dir.display())
        );
    }

    if !db_path.exists() {
        std::fs::File::create(db_path).map_err(|e| {
            DbErr::Custom(format!("无法创建数据库文件 {}: {e}", db_path.display()))
        })?;
        linfo!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "create_db_file",
            &format!("数据库文件创建成功: {}", db_path.display())
        );
    }

    Ok(())
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    linfo!("system", LogStage::Db, LogComponent::Database, "migrate", "开始运行数据库迁移...");

    match ::migration::Migrator::up(db, None).await {
        Ok(()) => {
            linfo!("system", LogStage::Db, LogComponent::Database, "migrate", "数据库迁移完成");
            Ok(())
        }
        Err(e) => {
            lerror!(
                "system",
                LogStage::Db,
                LogComponent::Database,
                "migrate_failed",
                &format!("数据库迁移失败: {e}")
            );
            Err(e)
        }
    }
}
