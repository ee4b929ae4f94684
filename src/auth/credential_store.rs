//! # 凭证存储
//!
//! 长期凭证到临时令牌的持久化映射，基于 sea-orm 的 `tokens` 表

use async_trait::async_trait;
use entity::tokens::{self, Entity as Tokens};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, SqlErr, sea_query::Expr,
};

use crate::error::StoreError;
use crate::logging::{LogComponent, LogStage, mask_secret};
use crate::ldebug;

/// 已缓存的临时令牌
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub token: Option<String>,
    pub expires_at: i64,
}

/// 凭证存储接口
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn exists(&self, long_term: &str) -> Result<bool, StoreError>;

    /// 新建记录，凭证已存在时返回 `DuplicateKey`
    async fn put(&self, long_term: &str, token: &str, expires_at: i64) -> Result<(), StoreError>;

    async fn get_short_term_token(&self, long_term: &str) -> Result<StoredToken, StoreError>;

    /// 原地更新临时令牌，没有命中任何行时返回 `NotFound`
    async fn update(&self, long_term: &str, token: &str, expires_at: i64)
    -> Result<(), StoreError>;

    /// 随机挑选一个已存储的长期凭证
    async fn pick_random(&self) -> Result<String, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

/// sea-orm 实现
#[derive(Debug, Clone)]
pub struct SeaOrmCredentialStore {
    db: DatabaseConnection,
}

impl SeaOrmCredentialStore {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find(&self, long_term: &str) -> Result<Option<tokens::Model>, StoreError> {
        Ok(Tokens::find()
            .filter(tokens::Column::LongTermToken.eq(long_term))
            .one(&self.db)
            .await?)
    }
}

#[async_trait]
impl CredentialStore for SeaOrmCredentialStore {
    async fn exists(&self, long_term: &str) -> Result<bool, StoreError> {
        let count = Tokens::find()
            .filter(tokens::Column::LongTermToken.eq(long_term))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn put(&self, long_term: &str, token: &str, expires_at: i64) -> Result<(), StoreError> {
        let record = tokens::ActiveModel {
            long_term_token: Set(long_term.to_string()),
            temp_token: Set(Some(token.to_string())),
            temp_token_expiry: Set(expires_at),
            ..Default::default()
        };

        match record.insert(&self.db).await {
            Ok(model) => {
                ldebug!(
                    "system",
                    LogStage::Db,
                    LogComponent::CredentialStore,
                    "put",
                    "新凭证已保存",
                    id = model.id,
                    credential = %mask_secret(long_term),
                    expires_at = expires_at
                );
                Ok(())
            }
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    Err(StoreError::DuplicateKey(mask_secret(long_term)))
                }
                _ => Err(StoreError::Database(err)),
            },
        }
    }

    async fn get_short_term_token(&self, long_term: &str) -> Result<StoredToken, StoreError> {
        let model = self
            .find(long_term)
            .await?
            .ok_or_else(|| StoreError::NotFound(mask_secret(long_term)))?;

        Ok(StoredToken {
            token: model.temp_token,
            expires_at: model.temp_token_expiry,
        })
    }

    async fn update(
        &self,
        long_term: &str,
        token: &str,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        let result = Tokens::update_many()
            .col_expr(tokens::Column::TempToken, Expr::value(token.to_string()))
            .col_expr(tokens::Column::TempTokenExpiry, Expr::value(expires_at))
            .filter(tokens::Column::LongTermToken.eq(long_term))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(mask_secret(long_term)));
        }
        Ok(())
    }

    async fn pick_random(&self) -> Result<String, StoreError> {
        let total = self.count().await?;
        if total == 0 {
            return Err(StoreError::NoCredentials);
        }

        let offset = fastrand::u64(0..total);
        let model = Tokens::find()
            .order_by_asc(tokens::Column::Id)
            .offset(offset)
            .limit(1)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NoCredentials)?;

        Ok(model.long_term_token)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(Tokens::find().count(&self.db).await?)
    }
}
