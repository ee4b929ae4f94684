//! Errors raised by the credential store.

use sea_orm::DbErr;
use thiserror::Error;

use super::ProxyError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential already stored: {0}")]
    DuplicateKey(String),

    #[error("credential not found: {0}")]
    NotFound(String),

    #[error("no credentials stored")]
    NoCredentials,

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl From<StoreError> for ProxyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoCredentials => Self::unauthorized("No valid credentials available"),
            StoreError::Database(db) => Self::database_with_source("凭证存储操作失败", db),
            other => Self::internal_with_source(other.to_string(), other),
        }
    }
}
