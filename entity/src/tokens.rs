//! # 凭证映射实体定义
//!
//! 长期凭证（GitHub OAuth token）与短期上游令牌的映射表

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 凭证映射实体
///
/// `temp_token_expiry` 为 Unix 秒，从未签发时为 0
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub long_term_token: String,
    pub temp_token: Option<String>,
    pub temp_token_expiry: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
