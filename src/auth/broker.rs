//! # 凭证代理
//!
//! 将客户端提交（或随机选取）的长期凭证解析为当前有效的 Copilot 临时令牌。
//! 同一凭证的检查与刷新在各自的互斥锁内串行执行，不同凭证互不阻塞。

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::credential_store::CredentialStore;
use super::header_parser::{PresentedCredential, parse_authorization};
use super::token::{extract_expiry, is_usable, now_unix};
use super::token_exchange::TokenExchanger;
use crate::error::{ProxyError, Result, StoreError};
use crate::logging::{LogComponent, LogStage, mask_secret};
use crate::{ldebug, linfo, lwarn};

/// 凭证代理
pub struct CredentialBroker {
    store: Arc<dyn CredentialStore>,
    exchanger: Arc<dyn TokenExchanger>,
    /// 每个长期凭证一把刷新锁
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
    allow_anonymous: bool,
}

impl CredentialBroker {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        exchanger: Arc<dyn TokenExchanger>,
        allow_anonymous: bool,
    ) -> Self {
        Self {
            store,
            exchanger,
            refresh_locks: DashMap::new(),
            allow_anonymous,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// 解析 Authorization 头得到可用的临时令牌
    pub async fn resolve(&self, request_id: &str, authorization: Option<&str>) -> Result<String> {
        let long_term = match parse_authorization(authorization)? {
            PresentedCredential::Bearer(credential) => credential.to_string(),
            PresentedCredential::Absent => self.pick_anonymous(request_id).await?,
        };

        let lock = self.get_refresh_lock(&long_term);
        let result = {
            let _guard = lock.lock().await;
            self.resolve_locked(request_id, &long_term).await
        };
        drop(lock);
        self.release_refresh_lock(&long_term);
        result
    }

    /// 持有该凭证的刷新锁时执行：登记、命中缓存或刷新
    async fn resolve_locked(&self, request_id: &str, long_term: &str) -> Result<String> {
        if !self.store.exists(long_term).await? {
            return self.register(request_id, long_term).await;
        }

        let stored = self.store.get_short_term_token(long_term).await?;
        if is_usable(stored.token.as_deref(), stored.expires_at, now_unix()) {
            ldebug!(
                request_id,
                LogStage::Authentication,
                LogComponent::Broker,
                "cache_hit",
                "使用缓存的临时令牌",
                credential = %mask_secret(long_term),
                expires_at = stored.expires_at
            );
            if let Some(token) = stored.token {
                return Ok(token);
            }
        }

        self.refresh(request_id, long_term).await
    }

    async fn pick_anonymous(&self, request_id: &str) -> Result<String> {
        if !self.allow_anonymous {
            return Err(ProxyError::unauthorized("Authorization header is required"));
        }

        let credential = self.store.pick_random().await.map_err(|e| match e {
            StoreError::NoCredentials => {
                ProxyError::unauthorized("No authorization provided and no stored credentials")
            }
            other => other.into(),
        })?;

        lwarn!(
            request_id,
            LogStage::Authentication,
            LogComponent::Broker,
            "random_credential_selected",
            "请求未携带凭证，随机选用已存储的凭证",
            credential = %mask_secret(&credential)
        );
        Ok(credential)
    }

    /// 首次出现的凭证：交换后落库，直接返回新令牌
    async fn register(&self, request_id: &str, long_term: &str) -> Result<String> {
        let token = self.exchanger.exchange(long_term).await?;
        let expires_at = extract_expiry(&token);

        match self.store.put(long_term, &token, expires_at).await {
            Ok(()) => {}
            Err(StoreError::DuplicateKey(_)) => {
                self.store.update(long_term, &token, expires_at).await?;
            }
            Err(e) => return Err(e.into()),
        }

        linfo!(
            request_id,
            LogStage::Authentication,
            LogComponent::Broker,
            "credential_registered",
            "新凭证已登记",
            credential = %mask_secret(long_term),
            expires_at = expires_at
        );
        Ok(token)
    }

    async fn refresh(&self, request_id: &str, long_term: &str) -> Result<String> {
        let token = self.exchanger.exchange(long_term).await?;
        let expires_at = extract_expiry(&token);
        self.store.update(long_term, &token, expires_at).await?;

        linfo!(
            request_id,
            LogStage::Authentication,
            LogComponent::Broker,
            "token_refreshed",
            "临时令牌已刷新",
            credential = %mask_secret(long_term),
            expires_at = expires_at
        );
        Ok(token)
    }

    fn get_refresh_lock(&self, long_term: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(long_term.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 没有其他请求持有或等待时移除该凭证的锁
    fn release_refresh_lock(&self, long_term: &str) {
        self.refresh_locks
            .remove_if(long_term, |_, lock| Arc::strong_count(lock) == 1);
    }
}
