use crate::account_pool::clock::{Clock, SystemClock};
use crate::credential::types::{AuthDetails, access_token_expired};
use moka::future::Cache;
use std::sync::Arc;

const DEFAULT_AUTH_CACHE_CAPACITY: u64 = 10_000;

/// 以 refresh 字符串为键缓存最近一次凭据快照，优先返回未过期的 access token。
#[derive(Clone, Debug)]
pub struct AuthCache {
    entries: Cache<String, AuthDetails>,
    clock: Arc<dyn Clock>,
}

fn cache_key(refresh: &str) -> Option<String> {
    let key = refresh.trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

impl AuthCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Cache::new(DEFAULT_AUTH_CACHE_CAPACITY),
            clock,
        }
    }

    /// - 键为空：原样返回，不缓存
    /// - 传入的未过期，或缓存里没有：写入缓存并返回传入值
    /// - 传入的已过期但缓存的未过期：返回缓存值
    /// - 都过期：以传入值覆盖缓存
    pub async fn resolve(&self, auth: AuthDetails) -> AuthDetails {
        let Some(key) = cache_key(&auth.refresh) else {
            return auth;
        };
        let now = self.clock.now_ms();

        if let Some(cached) = self.entries.get(&key).await
            && access_token_expired(&auth, now)
            && !access_token_expired(&cached, now)
        {
            return cached;
        }

        self.entries.insert(key, auth.clone()).await;
        auth
    }

    pub async fn store(&self, auth: &AuthDetails) {
        if let Some(key) = cache_key(&auth.refresh) {
            self.entries.insert(key, auth.clone()).await;
        }
    }

    /// 不传 refresh 时清空全部。
    pub async fn clear(&self, refresh: Option<&str>) {
        match refresh {
            None => self.entries.invalidate_all(),
            Some(r) => {
                if let Some(key) = cache_key(r) {
                    self.entries.invalidate(&key).await;
                }
            }
        }
    }
}

impl Default for AuthCache {
    fn default() -> Self {
        Self::new()
    }
}
