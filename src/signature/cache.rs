use crate::account_pool::clock::{Clock, SystemClock};
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// 单条签名的有效期。
pub const SIGNATURE_TTL_MS: i64 = 60 * 60 * 1000;
/// 每个会话最多保留的签名数。
pub const MAX_ENTRIES_PER_SESSION: usize = 100;
const DEFAULT_SESSION_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone)]
struct SignatureEntry {
    signature: String,
    stored_at: i64,
}

type SessionEntries = Arc<Mutex<HashMap<i32, SignatureEntry>>>;

/// thinking 签名缓存：会话 id -> (thinking 文本哈希 -> 签名)。
///
/// 会话本身由 moka 管理（闲置超过 TTL 的会话整体淘汰）；会话内的条目按写入时间判定过期。
#[derive(Clone, Debug)]
pub struct SignatureCache {
    sessions: Cache<String, SessionEntries>,
    clock: Arc<dyn Clock>,
}

/// 32 位滚动哈希（`h = h * 31 + c`，按 UTF-16 码元）。
pub fn hash_text(text: &str) -> i32 {
    text.encode_utf16().fold(0i32, |h, c| {
        h.wrapping_shl(5).wrapping_sub(h).wrapping_add(i32::from(c))
    })
}

impl SignatureCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(DEFAULT_SESSION_CAPACITY)
                .time_to_idle(Duration::from_millis(SIGNATURE_TTL_MS as u64))
                .build(),
            clock,
        }
    }

    pub async fn cache_signature(&self, session_id: &str, text: &str, signature: &str) {
        if session_id.is_empty() || text.is_empty() || signature.is_empty() {
            return;
        }

        let entries = self
            .sessions
            .get_with(session_id.to_string(), async { SessionEntries::default() })
            .await;
        let now = self.clock.now_ms();
        let mut entries = entries.lock().await;

        if entries.len() >= MAX_ENTRIES_PER_SESSION {
            entries.retain(|_, e| now - e.stored_at <= SIGNATURE_TTL_MS);
        }
        // 仍然满：淘汰最旧的四分之一
        if entries.len() >= MAX_ENTRIES_PER_SESSION {
            let mut by_age: Vec<(i32, i64)> =
                entries.iter().map(|(k, e)| (*k, e.stored_at)).collect();
            by_age.sort_by_key(|(_, stored_at)| *stored_at);
            for (key, _) in by_age.into_iter().take(MAX_ENTRIES_PER_SESSION / 4) {
                entries.remove(&key);
            }
        }

        entries.insert(
            hash_text(text),
            SignatureEntry {
                signature: signature.to_string(),
                stored_at: now,
            },
        );
    }

    pub async fn get_signature(&self, session_id: &str, text: &str) -> Option<String> {
        if session_id.is_empty() || text.is_empty() {
            return None;
        }
        let entries = self.sessions.get(session_id).await?;
        let mut entries = entries.lock().await;
        let key = hash_text(text);
        let entry = entries.get(&key)?;
        if self.clock.now_ms() - entry.stored_at > SIGNATURE_TTL_MS {
            entries.remove(&key);
            return None;
        }
        Some(entry.signature.clone())
    }

    /// 不传会话 id 时清空全部。
    pub async fn clear(&self, session_id: Option<&str>) {
        match session_id {
            Some(id) => self.sessions.invalidate(id).await,
            None => self.sessions.invalidate_all(),
        }
    }
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self::new()
    }
}
