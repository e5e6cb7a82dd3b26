use crate::account_pool::clock::{Clock, SystemClock};
use crate::account_pool::events::{EventSink, NoopSink, PoolEvent, SelectionReason, WaitEntry};
use crate::account_pool::rate_limit::RateLimitNotice;
use crate::account_pool::selector;
use crate::account_pool::types::{Account, AccountId, ModelFamily, SwitchReason};
use crate::credential::store::{AccountRecord, AccountStorage, AccountStore};
use crate::credential::types::{AuthDetails, RefreshParts};
use crate::error::AppError;
use crate::logging;
use crate::util::model::request_model;
use std::sync::Arc;

pub const DEFAULT_TOAST_DEBOUNCE_MS: i64 = 30_000;

/// 多账号池：粘性选择 + 按模型族独立的限流记录。
///
/// 同一个账号会被持续使用，直到它在某个模型族上被限流；之后在“当前可用”子集上轮询。
/// 池本身不加锁，多线程宿主需要在外部串行化所有修改操作。
#[derive(Debug)]
pub struct AccountPool {
    accounts: Vec<Account>,
    cursor: usize,
    current_index: Option<usize>,
    last_toast_index: Option<usize>,
    last_toast_time: i64,
    toast_debounce_ms: i64,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl AccountPool {
    pub fn new(fallback: Option<&AuthDetails>, stored: Option<AccountStorage>) -> Self {
        Self::with_clock(fallback, stored, Arc::new(SystemClock))
    }

    /// 构造规则（只在构造时评估一次）：
    /// 1. 存储存在但为空：空池，忽略 fallback
    /// 2. 存储存在且非空：按存储建池，fallback 的 access token 只挂到 refresh token 相同的账号上
    /// 3. 存储不存在但有 fallback：由 fallback 生成单账号
    /// 4. 其它：空池
    pub fn with_clock(
        fallback: Option<&AuthDetails>,
        stored: Option<AccountStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut pool = Self {
            accounts: Vec::new(),
            cursor: 0,
            current_index: None,
            last_toast_index: None,
            last_toast_time: 0,
            toast_debounce_ms: DEFAULT_TOAST_DEBOUNCE_MS,
            clock,
            sink: Arc::new(NoopSink),
        };
        let now = pool.clock.now_ms();
        let fallback_parts = fallback.map(AuthDetails::parts);

        match stored {
            Some(storage) if storage.accounts.is_empty() => {}
            Some(storage) => {
                pool.accounts = storage
                    .accounts
                    .into_iter()
                    .filter(|rec| !rec.refresh_token.is_empty())
                    .enumerate()
                    .map(|(index, rec)| {
                        let matches_fallback = fallback_parts
                            .as_ref()
                            .is_some_and(|p| p.refresh_token == rec.refresh_token);
                        let mut acc = account_from_record(index, rec, now);
                        if matches_fallback && let Some(auth) = fallback {
                            acc.access = auth.access.clone();
                            acc.expires = auth.expires;
                        }
                        acc
                    })
                    .collect();

                if !pool.accounts.is_empty() {
                    pool.cursor = storage.active_index % pool.accounts.len();
                    pool.current_index = Some(pool.cursor);
                }
            }
            None => {
                if let (Some(auth), Some(parts)) = (fallback, fallback_parts)
                    && !parts.refresh_token.is_empty()
                {
                    let mut acc = Account::new(0, parts, now);
                    acc.access = auth.access.clone();
                    acc.expires = auth.expires;
                    pool.accounts.push(acc);
                    pool.current_index = Some(0);
                }
            }
        }

        pool
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// 账号切换提示的去抖窗口（负数按 0 处理）。
    pub fn with_toast_debounce(mut self, debounce_ms: i64) -> Self {
        self.toast_debounce_ms = debounce_ms.max(0);
        self
    }

    /// 从磁盘加载（存储不可用时按“不存在”处理）。
    pub async fn load_from_store(store: &AccountStore, fallback: Option<&AuthDetails>) -> Self {
        let stored = store.load_or_absent().await;
        Self::new(fallback, stored)
    }

    pub async fn save_to_store(&self, store: &AccountStore) -> Result<(), AppError> {
        store.save(&self.to_storage()).await
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn snapshot(&self) -> Vec<Account> {
        self.accounts.clone()
    }

    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn current_account(&self) -> Option<&Account> {
        self.current_index.and_then(|i| self.accounts.get(i))
    }

    fn position(&self, id: AccountId) -> Option<usize> {
        self.accounts.iter().position(|a| a.id == id)
    }

    /// 主要选择入口：当前账号在该模型族上可用则沿用（不移动游标），否则轮询下一个并设为当前账号。
    pub fn current_or_next_for_family(&mut self, family: ModelFamily) -> Option<&Account> {
        let now = self.clock.now_ms();
        let mut reason = SelectionReason::Initial;

        if let Some(cur) = self.current_index
            && let Some(acc) = self.accounts.get_mut(cur)
        {
            acc.rate_limit_reset_times.clear_expired(now);
            if !acc.rate_limit_reset_times.is_limited(family, now) {
                acc.last_used = now;
                self.emit_selected(cur, family, SelectionReason::Sticky);
                return self.accounts.get(cur);
            }
            reason = SelectionReason::RateLimit;
        }

        let pos = self.select_next(family, now)?;
        self.current_index = Some(pos);
        self.accounts[pos].last_switch_reason = Some(match reason {
            SelectionReason::RateLimit => SwitchReason::RateLimit,
            _ => SwitchReason::Initial,
        });
        self.emit_selected(pos, family, reason);
        self.accounts.get(pos)
    }

    /// 按请求（URL + 请求体里的模型名）决定模型族后选择账号。
    pub fn select_for_request(&mut self, url: &str, model: Option<&str>) -> Option<&Account> {
        let model = request_model(url, model);
        let family = ModelFamily::for_optional_model(model.as_deref());
        logging::model_family(url, model.as_deref(), family);
        self.current_or_next_for_family(family)
    }

    /// 在当前可用子集上轮询；子集为空返回 None（池已耗尽，调用方应等待而不是立即重试）。
    pub fn next_for_family(&mut self, family: ModelFamily) -> Option<&Account> {
        let now = self.clock.now_ms();
        let pos = self.select_next(family, now)?;
        self.emit_selected(pos, family, SelectionReason::Rotation);
        self.accounts.get(pos)
    }

    fn select_next(&mut self, family: ModelFamily, now: i64) -> Option<usize> {
        let eligible = selector::eligible_positions(&mut self.accounts, family, now);
        let Some(pos) = selector::round_robin(&eligible, self.cursor) else {
            self.sink.emit(&PoolEvent::Exhausted {
                family,
                total: self.accounts.len(),
                min_wait_ms: selector::min_wait_ms(&self.accounts, family, now),
            });
            return None;
        };
        self.cursor = self.cursor.wrapping_add(1);
        self.accounts[pos].last_used = now;
        Some(pos)
    }

    fn emit_selected(&self, pos: usize, family: ModelFamily, reason: SelectionReason) {
        self.sink.emit(&PoolEvent::Selected {
            index: pos,
            label: self.accounts[pos].label(),
            family,
            reason,
            total: self.accounts.len(),
        });
    }

    /// 标记账号在 `family` 上限流到 now + retry_after_ms；另一个模型族不受影响。
    pub fn mark_rate_limited(&mut self, id: AccountId, retry_after_ms: u64, family: ModelFamily) -> bool {
        let now = self.clock.now_ms();
        let Some(pos) = self.position(id) else {
            return false;
        };
        let delay = i64::try_from(retry_after_ms).unwrap_or(i64::MAX);
        self.accounts[pos]
            .rate_limit_reset_times
            .set(family, Some(now.saturating_add(delay)));
        true
    }

    /// 上报一次 429：记录事件、标记限流，并输出该模型族的等待快照。
    pub fn record_rate_limit(
        &mut self,
        id: AccountId,
        family: ModelFamily,
        notice: &RateLimitNotice,
    ) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        self.sink.emit(&PoolEvent::RateLimited {
            index: pos,
            label: self.accounts[pos].label(),
            family,
            notice: notice.clone(),
        });
        self.mark_rate_limited(id, notice.retry_after_ms, family);
        self.emit_wait_snapshot(family);
        true
    }

    /// 按句柄删除账号，重新编号，并把游标/当前账号修正到边界内。
    pub fn remove_account(&mut self, id: AccountId) -> bool {
        let Some(idx) = self.position(id) else {
            return false;
        };

        let removed = self.accounts.remove(idx);
        for (i, acc) in self.accounts.iter_mut().enumerate() {
            acc.index = i;
        }
        self.sink.emit(&PoolEvent::Removed {
            index: idx,
            label: removed.label(),
            remaining: self.accounts.len(),
        });

        let len = self.accounts.len();
        if len == 0 {
            self.cursor = 0;
            self.current_index = None;
            return true;
        }

        if self.cursor > idx {
            self.cursor -= 1;
        }
        self.cursor %= len;

        self.current_index = match self.current_index {
            Some(cur) if cur == idx => None,
            Some(cur) if cur > idx => Some(cur - 1),
            Some(cur) if cur >= len => None,
            other => other,
        };
        true
    }

    /// 有可用账号时为 0；否则为各账号剩余等待的最小值（都没有解除时间时为 0）。
    pub fn min_wait_time_for_family(&self, family: ModelFamily) -> u64 {
        selector::min_wait_ms(&self.accounts, family, self.clock.now_ms())
    }

    pub fn wait_snapshot(&self, family: ModelFamily) -> Vec<WaitEntry> {
        let now = self.clock.now_ms();
        self.accounts
            .iter()
            .map(|acc| WaitEntry {
                index: acc.index,
                label: acc.label(),
                wait_ms: selector::wait_for(acc, family, now),
            })
            .collect()
    }

    pub fn emit_wait_snapshot(&self, family: ModelFamily) {
        self.sink.emit(&PoolEvent::Snapshot {
            family,
            entries: self.wait_snapshot(family),
        });
    }

    /// 使用池上配置的去抖窗口（默认 30s）。
    pub fn should_show_account_toast(&self, index: usize) -> bool {
        self.should_show_account_toast_within(index, self.toast_debounce_ms)
    }

    /// 同一账号在 debounce 窗口内已经提示过时返回 false。
    pub fn should_show_account_toast_within(&self, index: usize, debounce_ms: i64) -> bool {
        let now = self.clock.now_ms();
        !(self.last_toast_index == Some(index) && now - self.last_toast_time < debounce_ms)
    }

    pub fn mark_toast_shown(&mut self, index: usize) {
        self.last_toast_index = Some(index);
        self.last_toast_time = self.clock.now_ms();
    }

    pub fn mark_switched(&mut self, id: AccountId, reason: SwitchReason) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        self.accounts[pos].last_switch_reason = Some(reason);
        self.current_index = Some(pos);
        true
    }

    /// 刷新后回写凭据：重新解析三元组，替换 access token 与过期时间。
    pub fn update_from_auth(&mut self, id: AccountId, auth: &AuthDetails) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        let acc = &mut self.accounts[pos];
        acc.parts = auth.parts();
        acc.access = auth.access.clone();
        acc.expires = auth.expires;
        true
    }

    pub fn to_auth_details(&self, id: AccountId) -> Option<AuthDetails> {
        let acc = self.account(id)?;
        Some(AuthDetails {
            refresh: acc.parts.format(),
            access: acc.access.clone(),
            expires: acc.expires,
        })
    }

    /// 新授权的账号：refresh token 相同则原地更新（保留位置与 added_at），否则追加到末尾。
    pub fn upsert_account(&mut self, parts: RefreshParts, email: Option<String>) -> AccountId {
        if let Some(existing) = self
            .accounts
            .iter_mut()
            .find(|a| a.parts.refresh_token == parts.refresh_token)
        {
            existing.parts = parts;
            if email.is_some() {
                existing.email = email;
            }
            return existing.id;
        }

        let mut acc = Account::new(self.accounts.len(), parts, self.clock.now_ms());
        acc.email = email;
        let id = acc.id;
        self.accounts.push(acc);
        id
    }

    pub fn to_storage(&self) -> AccountStorage {
        let records = self
            .accounts
            .iter()
            .map(|a| AccountRecord {
                email: a.email.clone(),
                refresh_token: a.parts.refresh_token.clone(),
                project_id: a.parts.project_id.clone(),
                managed_project_id: a.parts.managed_project_id.clone(),
                added_at: Some(a.added_at),
                last_used: Some(a.last_used),
                last_switch_reason: a.last_switch_reason,
                rate_limit_reset_times: (!a.rate_limit_reset_times.is_empty())
                    .then_some(a.rate_limit_reset_times),
            })
            .collect();
        AccountStorage::new(records, self.current_index.unwrap_or(0))
    }
}

fn account_from_record(index: usize, rec: AccountRecord, now: i64) -> Account {
    Account {
        id: AccountId::new(),
        index,
        email: rec.email,
        added_at: rec.added_at.map_or(now, |v| v.max(0)),
        last_used: rec.last_used.map_or(0, |v| v.max(0)),
        parts: RefreshParts {
            refresh_token: rec.refresh_token,
            project_id: rec.project_id,
            managed_project_id: rec.managed_project_id,
        },
        access: None,
        expires: None,
        rate_limit_reset_times: rec.rate_limit_reset_times.unwrap_or_default(),
        last_switch_reason: rec.last_switch_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account_pool::clock::ManualClock;
    use crate::account_pool::rate_limit::RateLimitDetails;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingSink(Mutex<Vec<PoolEvent>>);

    impl EventSink for RecordingSink {
        fn emit(&self, event: &PoolEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn storage(tokens: &[&str], active_index: usize) -> AccountStorage {
        let records = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| AccountRecord {
                refresh_token: t.to_string(),
                project_id: Some(format!("p{}", i + 1)),
                added_at: Some(1),
                last_used: Some(0),
                ..AccountRecord::default()
            })
            .collect();
        AccountStorage::new(records, active_index)
    }

    fn pool_at(
        now: i64,
        fallback: Option<&AuthDetails>,
        stored: Option<AccountStorage>,
    ) -> (AccountPool, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let pool = AccountPool::with_clock(fallback, stored, clock.clone());
        (pool, clock)
    }

    fn pick(pool: &mut AccountPool, family: ModelFamily) -> Option<(AccountId, String)> {
        pool.current_or_next_for_family(family)
            .map(|a| (a.id, a.parts.refresh_token.clone()))
    }

    fn ids(pool: &AccountPool) -> Vec<AccountId> {
        pool.accounts().iter().map(|a| a.id).collect()
    }

    #[test]
    fn empty_storage_wins_over_fallback() {
        let fallback = AuthDetails {
            refresh: "r1|p1".to_string(),
            access: Some("access".to_string()),
            expires: Some(123),
        };
        let (pool, _) = pool_at(0, Some(&fallback), Some(storage(&[], 0)));
        assert_eq!(pool.account_count(), 0);
        assert!(pool.current_account().is_none());
    }

    #[test]
    fn fallback_used_when_storage_missing() {
        let fallback = AuthDetails {
            refresh: "r1|p1|m1".to_string(),
            access: Some("access".to_string()),
            expires: Some(123),
        };
        let (pool, _) = pool_at(500, Some(&fallback), None);
        assert_eq!(pool.account_count(), 1);
        let acc = pool.current_account().unwrap();
        assert_eq!(acc.parts.managed_project_id.as_deref(), Some("m1"));
        assert_eq!(acc.access.as_deref(), Some("access"));
        assert_eq!(acc.added_at, 500);

        let (empty, _) = pool_at(0, Some(&AuthDetails::default()), None);
        assert_eq!(empty.account_count(), 0);
        let (none, _) = pool_at(0, None, None);
        assert_eq!(none.account_count(), 0);
    }

    #[test]
    fn stored_fields_are_clamped() {
        let mut stored = storage(&["r1", "r2"], 5);
        stored.accounts[0].added_at = None;
        stored.accounts[0].last_used = Some(-7);
        stored.accounts[1].added_at = Some(-3);
        let (pool, _) = pool_at(9_000, None, Some(stored));

        assert_eq!(pool.accounts()[0].added_at, 9_000);
        assert_eq!(pool.accounts()[0].last_used, 0);
        assert_eq!(pool.accounts()[1].added_at, 0);
        // activeIndex 5 对 2 取模
        assert_eq!(pool.current_account().unwrap().parts.refresh_token, "r2");
        assert_eq!(pool.cursor, 1);
    }

    #[test]
    fn returns_current_account_when_not_rate_limited() {
        let (mut pool, _) = pool_at(0, None, Some(storage(&["r1", "r2"], 0)));
        let acc = pool.current_or_next_for_family(ModelFamily::Claude).unwrap();
        assert_eq!(acc.index, 0);
    }

    #[test]
    fn sticks_until_rate_limited_then_switches() {
        let (mut pool, _) = pool_at(0, None, Some(storage(&["r1", "r2"], 0)));
        let (first, token) = pick(&mut pool, ModelFamily::Claude).unwrap();
        assert_eq!(token, "r1");
        for _ in 0..3 {
            assert_eq!(pick(&mut pool, ModelFamily::Claude).unwrap().1, "r1");
        }

        assert!(pool.mark_rate_limited(first, 60_000, ModelFamily::Claude));
        assert_eq!(pick(&mut pool, ModelFamily::Claude).unwrap().1, "r2");
        assert_eq!(pick(&mut pool, ModelFamily::Claude).unwrap().1, "r2");
        assert_eq!(
            pool.current_account().unwrap().last_switch_reason,
            Some(SwitchReason::RateLimit)
        );
        assert_eq!(pool.min_wait_time_for_family(ModelFamily::Gemini), 0);
    }

    #[test]
    fn returns_none_when_all_rate_limited() {
        let sink = Arc::new(RecordingSink::default());
        let (pool, _) = pool_at(0, None, Some(storage(&["r1", "r2"], 0)));
        let mut pool = pool.with_sink(sink.clone());
        for id in ids(&pool) {
            pool.mark_rate_limited(id, 60_000, ModelFamily::Claude);
        }
        assert!(pool.current_or_next_for_family(ModelFamily::Claude).is_none());
        assert!(matches!(
            sink.0.lock().unwrap().last(),
            Some(PoolEvent::Exhausted {
                min_wait_ms: 60_000,
                total: 2,
                ..
            })
        ));
    }

    #[test]
    fn rate_limit_expires_with_clock() {
        let (mut pool, clock) = pool_at(0, None, Some(storage(&["r1"], 0)));
        let (id, _) = pick(&mut pool, ModelFamily::Claude).unwrap();
        pool.mark_rate_limited(id, 1_000, ModelFamily::Claude);
        assert!(pick(&mut pool, ModelFamily::Claude).is_none());

        clock.advance(1_000);
        assert_eq!(pick(&mut pool, ModelFamily::Claude).unwrap().1, "r1");
        assert!(pool.accounts()[0].rate_limit_reset_times.is_empty());
    }

    #[test]
    fn min_wait_time_is_smallest_remaining() {
        let (mut pool, clock) = pool_at(0, None, Some(storage(&["r1", "r2"], 0)));
        let all = ids(&pool);
        pool.mark_rate_limited(all[0], 30_000, ModelFamily::Claude);
        pool.mark_rate_limited(all[1], 60_000, ModelFamily::Claude);
        assert_eq!(pool.min_wait_time_for_family(ModelFamily::Claude), 30_000);

        clock.advance(10_000);
        assert_eq!(pool.min_wait_time_for_family(ModelFamily::Claude), 20_000);
        clock.advance(20_000);
        assert_eq!(pool.min_wait_time_for_family(ModelFamily::Claude), 0);
    }

    #[test]
    fn families_are_tracked_independently() {
        let (mut pool, _) = pool_at(0, None, Some(storage(&["r1"], 0)));
        let (id, _) = pick(&mut pool, ModelFamily::Claude).unwrap();
        pool.mark_rate_limited(id, 60_000, ModelFamily::Claude);

        assert!(pool.min_wait_time_for_family(ModelFamily::Claude) > 0);
        assert_eq!(pool.min_wait_time_for_family(ModelFamily::Gemini), 0);
        assert_eq!(pool.next_for_family(ModelFamily::Gemini).unwrap().index, 0);
        assert!(pool.next_for_family(ModelFamily::Claude).is_none());
    }

    #[test]
    fn next_rotates_over_eligible_subset() {
        let (mut pool, _) = pool_at(0, None, Some(storage(&["r1", "r2", "r3"], 0)));
        let seq: Vec<String> = (0..4)
            .map(|_| pool.next_for_family(ModelFamily::Gemini).unwrap().parts.refresh_token.clone())
            .collect();
        assert_eq!(seq, ["r1", "r2", "r3", "r1"]);

        // cursor = 4；r2 限流后可用子集为 [r1, r3]，4 % 2 = 0
        let r2 = pool.accounts()[1].id;
        pool.mark_rate_limited(r2, 60_000, ModelFamily::Gemini);
        assert_eq!(pool.next_for_family(ModelFamily::Gemini).unwrap().parts.refresh_token, "r1");
        assert_eq!(pool.next_for_family(ModelFamily::Gemini).unwrap().parts.refresh_token, "r3");
    }

    #[test]
    fn remove_keeps_cursor_consistent() {
        let (mut pool, _) = pool_at(0, None, Some(storage(&["r1", "r2", "r3"], 1)));
        let (picked, token) = pick(&mut pool, ModelFamily::Claude).unwrap();
        assert_eq!(token, "r2");

        assert!(pool.remove_account(picked));
        assert_eq!(pool.account_count(), 2);
        assert!(pool.current_account().is_none());
        let indices: Vec<usize> = pool.accounts().iter().map(|a| a.index).collect();
        assert_eq!(indices, [0, 1]);

        assert_eq!(pool.next_for_family(ModelFamily::Claude).unwrap().parts.refresh_token, "r3");
        assert!(!pool.remove_account(picked));
    }

    #[test]
    fn remove_before_current_shifts_it() {
        let (mut pool, _) = pool_at(0, None, Some(storage(&["r1", "r2", "r3"], 2)));
        let first = pool.accounts()[0].id;
        pool.remove_account(first);
        assert_eq!(pool.current_account().unwrap().parts.refresh_token, "r3");
        assert_eq!(pool.current_index, Some(1));
        assert_eq!(pool.cursor, 1);

        for id in ids(&pool) {
            pool.remove_account(id);
        }
        assert_eq!(pool.account_count(), 0);
        assert_eq!(pool.cursor, 0);
        assert!(pool.current_account().is_none());
        assert!(pick(&mut pool, ModelFamily::Claude).is_none());
    }

    #[test]
    fn fallback_access_attached_only_to_matching_account() {
        let fallback = AuthDetails {
            refresh: "r2|p2".to_string(),
            access: Some("access-2".to_string()),
            expires: Some(123),
        };
        let (pool, _) = pool_at(0, Some(&fallback), Some(storage(&["r1", "r2"], 0)));
        let snapshot = pool.snapshot();
        assert_eq!(snapshot[0].access, None);
        assert_eq!(snapshot[0].expires, None);
        assert_eq!(snapshot[1].access.as_deref(), Some("access-2"));
        assert_eq!(snapshot[1].expires, Some(123));
    }

    #[test]
    fn toast_is_debounced_per_account() {
        let (mut pool, clock) = pool_at(0, None, Some(storage(&["r1"], 0)));
        assert!(pool.should_show_account_toast(0));
        pool.mark_toast_shown(0);
        assert!(!pool.should_show_account_toast(0));
        assert!(pool.should_show_account_toast(1));
        assert!(pool.should_show_account_toast_within(0, 0));

        clock.set(31_000);
        assert!(pool.should_show_account_toast(0));
        assert!(!pool.should_show_account_toast_within(0, 60_000));
    }

    #[test]
    fn toast_debounce_comes_from_pool_setting() {
        let (pool, clock) = pool_at(0, None, Some(storage(&["r1"], 0)));
        let mut pool = pool.with_toast_debounce(5_000);
        pool.mark_toast_shown(0);
        clock.set(4_999);
        assert!(!pool.should_show_account_toast(0));
        clock.set(5_000);
        assert!(pool.should_show_account_toast(0));

        let pool = pool.with_toast_debounce(-1);
        assert!(pool.should_show_account_toast(0));
    }

    #[test]
    fn select_for_request_uses_family_from_model_or_url() {
        let (mut pool, _) = pool_at(0, None, Some(storage(&["r1", "r2"], 0)));
        let first = ids(&pool)[0];
        assert!(pool.mark_rate_limited(first, 60_000, ModelFamily::Claude));

        let url = "https://x/v1beta/models/claude-sonnet-4-5:streamGenerateContent?alt=sse";
        let picked = pool.select_for_request(url, None).map(|a| a.parts.refresh_token.clone());
        assert_eq!(picked.as_deref(), Some("r2"));

        // 请求体里的 gemini 模型优先于 URL，账号 r2 在 gemini 上可用，保持粘性
        let picked = pool
            .select_for_request(url, Some("gemini-3-pro"))
            .map(|a| a.parts.refresh_token.clone());
        assert_eq!(picked.as_deref(), Some("r2"));
    }

    #[test]
    fn auth_round_trip_and_upsert() {
        let (mut pool, _) = pool_at(0, None, Some(storage(&["r1"], 0)));
        let id = pool.accounts()[0].id;
        let auth = AuthDetails {
            refresh: "r1||m1".to_string(),
            access: Some("tok".to_string()),
            expires: Some(99),
        };
        assert!(pool.update_from_auth(id, &auth));
        assert_eq!(pool.to_auth_details(id), Some(auth));

        let same = pool.upsert_account(RefreshParts::new("r1"), Some("a@example.com".to_string()));
        assert_eq!(same, id);
        assert_eq!(pool.account_count(), 1);
        assert_eq!(pool.accounts()[0].label(), "a@example.com");

        let added = pool.upsert_account(RefreshParts::new("r9"), None);
        assert_eq!(pool.account(added).unwrap().index, 1);
        assert!(pool.mark_switched(added, SwitchReason::Rotation));
        assert_eq!(pool.current_account().unwrap().id, added);
    }

    #[test]
    fn to_storage_persists_only_non_empty_rate_limits() {
        let (mut pool, _) = pool_at(0, None, Some(storage(&["r1", "r2"], 1)));
        let r1 = pool.accounts()[0].id;
        pool.mark_rate_limited(r1, 5_000, ModelFamily::Gemini);

        let s = pool.to_storage();
        assert_eq!(s.active_index, 1);
        assert_eq!(s.accounts[0].rate_limit_reset_times.unwrap().gemini, Some(5_000));
        assert_eq!(s.accounts[1].rate_limit_reset_times, None);
        assert_eq!(s.accounts[1].project_id.as_deref(), Some("p2"));
    }

    #[test]
    fn record_rate_limit_emits_event_and_snapshot() {
        let sink = Arc::new(RecordingSink::default());
        let (pool, _) = pool_at(0, None, Some(storage(&["r1", "r2"], 0)));
        let mut pool = pool.with_sink(sink.clone());
        let r1 = pool.accounts()[0].id;
        let notice = RateLimitNotice {
            status: 429,
            retry_after_ms: 2_000,
            details: RateLimitDetails::default(),
        };

        assert!(pool.record_rate_limit(r1, ModelFamily::Claude, &notice));
        let events = sink.0.lock().unwrap();
        assert!(matches!(events[0], PoolEvent::RateLimited { index: 0, .. }));
        match &events[1] {
            PoolEvent::Snapshot { family, entries } => {
                assert_eq!(*family, ModelFamily::Claude);
                assert_eq!(entries[0].wait_ms, Some(2_000));
                assert_eq!(entries[1].wait_ms, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn save_and_reload_through_store() {
        let dir = std::env::temp_dir().join(format!("ant2pool-pool-{}", uuid::Uuid::new_v4()));
        let store = AccountStore::new(dir.join("accounts.json"));
        let (pool, _) = pool_at(0, None, Some(storage(&["r1", "r2"], 1)));
        pool.save_to_store(&store).await.unwrap();

        let reloaded = AccountPool::load_from_store(&store, None).await;
        assert_eq!(reloaded.account_count(), 2);
        assert_eq!(reloaded.current_account().unwrap().parts.refresh_token, "r2");
        store.clear().await.unwrap();
    }
}
