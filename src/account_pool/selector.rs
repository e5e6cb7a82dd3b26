//! 选择算法：在“当前可用”子集上轮询。
//!
//! 轮询的下标空间是可用子集而不是整个池，账号进出限流状态时轮询顺序会随之变化。

use crate::account_pool::types::{Account, ModelFamily};

/// 惰性清理所有账号已到期的解除时间，返回在 `family` 上可用的账号位置（保持池内顺序）。
pub fn eligible_positions(accounts: &mut [Account], family: ModelFamily, now_ms: i64) -> Vec<usize> {
    accounts
        .iter_mut()
        .enumerate()
        .filter_map(|(pos, acc)| {
            acc.rate_limit_reset_times.clear_expired(now_ms);
            (!acc.rate_limit_reset_times.is_limited(family, now_ms)).then_some(pos)
        })
        .collect()
}

/// `cursor mod len(eligible)`；子集为空时返回 None。
pub fn round_robin(eligible: &[usize], cursor: usize) -> Option<usize> {
    if eligible.is_empty() {
        return None;
    }
    Some(eligible[cursor % eligible.len()])
}

/// 该模型族上最短剩余等待时间；有可用账号时为 0。
pub fn min_wait_ms(accounts: &[Account], family: ModelFamily, now_ms: i64) -> u64 {
    let any_available = accounts
        .iter()
        .any(|acc| !acc.rate_limit_reset_times.is_limited(family, now_ms));
    if any_available {
        return 0;
    }
    accounts
        .iter()
        .filter_map(|acc| acc.rate_limit_reset_times.get(family))
        .map(|reset_at| (reset_at - now_ms).max(0) as u64)
        .min()
        .unwrap_or(0)
}

/// 单个账号在该模型族上的剩余等待；可用时为 None。
pub fn wait_for(account: &Account, family: ModelFamily, now_ms: i64) -> Option<u64> {
    account
        .rate_limit_reset_times
        .get(family)
        .filter(|reset_at| now_ms < *reset_at)
        .map(|reset_at| (reset_at - now_ms) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::types::RefreshParts;

    fn pool(n: usize) -> Vec<Account> {
        (0..n)
            .map(|i| Account::new(i, RefreshParts::new(format!("r{}", i + 1)), 0))
            .collect()
    }

    #[test]
    fn round_robin_wraps_over_subset() {
        assert_eq!(round_robin(&[], 3), None);
        assert_eq!(round_robin(&[0, 2], 0), Some(0));
        assert_eq!(round_robin(&[0, 2], 1), Some(2));
        assert_eq!(round_robin(&[0, 2], 2), Some(0));
    }

    #[test]
    fn eligible_positions_skip_limited_and_clear_expired() {
        let mut accounts = pool(3);
        accounts[0]
            .rate_limit_reset_times
            .set(ModelFamily::Claude, Some(1_000));
        accounts[1]
            .rate_limit_reset_times
            .set(ModelFamily::Claude, Some(500));

        assert_eq!(eligible_positions(&mut accounts, ModelFamily::Claude, 600), vec![1, 2]);
        assert_eq!(accounts[1].rate_limit_reset_times.claude, None);
        assert_eq!(
            eligible_positions(&mut accounts, ModelFamily::Gemini, 600),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn min_wait_uses_smallest_remaining() {
        let mut accounts = pool(2);
        assert_eq!(min_wait_ms(&accounts, ModelFamily::Claude, 0), 0);

        accounts[0]
            .rate_limit_reset_times
            .set(ModelFamily::Claude, Some(60_000));
        accounts[1]
            .rate_limit_reset_times
            .set(ModelFamily::Claude, Some(30_000));
        assert_eq!(min_wait_ms(&accounts, ModelFamily::Claude, 0), 30_000);
        assert_eq!(min_wait_ms(&accounts, ModelFamily::Gemini, 0), 0);
        assert_eq!(wait_for(&accounts[0], ModelFamily::Claude, 10_000), Some(50_000));
        assert_eq!(wait_for(&accounts[0], ModelFamily::Gemini, 10_000), None);
    }
}
