//! 账号池的可观测事件。宿主可以实现 `EventSink` 自行消费，或使用 `TracingSink` 输出到日志。

use crate::account_pool::rate_limit::RateLimitNotice;
use crate::account_pool::types::ModelFamily;
use crate::logging::{self, LogLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// 沿用当前账号。
    Sticky,
    /// 此前没有当前账号。
    Initial,
    /// 当前账号在该模型族上被限流，切换到下一个。
    RateLimit,
    /// 直接轮询。
    Rotation,
}

impl SelectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sticky => "sticky",
            Self::Initial => "initial",
            Self::RateLimit => "rate-limit",
            Self::Rotation => "rotation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitEntry {
    pub index: usize,
    pub label: String,
    /// None 表示可用。
    pub wait_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    Selected {
        index: usize,
        label: String,
        family: ModelFamily,
        reason: SelectionReason,
        total: usize,
    },
    Exhausted {
        family: ModelFamily,
        total: usize,
        min_wait_ms: u64,
    },
    RateLimited {
        index: usize,
        label: String,
        family: ModelFamily,
        notice: RateLimitNotice,
    },
    Snapshot {
        family: ModelFamily,
        entries: Vec<WaitEntry>,
    },
    Removed {
        index: usize,
        label: String,
        remaining: usize,
    },
}

pub trait EventSink: Send + Sync + std::fmt::Debug {
    fn emit(&self, event: &PoolEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &PoolEvent) {}
}

/// 把事件渲染为 tracing 日志；DEBUG=off 时静默。
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    level: LogLevel,
}

impl TracingSink {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }
}

impl EventSink for TracingSink {
    fn emit(&self, event: &PoolEvent) {
        if !self.level.enabled() {
            return;
        }
        match event {
            PoolEvent::Selected {
                index,
                label,
                family,
                reason,
                total,
            } => {
                let title = format!("selected ({})", reason.as_str());
                logging::account_context(&title, Some(label), Some(*index), *total, *family);
            }
            PoolEvent::Exhausted {
                family,
                total,
                min_wait_ms,
            } => {
                logging::account_context("exhausted", None, None, *total, *family);
                tracing::warn!(family = %family, "账号池已耗尽，最短等待 {min_wait_ms}ms");
            }
            PoolEvent::RateLimited {
                label,
                family,
                notice,
                ..
            } => logging::rate_limit_event(
                self.level,
                label,
                *family,
                notice.status,
                notice.retry_after_ms,
                notice.details.message.as_deref(),
                notice.details.quota_reset_time.as_deref(),
                notice.details.reason.as_deref(),
            ),
            PoolEvent::Snapshot { family, entries } => {
                logging::rate_limit_snapshot(*family, entries);
            }
            PoolEvent::Removed {
                index,
                label,
                remaining,
            } => {
                tracing::info!("[Account] removed: {label} (index {index}), remaining {remaining}");
            }
        }
    }
}
