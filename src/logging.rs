use crate::account_pool::events::WaitEntry;
use crate::account_pool::types::ModelFamily;
use std::borrow::Cow;

const MAX_BODY_PREVIEW_CHARS: usize = 12_000;
const MAX_BODY_VERBOSE_CHARS: usize = 50_000;

/// 日志等级（对齐 DEBUG 开关）：
/// - off：不输出账号/限流诊断
/// - basic：输出账号选择、限流事件与快照
/// - verbose：在 basic 基础上输出更长的响应体预览
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Basic = 1,
    Verbose = 2,
}

impl LogLevel {
    pub fn parse(debug: &str) -> Self {
        match debug.trim().to_lowercase().as_str() {
            "1" | "true" | "low" | "basic" => Self::Basic,
            "2" | "verbose" | "high" => Self::Verbose,
            _ => Self::Off,
        }
    }

    pub fn enabled(self) -> bool {
        self >= Self::Basic
    }

    pub fn verbose(self) -> bool {
        self >= Self::Verbose
    }

    fn preview_limit(self) -> usize {
        if self.verbose() {
            MAX_BODY_VERBOSE_CHARS
        } else {
            MAX_BODY_PREVIEW_CHARS
        }
    }
}

pub fn account_context(
    label: &str,
    account: Option<&str>,
    index: Option<usize>,
    total: usize,
    family: ModelFamily,
) {
    let account_label = match (account, index) {
        (Some(a), _) if !a.is_empty() => a.to_string(),
        (_, Some(i)) => format!("Account {}", i + 1),
        _ => "All accounts".to_string(),
    };
    let index_label = match index {
        Some(i) => format!("{}/{total}", i + 1),
        None => format!("-/{total}"),
    };
    tracing::info!(
        family = %family,
        "[Account] {label}: {account_label} ({index_label})"
    );
}

#[allow(clippy::too_many_arguments)]
pub fn rate_limit_event(
    level: LogLevel,
    account_label: &str,
    family: ModelFamily,
    status: u16,
    retry_after_ms: u64,
    message: Option<&str>,
    quota_reset_time: Option<&str>,
    reason: Option<&str>,
) {
    tracing::warn!(
        family = %family,
        status,
        retry_after_ms,
        "[RateLimit] {status} on {account_label}"
    );
    if let Some(m) = message {
        tracing::info!("[RateLimit] message: {}", truncate_for_log(m, level));
    }
    if let Some(t) = quota_reset_time {
        tracing::info!("[RateLimit] quotaResetTime: {t}");
    }
    if let Some(r) = reason {
        tracing::info!("[RateLimit] reason: {r}");
    }
}

pub fn rate_limit_snapshot(family: ModelFamily, entries: &[WaitEntry]) {
    let rendered: Vec<String> = entries
        .iter()
        .map(|e| match e.wait_ms {
            None => format!("{}=ready", e.label),
            Some(ms) => format!("{}=wait {}s", e.label, ms.div_ceil(1000)),
        })
        .collect();
    tracing::info!("[RateLimit] snapshot family={family} {}", rendered.join(" | "));
}

pub fn model_family(url: &str, model: Option<&str>, family: ModelFamily) {
    tracing::debug!(
        "[ModelFamily] url={url} model={} family={family}",
        model.unwrap_or("unknown")
    );
}

/// 按日志等级截断长文本（basic 12k / verbose 50k 字符）。
pub fn truncate_for_log(s: &str, level: LogLevel) -> Cow<'_, str> {
    truncate_chars(s, level.preview_limit())
}

fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    let total = s.chars().count();
    if total <= max_chars {
        return Cow::Borrowed(s);
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str(&format!("... (truncated {} chars)", total - max_chars));
    Cow::Owned(out)
}
