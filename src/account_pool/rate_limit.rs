//! 429 响应解析：从错误体里取出等待时长与诊断信息，供 `AccountPool::record_rate_limit` 使用。

use serde::Deserialize;
use serde_json::Value;

/// 响应里既没有 Retry-After 也没有 RetryInfo 时的冷却时长。
pub const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitDetails {
    pub message: Option<String>,
    pub reason: Option<String>,
    pub quota_reset_time: Option<String>,
    pub retry_delay_ms: Option<u64>,
}

/// 一次限流上报：HTTP 状态 + 最终采用的等待时长 + 诊断信息。
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitNotice {
    pub status: u16,
    pub retry_after_ms: u64,
    pub details: RateLimitDetails,
}

impl RateLimitNotice {
    /// 由响应头与响应体组合出一次上报。
    pub fn from_response(status: u16, retry_after_header: Option<&str>, body: &Value) -> Self {
        let details = parse_rate_limit_body(body);
        let retry_after_ms = retry_after_ms(retry_after_header, &details, DEFAULT_RETRY_AFTER_MS);
        Self {
            status,
            retry_after_ms,
            details,
        }
    }
}

pub fn parse_rate_limit_body(body: &Value) -> RateLimitDetails {
    #[derive(Debug, Deserialize)]
    struct ErrResp {
        error: ErrInner,
    }

    #[derive(Debug, Deserialize)]
    struct ErrInner {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        details: Vec<ErrDetail>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ErrDetail {
        #[serde(rename = "@type", default)]
        ty: String,
        #[serde(default)]
        retry_delay: Option<String>,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        metadata: Value,
    }

    let mut out = RateLimitDetails::default();
    let Ok(resp) = ErrResp::deserialize(body) else {
        return out;
    };

    out.message = resp.error.message.filter(|m| !m.trim().is_empty());
    for d in resp.error.details {
        if out.reason.is_none() {
            out.reason = d.reason.filter(|r| !r.is_empty());
        }
        if d.ty.contains("RetryInfo")
            && let Some(ms) = d.retry_delay.as_deref().and_then(parse_retry_delay_ms)
        {
            out.retry_delay_ms = Some(ms);
        }
        if let Some(ts) = d.metadata.get("quotaResetTimeStamp").and_then(|v| v.as_str()) {
            out.quota_reset_time = Some(ts.to_string());
        }
        if out.retry_delay_ms.is_none()
            && let Some(ms) = d
                .metadata
                .get("quotaResetDelay")
                .and_then(|v| v.as_str())
                .and_then(parse_retry_delay_ms)
        {
            out.retry_delay_ms = Some(ms);
        }
    }
    out
}

/// 选择等待时长：Retry-After 头（秒）> 响应体 RetryInfo > 默认值。
pub fn retry_after_ms(header: Option<&str>, details: &RateLimitDetails, default_ms: u64) -> u64 {
    if let Some(secs) = header
        .map(str::trim)
        .and_then(|h| h.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
    {
        return (secs * 1000.0).ceil() as u64;
    }
    details.retry_delay_ms.unwrap_or(default_ms)
}

/// 兼容形如 "2s" / "2.5s" / "0.123s" / "500ms"。
fn parse_retry_delay_ms(s: &str) -> Option<u64> {
    let s = s.trim();
    let (num, scale) = match s.strip_suffix("ms") {
        Some(rest) => (rest, 1.0),
        None => (s.strip_suffix('s')?, 1000.0),
    };
    let n: f64 = num.trim().parse().ok()?;
    if !(n.is_finite() && n >= 0.0) {
        return None;
    }
    Some((n * scale).ceil() as u64)
}
