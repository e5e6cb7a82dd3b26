//! 两种上游方言（Anthropic 内容块 / Gemini candidates+parts）之间的规范化。
//!
//! - 请求侧：thinking 配置决议、未签名 thinking 块清理
//! - 响应侧：推理内容统一、流式用量提取、预览权限 404 改写

pub mod errors;
pub mod response;
pub mod sanitize;
pub mod thinking;
pub mod usage;

pub use errors::rewrite_preview_access_error;
pub use response::{ResponseBody, transform_thinking_parts};
pub use sanitize::{MIN_SIGNATURE_LENGTH, filter_unsigned_thinking_blocks};
pub use thinking::{
    NormalizedThinking, ThinkingConfig, extract_thinking_config, has_assistant_history,
    normalize_thinking_config, prepare_request, resolve_thinking_config,
};
pub use usage::{
    SseUsageTracker, UsageMetadata, extract_usage_from_sse_payload, extract_usage_metadata,
    track_stream_usage,
};
