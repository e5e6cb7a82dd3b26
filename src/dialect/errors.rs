use crate::util::model::requires_preview_access;
use serde_json::{Map, Value};

pub const DEFAULT_PREVIEW_MESSAGE: &str =
    "Antigravity preview features are not enabled for this model";
const PREVIEW_ACCESS_HINT: &str = "This usually means the account does not have preview access \
     to the requested model yet. Request Antigravity preview access for the account, \
     or switch to a model that is generally available.";

/// 把“看起来像 404 Not Found、实际是没有预览权限”的错误改写成可读的提示。
///
/// 仅对 404 生效；请求的模型属于 Claude/Opus，或原消息里已经提到 antigravity 时才改写。
/// 返回新的错误体，输入不变；不需要改写时返回 None。
pub fn rewrite_preview_access_error(
    body: &Value,
    status: u16,
    requested_model: Option<&str>,
) -> Option<Value> {
    if status != 404 {
        return None;
    }

    let message = body
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");

    let model_gated = requested_model.is_some_and(requires_preview_access);
    let mentions_antigravity = message.to_lowercase().contains("antigravity");
    if !model_gated && !mentions_antigravity {
        return None;
    }

    let base = if message.is_empty() {
        DEFAULT_PREVIEW_MESSAGE
    } else {
        message
    };
    let rewritten = format!("{}. {PREVIEW_ACCESS_HINT}", base.trim_end_matches('.'));

    let mut out = match body {
        Value::Object(obj) => obj.clone(),
        _ => Map::new(),
    };
    let mut error = match out.get("error") {
        Some(Value::Object(e)) => e.clone(),
        _ => Map::new(),
    };
    error.insert("message".to_string(), Value::String(rewritten));
    out.insert("error".to_string(), Value::Object(error));

    tracing::debug!(
        model = requested_model.unwrap_or("unknown"),
        "404 改写为预览权限提示"
    );
    Some(Value::Object(out))
}
