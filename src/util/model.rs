/// 未指定预算时开启 thinking 使用的默认 token 预算。
pub const DEFAULT_THINKING_BUDGET: i64 = 16_000;

pub fn canonical_model_id(model: &str) -> String {
    let m = model.trim();
    let m = m.strip_prefix("models/").unwrap_or(m);
    m.trim().to_string()
}

fn canonical_lower(model: &str) -> String {
    canonical_model_id(model).to_lowercase()
}

/// 模型名（不区分大小写）包含 "thinking" / "opus" / "gemini-3" 即视为支持 thinking。
pub fn is_thinking_capable(model: &str) -> bool {
    let m = canonical_lower(model);
    m.contains("thinking") || m.contains("opus") || m.contains("gemini-3")
}

pub fn is_claude(model: &str) -> bool {
    canonical_lower(model).contains("claude")
}

/// 预览权限（preview access）相关的模型：Claude 系列与 Opus。
pub fn requires_preview_access(model: &str) -> bool {
    let m = canonical_lower(model);
    m.contains("claude") || m.contains("opus")
}

/// 从 Gemini 风格 URL（`.../models/<model>:generateContent`）中取出模型名。
pub fn model_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/models/")?;
    let end = rest.find([':', '?', '/']).unwrap_or(rest.len());
    let model = rest[..end].trim();
    if model.is_empty() {
        None
    } else {
        Some(model.to_string())
    }
}

/// 请求的目标模型：请求体里的模型名优先，其次取 URL 中 `models/<id>` 段。
pub fn request_model(url: &str, body_model: Option<&str>) -> Option<String> {
    body_model
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .or_else(|| model_from_url(url))
}
