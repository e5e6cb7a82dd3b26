//! 请求侧的 thinking 配置：提取、规范化与策略决议。

use crate::dialect::sanitize::filter_unsigned_thinking_blocks;
use crate::util::json::finite_f64;
use crate::util::model::{DEFAULT_THINKING_BUDGET, is_claude, is_thinking_capable};
use serde::Serialize;
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub include_thoughts: bool,
    pub thinking_budget: i64,
}

impl ThinkingConfig {
    /// 预算不为正时不会开启 include_thoughts。
    pub fn new(include_thoughts: bool, thinking_budget: i64) -> Self {
        Self {
            include_thoughts: include_thoughts && thinking_budget > 0,
            thinking_budget,
        }
    }

    pub fn enabled_default() -> Self {
        Self::new(true, DEFAULT_THINKING_BUDGET)
    }
}

/// 规范化后的配置：两个字段各自可缺失，但不会同时缺失。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedThinking {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_thoughts: Option<bool>,
}

fn field<'a>(obj: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    obj.get(camel)
        .filter(|v| !v.is_null())
        .or_else(|| obj.get(snake))
        .filter(|v| !v.is_null())
}

fn budget_of(obj: &Map<String, Value>, camel: &str, snake: &str) -> Option<i64> {
    finite_f64(field(obj, camel, snake)).map(|f| f.trunc() as i64)
}

/// 接受 camelCase / snake_case 两种写法。
///
/// - 预算缺失或非有限数：视为没有预算，请求的 include_thoughts 强制为 false
/// - 预算为 0：显式关闭，请求的 include_thoughts 强制为 false
/// - 未出现的字段保持缺失
/// - 两个字段都缺失：返回 None
pub fn normalize_thinking_config(raw: &Value) -> Option<NormalizedThinking> {
    let obj = raw.as_object()?;
    let budget = budget_of(obj, "thinkingBudget", "thinking_budget");
    let include = field(obj, "includeThoughts", "include_thoughts").and_then(Value::as_bool);

    if budget.is_none() && include.is_none() {
        return None;
    }

    // 请求了 includeThoughts 但没有正预算时强制关闭；未请求时保持缺失。
    let enabled = budget.is_some_and(|b| b > 0);
    Some(NormalizedThinking {
        thinking_budget: budget,
        include_thoughts: include.map(|want| want && enabled),
    })
}

/// 按优先级取用户的 thinking 配置：
/// generationConfig.thinkingConfig > extra_body.thinkingConfig > payload.thinkingConfig
/// > Anthropic 风格的 `thinking: {type: "enabled", budgetTokens}`。
pub fn extract_thinking_config(
    payload: &Value,
    generation_config: Option<&Value>,
    extra_body: Option<&Value>,
) -> Option<ThinkingConfig> {
    let explicit = [generation_config, extra_body, Some(payload)]
        .into_iter()
        .flatten()
        .filter_map(|v| v.get("thinkingConfig"))
        .find(|v| !v.is_null());

    if let Some(cfg) = explicit.and_then(Value::as_object) {
        let include = field(cfg, "includeThoughts", "include_thoughts")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let budget =
            budget_of(cfg, "thinkingBudget", "thinking_budget").unwrap_or(DEFAULT_THINKING_BUDGET);
        return Some(ThinkingConfig::new(include, budget));
    }

    let thinking = payload.get("thinking")?.as_object()?;
    if thinking.get("type").and_then(Value::as_str) != Some("enabled") {
        return None;
    }
    let budget = budget_of(thinking, "budgetTokens", "budget_tokens").unwrap_or(DEFAULT_THINKING_BUDGET);
    Some(ThinkingConfig::new(true, budget))
}

/// 决议最终配置。
///
/// Claude 模型在已有 assistant 轮次的会话里总是开启 thinking，调用方显式传入 false 也一样。
pub fn resolve_thinking_config(
    user_config: Option<ThinkingConfig>,
    is_thinking_capable: bool,
    is_claude_family: bool,
    has_prior_assistant_turn: bool,
) -> Option<ThinkingConfig> {
    match user_config {
        Some(cfg) if is_claude_family && has_prior_assistant_turn => {
            let budget = if cfg.thinking_budget > 0 {
                cfg.thinking_budget
            } else {
                DEFAULT_THINKING_BUDGET
            };
            Some(ThinkingConfig::new(true, budget))
        }
        Some(cfg) => Some(cfg),
        None if is_thinking_capable => Some(ThinkingConfig::enabled_default()),
        None => None,
    }
}

/// 会话中是否已有模型回复（Gemini `model` / Anthropic `assistant`）。
pub fn has_assistant_history(turns: Option<&Value>) -> bool {
    turns.and_then(Value::as_array).is_some_and(|turns| {
        turns.iter().any(|t| {
            matches!(
                t.get("role").and_then(Value::as_str),
                Some("model" | "assistant")
            )
        })
    })
}

/// 发送前整理请求体（原地修改）：
/// 决议 thinking 配置并写入 `generationConfig.thinkingConfig`（无配置时删除），
/// 清理其它位置的 thinking 字段，并移除未签名的 thinking 块。
pub fn prepare_request(payload: &mut Value, model: &str) -> Option<NormalizedThinking> {
    let obj = payload.as_object()?;
    let user_config = extract_thinking_config(
        payload,
        obj.get("generationConfig"),
        obj.get("extra_body"),
    );
    let history = has_assistant_history(obj.get("contents"))
        || has_assistant_history(obj.get("messages"));
    let resolved = resolve_thinking_config(
        user_config,
        is_thinking_capable(model),
        is_claude(model),
        history,
    );
    let normalized = resolved.and_then(|cfg| normalize_thinking_config(&json!(cfg)));

    let obj = payload.as_object_mut()?;
    obj.remove("thinkingConfig");
    obj.remove("thinking");
    let extra_emptied = match obj.get_mut("extra_body") {
        Some(Value::Object(extra)) => {
            extra.remove("thinkingConfig");
            extra.is_empty()
        }
        _ => false,
    };
    if extra_emptied {
        obj.remove("extra_body");
    }

    match normalized {
        Some(cfg) => {
            let gen_cfg = obj
                .entry("generationConfig")
                .or_insert_with(|| Value::Object(Map::new()));
            if !gen_cfg.is_object() {
                *gen_cfg = Value::Object(Map::new());
            }
            if let Some(gen_cfg) = gen_cfg.as_object_mut() {
                gen_cfg.insert("thinkingConfig".to_string(), json!(cfg));
            }
        }
        None => {
            if let Some(Value::Object(gen_cfg)) = obj.get_mut("generationConfig") {
                gen_cfg.remove("thinkingConfig");
            }
        }
    }

    for key in ["contents", "messages"] {
        if let Some(Value::Array(turns)) = obj.get_mut(key) {
            let dropped = filter_unsigned_thinking_blocks(turns);
            if dropped > 0 {
                tracing::debug!("已移除 {dropped} 个未签名的 thinking 块（{key}）");
            }
        }
    }

    normalized
}
