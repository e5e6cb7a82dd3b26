//! 响应侧的 thinking 规范化：把两种方言里的推理内容统一标记为 `reasoning`，
//! 并汇总到 `reasoning_content` 字段。

use serde_json::{Map, Value};

/// 多段推理文本的连接符。
pub const REASONING_SEPARATOR: &str = "\n\n";

/// 响应体的方言，在入口处判定一次。
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// `{content: [...]}`
    Anthropic(Map<String, Value>),
    /// `{candidates: [...]}`
    Gemini(Map<String, Value>),
    /// `{response: {candidates: [...]}}`
    Enveloped(Map<String, Value>),
    /// 其它形态原样透传。
    Passthrough(Value),
}

impl From<Value> for ResponseBody {
    fn from(value: Value) -> Self {
        let Value::Object(obj) = value else {
            return Self::Passthrough(value);
        };
        if obj.get("content").is_some_and(Value::is_array) {
            Self::Anthropic(obj)
        } else if obj.get("candidates").is_some_and(Value::is_array) {
            Self::Gemini(obj)
        } else if obj
            .get("response")
            .and_then(|r| r.get("candidates"))
            .is_some_and(Value::is_array)
        {
            Self::Enveloped(obj)
        } else {
            Self::Passthrough(Value::Object(obj))
        }
    }
}

impl ResponseBody {
    pub fn canonicalize(self) -> Value {
        match self {
            Self::Anthropic(mut obj) => {
                let reasoning = match obj.get_mut("content") {
                    Some(Value::Array(blocks)) => retag_anthropic_blocks(blocks),
                    _ => None,
                };
                if let Some(reasoning) = reasoning {
                    obj.insert("reasoning_content".to_string(), Value::String(reasoning));
                }
                Value::Object(obj)
            }
            Self::Gemini(mut obj) => {
                retag_gemini_candidates(&mut obj);
                Value::Object(obj)
            }
            Self::Enveloped(mut obj) => {
                if let Some(Value::Object(inner)) = obj.get_mut("response") {
                    retag_gemini_candidates(inner);
                }
                Value::Object(obj)
            }
            Self::Passthrough(v) => v,
        }
    }
}

/// 入口：按方言规范化 thinking 内容，非对象原样返回。
pub fn transform_thinking_parts(body: Value) -> Value {
    ResponseBody::from(body).canonicalize()
}

fn join_reasoning(texts: Vec<String>) -> Option<String> {
    if texts.is_empty() {
        None
    } else {
        Some(texts.join(REASONING_SEPARATOR))
    }
}

fn retag_anthropic_blocks(blocks: &mut [Value]) -> Option<String> {
    let mut texts = Vec::new();
    for block in blocks.iter_mut() {
        let Value::Object(b) = block else {
            continue;
        };
        if b.get("type").and_then(Value::as_str) != Some("thinking") {
            continue;
        }
        if let Some(text) = b
            .get("thinking")
            .or_else(|| b.get("text"))
            .and_then(Value::as_str)
        {
            texts.push(text.to_string());
        }
        b.insert("type".to_string(), Value::String("reasoning".to_string()));
        b.insert("thought".to_string(), Value::Bool(true));
    }
    join_reasoning(texts)
}

fn retag_gemini_candidates(obj: &mut Map<String, Value>) {
    let Some(Value::Array(candidates)) = obj.get_mut("candidates") else {
        return;
    };
    for candidate in candidates.iter_mut() {
        let Value::Object(c) = candidate else {
            continue;
        };
        let reasoning = match c.get_mut("content").and_then(|content| content.get_mut("parts")) {
            Some(Value::Array(parts)) => retag_gemini_parts(parts),
            _ => None,
        };
        if let Some(reasoning) = reasoning {
            c.insert("reasoning_content".to_string(), Value::String(reasoning));
        }
    }
}

fn retag_gemini_parts(parts: &mut [Value]) -> Option<String> {
    let mut texts = Vec::new();
    for part in parts.iter_mut() {
        let Value::Object(p) = part else {
            continue;
        };
        if p.get("thought").and_then(Value::as_bool) != Some(true) {
            continue;
        }
        if let Some(text) = p.get("text").and_then(Value::as_str) {
            texts.push(text.to_string());
        }
        p.insert("type".to_string(), Value::String("reasoning".to_string()));
    }
    join_reasoning(texts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn anthropic_thinking_becomes_reasoning() {
        let out = transform_thinking_parts(json!({
            "id": "resp-123",
            "content": [
                {"type": "thinking", "thinking": "my thoughts", "signature": "s"},
                {"type": "text", "text": "visible"}
            ]
        }));
        assert_eq!(out["content"][0]["type"], "reasoning");
        assert_eq!(out["content"][0]["thought"], true);
        assert_eq!(out["content"][0]["signature"], "s");
        assert_eq!(out["content"][1], json!({"type": "text", "text": "visible"}));
        assert_eq!(out["reasoning_content"], "my thoughts");
        assert_eq!(out["id"], "resp-123");
    }

    #[test]
    fn gemini_thought_parts_are_retagged_per_candidate() {
        let out = transform_thinking_parts(json!({
            "candidates": [
                {"content": {"parts": [
                    {"thought": true, "text": "step one"},
                    {"thought": true, "text": "step two"},
                    {"text": "output"}
                ]}},
                {"content": {"parts": [{"text": "plain"}]}}
            ]
        }));
        assert_eq!(out["candidates"][0]["content"]["parts"][0]["type"], "reasoning");
        assert_eq!(out["candidates"][0]["content"]["parts"][2], json!({"text": "output"}));
        assert_eq!(out["candidates"][0]["reasoning_content"], "step one\n\nstep two");
        assert!(out["candidates"][1].get("reasoning_content").is_none());
    }

    #[test]
    fn enveloped_gemini_response() {
        let out = transform_thinking_parts(json!({
            "response": {"candidates": [{"content": {"parts": [{"thought": true, "text": "hmm"}]}}]},
            "traceId": "t"
        }));
        assert_eq!(out["response"]["candidates"][0]["reasoning_content"], "hmm");
        assert_eq!(out["traceId"], "t");
    }

    #[test]
    fn non_objects_and_unknown_shapes_pass_through() {
        assert_eq!(transform_thinking_parts(Value::Null), Value::Null);
        assert_eq!(transform_thinking_parts(json!("string")), json!("string"));
        let other = json!({"id": "x", "model": "claude-4"});
        assert_eq!(transform_thinking_parts(other.clone()), other);

        let empty = json!({"content": [], "id": "resp-123", "model": "claude-4"});
        assert_eq!(transform_thinking_parts(empty.clone()), empty);
    }
}
