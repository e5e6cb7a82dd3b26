use serde_json::Value;

/// 签名短于该长度的 thinking 块视为伪造或被截断。
pub const MIN_SIGNATURE_LENGTH: usize = 50;

/// 单个内容块的形态（在边界处判定一次）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartShape<'a> {
    /// Anthropic：`{type: "thinking", signature}`
    AnthropicThinking { signature: Option<&'a str> },
    /// Gemini：`{thought: true, thoughtSignature}`
    GeminiThought { signature: Option<&'a str> },
    Other,
}

impl<'a> PartShape<'a> {
    fn of(part: &'a Value) -> Self {
        if str_field(part, "type") == Some("thinking") {
            return Self::AnthropicThinking {
                signature: str_field(part, "signature")
                    .or_else(|| str_field(part, "thoughtSignature")),
            };
        }
        if part.get("thought").and_then(Value::as_bool) == Some(true) {
            return Self::GeminiThought {
                signature: str_field(part, "thoughtSignature")
                    .or_else(|| str_field(part, "signature")),
            };
        }
        Self::Other
    }

    fn keep(self) -> bool {
        match self {
            Self::AnthropicThinking { signature } | Self::GeminiThought { signature } => {
                signature.is_some_and(|s| s.chars().count() >= MIN_SIGNATURE_LENGTH)
            }
            Self::Other => true,
        }
    }
}

fn str_field<'a>(part: &'a Value, key: &str) -> Option<&'a str> {
    part.get(key).and_then(Value::as_str)
}

/// 移除每个轮次里签名缺失或过短的 thinking 块（`parts` 或 `content` 数组），其余内容原样保留。
/// 返回移除的块数。
pub fn filter_unsigned_thinking_blocks(turns: &mut [Value]) -> usize {
    let mut dropped = 0;
    for turn in turns.iter_mut() {
        for key in ["parts", "content"] {
            if let Some(Value::Array(parts)) = turn.get_mut(key) {
                let before = parts.len();
                parts.retain(|p| PartShape::of(p).keep());
                dropped += before - parts.len();
            }
        }
    }
    dropped
}
