use serde_json::Value;

/// 宽松解析的结果：调用方在边界处决定 `Malformed` 是记录日志还是上抛。
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Value(T),
    Absent,
    Malformed(String),
}

impl<T> Parsed<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Absent | Self::Malformed(_) => None,
        }
    }

    /// 与 `ok` 相同，但会把 `Malformed` 以 debug 级别记录下来。
    pub fn ok_logged(self, what: &str) -> Option<T> {
        if let Self::Malformed(reason) = &self {
            tracing::debug!("{what} 解析失败，已忽略: {reason}");
        }
        self.ok()
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// 解析后端返回的 JSON 文本：
/// - 非 null 对象：直接返回
/// - 数组：返回第一个非 null 元素
/// - 其它（原始值、空数组、全 null）：Absent
pub fn parse_api_body_value(raw: &str) -> Parsed<Value> {
    let parsed: Value = match serde_json::from_str(raw.trim()) {
        Ok(v) => v,
        Err(e) => return Parsed::Malformed(e.to_string()),
    };

    match parsed {
        Value::Object(_) => Parsed::Value(parsed),
        Value::Array(items) => match items.into_iter().find(|v| !v.is_null()) {
            Some(first) => Parsed::Value(first),
            None => Parsed::Absent,
        },
        _ => Parsed::Absent,
    }
}

pub fn parse_api_body(raw: &str) -> Option<Value> {
    parse_api_body_value(raw).ok_logged("响应体")
}

/// 读取数值字段：仅接受有限数，其余（字符串/null/NaN 等）视为不存在。
pub fn finite_f64(v: Option<&Value>) -> Option<f64> {
    let f = v?.as_f64()?;
    if f.is_finite() { Some(f) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_api_body_accepts_object() {
        assert_eq!(
            parse_api_body(r#"{"response": {"text": "hello"}}"#),
            Some(json!({"response": {"text": "hello"}}))
        );
    }

    #[test]
    fn parse_api_body_takes_first_array_element() {
        assert_eq!(
            parse_api_body(r#"[{"response": "first"}, {"response": "second"}]"#),
            Some(json!({"response": "first"}))
        );
        assert_eq!(
            parse_api_body(r#"[null, {"valid": true}]"#),
            Some(json!({"valid": true}))
        );
    }

    #[test]
    fn parse_api_body_rejects_everything_else() {
        assert_eq!(parse_api_body("not json"), None);
        assert_eq!(parse_api_body("[]"), None);
        assert_eq!(parse_api_body("[null, null]"), None);
        assert_eq!(parse_api_body(r#""string""#), None);
        assert_eq!(parse_api_body("123"), None);
        assert_eq!(parse_api_body("null"), None);
    }

    #[test]
    fn parse_api_body_value_distinguishes_malformed_from_absent() {
        assert!(parse_api_body_value("{oops").is_malformed());
        assert_eq!(parse_api_body_value("42"), Parsed::Absent);
    }

    #[test]
    fn finite_f64_drops_non_numbers() {
        assert_eq!(finite_f64(Some(&json!(12))), Some(12.0));
        assert_eq!(finite_f64(Some(&json!("12"))), None);
        assert_eq!(finite_f64(Some(&Value::Null)), None);
        assert_eq!(finite_f64(None), None);
    }
}
