use crate::credential::types::RefreshParts;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 账号句柄：进程内稳定，不随删除后的重新编号而变化。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId(Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 模型族：限流按族独立记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Claude,
    Gemini,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 2] = [ModelFamily::Claude, ModelFamily::Gemini];

    pub fn for_model(model: &str) -> Self {
        if crate::util::model::is_claude(model) {
            Self::Claude
        } else {
            Self::Gemini
        }
    }

    /// 没有模型名时按 gemini 处理。
    pub fn for_optional_model(model: Option<&str>) -> Self {
        model.map_or(Self::Gemini, Self::for_model)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 各模型族的限流解除时间（epoch 毫秒）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub claude: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gemini: Option<i64>,
}

impl RateLimitState {
    pub fn get(&self, family: ModelFamily) -> Option<i64> {
        match family {
            ModelFamily::Claude => self.claude,
            ModelFamily::Gemini => self.gemini,
        }
    }

    pub fn set(&mut self, family: ModelFamily, reset_at: Option<i64>) {
        match family {
            ModelFamily::Claude => self.claude = reset_at,
            ModelFamily::Gemini => self.gemini = reset_at,
        }
    }

    pub fn is_limited(&self, family: ModelFamily, now_ms: i64) -> bool {
        self.get(family).is_some_and(|reset_at| now_ms < reset_at)
    }

    /// 惰性清理：已到期的解除时间直接删除。
    pub fn clear_expired(&mut self, now_ms: i64) {
        for family in ModelFamily::ALL {
            if self.get(family).is_some_and(|reset_at| now_ms >= reset_at) {
                self.set(family, None);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.claude.is_none() && self.gemini.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwitchReason {
    Initial,
    Rotation,
    RateLimit,
}

impl SwitchReason {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "initial" => Some(Self::Initial),
            "rotation" => Some(Self::Rotation),
            "rate-limit" => Some(Self::RateLimit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Rotation => "rotation",
            Self::RateLimit => "rate-limit",
        }
    }
}

/// 账号池中的一个账号。`index` 始终等于它在池中的位置。
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub index: usize,
    pub email: Option<String>,
    pub added_at: i64,
    pub last_used: i64,
    pub parts: RefreshParts,
    pub access: Option<String>,
    pub expires: Option<i64>,
    pub rate_limit_reset_times: RateLimitState,
    pub last_switch_reason: Option<SwitchReason>,
}

impl Account {
    pub fn new(index: usize, parts: RefreshParts, added_at: i64) -> Self {
        Self {
            id: AccountId::new(),
            index,
            email: None,
            added_at,
            last_used: 0,
            parts,
            access: None,
            expires: None,
            rate_limit_reset_times: RateLimitState::default(),
            last_switch_reason: None,
        }
    }

    /// 日志用标签：优先 email，否则 "Account N"（从 1 开始）。
    pub fn label(&self) -> String {
        match self.email.as_deref() {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => format!("Account {}", self.index + 1),
        }
    }
}
