use serde::{Deserialize, Serialize};

/// access token 到期前 60 秒即视为过期，避免请求中途失效。
pub const ACCESS_TOKEN_EXPIRY_BUFFER_MS: i64 = 60_000;

/// 刷新凭据三元组：`refreshToken|projectId|managedProjectId`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshParts {
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub managed_project_id: Option<String>,
}

impl RefreshParts {
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            ..Self::default()
        }
    }

    /// 以 `|` 分隔解析；空段视为缺失。
    pub fn parse(raw: &str) -> Self {
        let mut segments = raw.split('|');
        let refresh_token = segments.next().unwrap_or_default().to_string();
        let project_id = non_empty(segments.next());
        let managed_project_id = non_empty(segments.next());
        Self {
            refresh_token,
            project_id,
            managed_project_id,
        }
    }

    /// `parse` 的逆运算：只从右侧省略尾部缺失段。
    pub fn format(&self) -> String {
        let project = self.project_id.as_deref().unwrap_or("");
        match &self.managed_project_id {
            Some(managed) => format!("{}|{project}|{managed}", self.refresh_token),
            None if !project.is_empty() => format!("{}|{project}", self.refresh_token),
            None => self.refresh_token.clone(),
        }
    }
}

fn non_empty(segment: Option<&str>) -> Option<String> {
    match segment {
        Some(s) if !s.is_empty() => Some(s.to_string()),
        _ => None,
    }
}

/// 一份 OAuth 凭据快照：编码后的刷新三元组 + 短期 access token。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDetails {
    pub refresh: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub access: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expires: Option<i64>,
}

impl AuthDetails {
    pub fn parts(&self) -> RefreshParts {
        RefreshParts::parse(&self.refresh)
    }
}

pub fn access_token_expired(auth: &AuthDetails, now_ms: i64) -> bool {
    let (Some(access), Some(expires)) = (auth.access.as_deref(), auth.expires) else {
        return true;
    };
    if access.is_empty() {
        return true;
    }
    expires <= now_ms + ACCESS_TOKEN_EXPIRY_BUFFER_MS
}
