use crate::account_pool::types::{ModelFamily, RateLimitState, SwitchReason};
use crate::error::AppError;
use crate::util::json::{Parsed, finite_f64};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const STORAGE_VERSION: u64 = 2;
pub const DEFAULT_ACCOUNTS_FILE: &str = "antigravity-accounts.json";

/// 磁盘上的单条账号记录（v2 格式）。数值与枚举字段宽松解析，缺失或类型不对时视为不存在。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub email: Option<String>,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub managed_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_millis")]
    pub added_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_millis")]
    pub last_used: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_reason")]
    pub last_switch_reason: Option<SwitchReason>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_rate_limits")]
    pub rate_limit_reset_times: Option<RateLimitState>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStorage {
    pub version: u64,
    pub accounts: Vec<AccountRecord>,
    pub active_index: usize,
}

impl AccountStorage {
    pub fn new(accounts: Vec<AccountRecord>, active_index: usize) -> Self {
        Self {
            version: STORAGE_VERSION,
            accounts,
            active_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedStorage {
    pub storage: AccountStorage,
    /// 从 v1 迁移而来，需要写回。
    pub migrated: bool,
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_millis<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(finite_f64(Some(&v)).map(|f| f.floor() as i64))
}

fn lenient_reason<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SwitchReason>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(v.as_str().and_then(SwitchReason::parse))
}

fn lenient_rate_limits<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<RateLimitState>, D::Error> {
    let v = Value::deserialize(d)?;
    let mut state = RateLimitState::default();
    for family in ModelFamily::ALL {
        let reset_at = finite_f64(v.get(family.as_str())).map(|f| f.floor() as i64);
        state.set(family, reset_at);
    }
    Ok((!state.is_empty()).then_some(state))
}

/// 解析账号存储文件。
///
/// - 非 JSON、`accounts` 不是数组、未知版本：Malformed
/// - v1：迁移到 v2（仍在未来的 `rateLimitResetTime` 同时写入两个模型族）
/// - 缺少字符串 `refreshToken` 的条目逐条丢弃
/// - `activeIndex` 非整数或越界：归零
pub fn parse_storage(raw: &str, now_ms: i64) -> Parsed<LoadedStorage> {
    let root: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return Parsed::Malformed(format!("JSON 解析失败: {e}")),
    };

    let Some(entries) = root.get("accounts").and_then(Value::as_array) else {
        return Parsed::Malformed("accounts 不是数组".to_string());
    };

    let migrated = match root.get("version").and_then(Value::as_u64) {
        Some(1) => true,
        Some(STORAGE_VERSION) => false,
        _ => {
            return Parsed::Malformed(format!(
                "未知的存储版本: {}",
                root.get("version").unwrap_or(&Value::Null)
            ));
        }
    };

    let mut accounts = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        match AccountRecord::deserialize(entry) {
            Ok(mut record) => {
                if migrated {
                    migrate_v1_record(&mut record, entry, now_ms);
                }
                accounts.push(record);
            }
            Err(e) => tracing::warn!("丢弃无效的账号记录 #{i}: {e}"),
        }
    }

    let active_index = root
        .get("activeIndex")
        .and_then(|v| finite_f64(Some(v)))
        .filter(|f| *f >= 0.0 && f.fract() == 0.0)
        .map(|f| f as usize)
        .filter(|i| *i < accounts.len())
        .unwrap_or(0);

    Parsed::Value(LoadedStorage {
        storage: AccountStorage::new(accounts, active_index),
        migrated,
    })
}

fn migrate_v1_record(record: &mut AccountRecord, entry: &Value, now_ms: i64) {
    record.rate_limit_reset_times = None;
    let limited = entry
        .get("isRateLimited")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let reset_at = finite_f64(entry.get("rateLimitResetTime")).map(|f| f.floor() as i64);
    if let Some(reset_at) = reset_at
        && limited
        && reset_at > now_ms
    {
        record.rate_limit_reset_times = Some(RateLimitState {
            claude: Some(reset_at),
            gemini: Some(reset_at),
        });
    }
}

/// Windows 用 `%APPDATA%\opencode`，其它平台用 `$XDG_CONFIG_HOME/opencode`（默认 `~/.config/opencode`）。
pub fn default_data_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    if cfg!(windows) {
        let appdata = std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("AppData").join("Roaming"));
        return appdata.join("opencode");
    }

    let xdg = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join(".config"));
    xdg.join("opencode")
}

/// 账号存储文件的读写。
#[derive(Debug, Clone)]
pub struct AccountStore {
    file_path: PathBuf,
}

impl AccountStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// 文件不存在：`Ok(None)`；内容不可用：`Err(AppError::Storage)`。
    /// v1 文件会在迁移后写回。
    pub async fn load(&self) -> Result<Option<AccountStorage>, AppError> {
        let raw = match tokio::fs::read_to_string(&self.file_path).await {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let now_ms = chrono::Utc::now().timestamp_millis();
        let loaded = match parse_storage(&raw, now_ms) {
            Parsed::Value(v) => v,
            Parsed::Absent => return Ok(None),
            Parsed::Malformed(reason) => return Err(AppError::storage(reason)),
        };

        if loaded.migrated {
            tracing::info!("账号存储从 v1 迁移到 v2: {}", self.file_path.display());
            if let Err(e) = self.save(&loaded.storage).await {
                tracing::warn!("写回迁移后的账号存储失败: {e}");
            }
        }
        Ok(Some(loaded.storage))
    }

    /// 与 `load` 相同，但任何错误都记录日志并按“不存在”处理。
    pub async fn load_or_absent(&self) -> Option<AccountStorage> {
        match self.load().await {
            Ok(v) => v,
            Err(e) if e.is_malformed_storage() => {
                tracing::warn!("账号存储格式无效，已忽略: {e}");
                None
            }
            Err(e) => {
                tracing::error!("读取账号存储失败: {e}");
                None
            }
        }
    }

    pub async fn save(&self, storage: &AccountStorage) -> Result<(), AppError> {
        ensure_parent_dir(&self.file_path).await?;
        let data = serde_json::to_vec_pretty(storage)?;
        tokio::fs::write(&self.file_path, data).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        match tokio::fs::remove_file(&self.file_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    let Some(dir) = path.parent() else {
        return Ok(());
    };
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}
