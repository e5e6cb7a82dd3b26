use crate::account_pool::DEFAULT_TOAST_DEBOUNCE_MS;
use crate::credential::store::{DEFAULT_ACCOUNTS_FILE, default_data_dir};
use crate::credential::types::AuthDetails;
use figment::Figment;
use figment::providers::Env;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub accounts_file: String,

    pub debug: String,
    pub log_format: String,

    pub toast_debounce_ms: i64,

    /// 旧版单账号凭据（没有账号存储文件时使用）。
    pub fallback_refresh: String,
    pub fallback_access: String,
    pub fallback_expires: Option<i64>,

    /// `-sse <file>`：离线统计一段 SSE 记录里的 token 用量。
    pub sse_replay: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEnv {
    #[serde(alias = "DATA_DIR")]
    data_dir: Option<String>,
    #[serde(alias = "ACCOUNTS_FILE")]
    accounts_file: Option<String>,

    #[serde(alias = "DEBUG")]
    debug: Option<String>,
    #[serde(alias = "LOG_FORMAT")]
    log_format: Option<String>,

    #[serde(alias = "TOAST_DEBOUNCE_MS")]
    toast_debounce_ms: Option<i64>,

    #[serde(alias = "ANTIGRAVITY_REFRESH")]
    antigravity_refresh: Option<String>,
    #[serde(alias = "ANTIGRAVITY_ACCESS")]
    antigravity_access: Option<String>,
    #[serde(alias = "ANTIGRAVITY_EXPIRES")]
    antigravity_expires: Option<i64>,
}

impl Config {
    pub fn load() -> Self {
        load_dotenv();

        let raw = Figment::from(Env::raw())
            .extract::<RawEnv>()
            .unwrap_or_default();

        let mut cfg = Self::from_raw(raw);

        // 命令行覆盖：-debug <level>、-sse <file>
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-debug" => {
                    if let Some(v) = args.next() {
                        cfg.debug = v;
                    }
                }
                "-sse" => {
                    if let Some(v) = args.next() {
                        cfg.sse_replay = Some(PathBuf::from(v));
                    }
                }
                _ => {}
            }
        }

        cfg
    }

    fn from_raw(raw: RawEnv) -> Self {
        Self {
            data_dir: non_blank(raw.data_dir)
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            accounts_file: non_blank(raw.accounts_file)
                .unwrap_or_else(|| DEFAULT_ACCOUNTS_FILE.to_string()),
            debug: raw.debug.unwrap_or_else(|| "off".to_string()),
            log_format: raw.log_format.unwrap_or_else(|| "text".to_string()),
            toast_debounce_ms: raw
                .toast_debounce_ms
                .filter(|v| *v >= 0)
                .unwrap_or(DEFAULT_TOAST_DEBOUNCE_MS),
            fallback_refresh: raw.antigravity_refresh.unwrap_or_default(),
            fallback_access: raw.antigravity_access.unwrap_or_default(),
            fallback_expires: raw.antigravity_expires,
            sse_replay: None,
        }
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.data_dir.join(&self.accounts_file)
    }

    pub fn log_level(&self) -> crate::logging::LogLevel {
        crate::logging::LogLevel::parse(&self.debug)
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.trim().eq_ignore_ascii_case("json")
    }

    /// 旧版单账号凭据；refresh 为空时视为未配置。
    pub fn fallback_auth(&self) -> Option<AuthDetails> {
        let refresh = self.fallback_refresh.trim();
        if refresh.is_empty() {
            return None;
        }
        let access = self.fallback_access.trim();
        Some(AuthDetails {
            refresh: refresh.to_string(),
            access: (!access.is_empty()).then(|| access.to_string()),
            expires: self.fallback_expires,
        })
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn load_dotenv() {
    let Some(dotenv_path) = find_dotenv_path() else {
        return;
    };

    let Ok(file) = std::fs::File::open(&dotenv_path) else {
        return;
    };

    let reader = std::io::BufReader::new(file);
    for line in std::io::BufRead::lines(reader).map_while(Result::ok) {
        let Some((key, value)) = parse_dotenv_line(&line) else {
            continue;
        };
        // 已由真实环境设置的变量优先。
        if std::env::var_os(&key).is_some() {
            continue;
        }
        // Rust 2024：修改进程环境变量在并发场景下可能触发 UB，因此 API 为 unsafe。
        // 这里在启动阶段加载 .env，且未并发访问环境变量，符合使用前提。
        unsafe {
            std::env::set_var(key, value);
        }
    }
}

fn find_dotenv_path() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let mut dir: &Path = cwd.as_path();

    loop {
        let candidate = dir.join(".env");
        if candidate.is_file() {
            return Some(candidate);
        }

        // 发现 Cargo.toml 或 .git 即停止向上寻找。
        if dir.join("Cargo.toml").is_file() || dir.join(".git").is_dir() {
            return None;
        }

        let parent = dir.parent()?;
        if parent == dir {
            return None;
        }
        dir = parent;
    }
}

fn parse_dotenv_line(line: &str) -> Option<(String, String)> {
    let mut line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    if let Some(rest) = line.strip_prefix("export ") {
        line = rest.trim_start();
    }

    let (key, raw) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let raw = raw.trim();
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')));
    if let Some(v) = unquoted {
        return Some((key.to_string(), v.to_string()));
    }

    Some((key.to_string(), strip_inline_comment(raw).trim().to_string()))
}

fn strip_inline_comment(value: &str) -> &str {
    let bytes = value.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && (i == 0 || bytes[i - 1] == b' ' || bytes[i - 1] == b'\t') {
            return value[..i].trim_end();
        }
    }
    value
}
