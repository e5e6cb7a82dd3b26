use ant2pool::account_pool::AccountPool;
use ant2pool::account_pool::events::TracingSink;
use ant2pool::account_pool::types::ModelFamily;
use ant2pool::config::Config;
use ant2pool::credential::store::AccountStore;
use ant2pool::dialect::usage::extract_usage_from_sse_payload;
use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load();

    init_tracing(&cfg);

    let store = AccountStore::new(cfg.accounts_path());
    let mut pool = AccountPool::load_from_store(&store, cfg.fallback_auth().as_ref())
        .await
        .with_sink(Arc::new(TracingSink::new(cfg.log_level())))
        .with_toast_debounce(cfg.toast_debounce_ms);

    tracing::info!(
        "账号池已加载：共 {} 个账号（{}）",
        pool.account_count(),
        store.path().display()
    );

    for family in ModelFamily::ALL {
        pool.emit_wait_snapshot(family);
        let picked = pool
            .current_or_next_for_family(family)
            .map(|account| (account.index, account.label()));
        match picked {
            Some((index, label)) => {
                // 两个模型族选中同一账号时只提示一次
                if pool.should_show_account_toast(index) {
                    tracing::info!(family = %family, "下一个可用账号: {label}");
                    pool.mark_toast_shown(index);
                }
            }
            None => {
                let wait_ms = pool.min_wait_time_for_family(family);
                tracing::info!(family = %family, "暂无可用账号，最短等待 {wait_ms}ms");
            }
        }
    }

    // 首次选择会写入 lastUsed / lastSwitchReason；没有账号时不落盘，避免凭空创建文件。
    if pool.account_count() > 0 {
        pool.save_to_store(&store)
            .await
            .context("保存账号存储失败")?;
    }

    if let Some(path) = &cfg.sse_replay {
        let payload = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("读取 SSE 文件失败: {}", path.display()))?;
        match extract_usage_from_sse_payload(&payload) {
            Some(usage) => {
                let rendered =
                    serde_json::to_string(&usage).context("序列化 usageMetadata 失败")?;
                tracing::info!("SSE 用量: {rendered}");
                println!("{rendered}");
            }
            None => tracing::info!("SSE 中没有 usageMetadata"),
        }
    }

    Ok(())
}

fn init_tracing(cfg: &Config) {
    // 依赖库默认 warn，本项目自身日志至少 info，避免外部 RUST_LOG=warn 把诊断日志过滤掉。
    let debug = cfg.debug.trim().to_lowercase();
    let filter = if debug == "off" {
        EnvFilter::new("off")
    } else {
        let env = std::env::var("RUST_LOG").unwrap_or_default();
        let env = env.trim();
        if env.is_empty() {
            EnvFilter::new("warn,ant2pool=info")
        } else if env.contains("ant2pool") {
            EnvFilter::new(env)
        } else {
            EnvFilter::new(format!("{env},ant2pool=info"))
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    let _ = if cfg.json_logs() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
