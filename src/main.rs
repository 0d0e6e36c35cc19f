//! Basebot 入口
//!
//! 初始化日志 -> 加载配置 -> 刷新平台凭证（失败即退出）-> 装配管线与编排器 -> 运行直到 Ctrl+C / SIGTERM。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use basebot::agent::{build_orchestrator, connect_social, create_llm_from_config};
use basebot::config::load_config;
use basebot::core::ShutdownManager;
use basebot::credentials::EnvFileCredentialStore;
use basebot::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let credentials = EnvFileCredentialStore::from_env(cfg.credentials.token_url.clone(), cfg.credentials.env_file.clone())
        .context("Missing Twitter OAuth2 client credentials")?;
    let social = connect_social(&cfg, &credentials)
        .await
        .context("Failed to refresh Twitter access token; re-run the authorization flow")?;

    let llm = create_llm_from_config(&cfg).context("Failed to configure LLM backend")?;
    let orchestrator = build_orchestrator(&cfg, social, llm).context("Failed to build orchestrator")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    tracing::info!(thread_id = %cfg.agent.thread_id, "Starting autonomous agent");
    let stats = orchestrator.run_until_shutdown(shutdown).await;
    tracing::info!(?stats, "Agent stopped");

    Ok(())
}
