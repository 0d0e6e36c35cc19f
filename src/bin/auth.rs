//! Basebot OAuth2 授权
//!
//! 一次性流程：生成 PKCE -> 打印授权页地址 -> 粘贴回调地址（或授权码）-> 换取 token ->
//! 把 refresh token 写入 env 文件。之后 basebot 启动时用它刷新 access token。
//!
//! 环境变量:
//! - TWITTER_CLIENT_ID / TWITTER_CLIENT_SECRET: 开发者后台的 OAuth2 client
//!
//! 启动: cargo run --bin basebot-auth [config.toml]

use std::path::PathBuf;

use anyhow::Context;
use basebot::config::load_config;
use basebot::credentials::{authorize_url, extract_authorization_code, EnvFileCredentialStore, PkcePair};
use basebot::observability;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let creds = &cfg.credentials;

    let store = EnvFileCredentialStore::from_env(creds.token_url.clone(), creds.env_file.clone())
        .context("Missing Twitter OAuth2 client credentials")?;

    let pkce = PkcePair::generate();
    let state = uuid::Uuid::new_v4().simple().to_string();
    let url = authorize_url(
        &creds.authorize_url,
        store.client_id(),
        &creds.redirect_uri,
        &creds.scopes,
        &state,
        &pkce,
    )?;

    println!("Open this URL in a browser and approve access:\n\n{url}\n");
    println!("Then paste the full callback URL (or just the code) here:");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read callback from stdin")?;
    let code = extract_authorization_code(&line, &state)?;

    let tokens = store
        .exchange_code(&code, &pkce.verifier, &creds.redirect_uri)
        .await
        .context("Failed to exchange authorization code")?;
    let refresh_token = tokens
        .refresh_token
        .context("Token response has no refresh_token; make sure the offline.access scope is granted")?;

    store.persist_refresh_token(&refresh_token).with_context(|| {
        format!("Failed to write {}", store.env_file().display())
    })?;
    tracing::info!(path = %store.env_file().display(), "Authorization complete; basebot can start now");

    Ok(())
}
