//! 平台凭证：OAuth2 refresh_token 换取 access token，并把新的 refresh token 写回 env 文件
//!
//! 启动时刷新一次；刷新失败是致命错误（需要重新走授权流程，见 basebot-auth）。
//! 写回失败只记录日志，提示手动更新，不影响本次启动。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{distributions::Alphanumeric, Rng};
use regex::{NoExpand, Regex};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::core::AgentError;

pub const REFRESH_TOKEN_KEY: &str = "TWITTER_REFRESH_TOKEN";

/// token 端点返回的凭证
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    /// 平台轮换 refresh token 时才会返回
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 换取新的 access token
    async fn refresh(&self) -> Result<OAuthTokens, AgentError>;
}

/// refresh token 持久化在 env 文件中的凭证存储
pub struct EnvFileCredentialStore {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    env_file: PathBuf,
}

impl EnvFileCredentialStore {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        env_file: impl Into<PathBuf>,
    ) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::Auth(e.to_string()))?;
        Ok(Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            env_file: env_file.into(),
        })
    }

    /// client id / secret 从进程环境读取
    pub fn from_env(token_url: impl Into<String>, env_file: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let client_id = required_env("TWITTER_CLIENT_ID")?;
        let client_secret = required_env("TWITTER_CLIENT_SECRET")?;
        Self::new(token_url, client_id, client_secret, env_file)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn env_file(&self) -> &Path {
        &self.env_file
    }

    /// env 文件中有这一行就以它为准（即使为空），没有才读进程环境
    pub fn current_refresh_token(&self) -> Option<String> {
        std::fs::read_to_string(&self.env_file)
            .ok()
            .and_then(|content| read_env_value(&content, REFRESH_TOKEN_KEY))
            .or_else(|| std::env::var(REFRESH_TOKEN_KEY).ok())
            .filter(|t| !t.trim().is_empty())
    }

    /// 写回新的 refresh token
    ///
    /// 文件不存在时新建；文件存在但读不出来（权限、非 UTF-8 等）时不写，
    /// 否则会用只含 token 的内容覆盖掉其余密钥。
    pub fn persist_refresh_token(&self, token: &str) -> std::io::Result<()> {
        let content = match std::fs::read_to_string(&self.env_file) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        std::fs::write(&self.env_file, rewrite_refresh_token(&content, token))?;
        tracing::info!(path = %self.env_file.display(), "Refresh token updated in env file");
        Ok(())
    }

    /// 授权码 + PKCE verifier 换取首个 token 对
    pub async fn exchange_code(&self, code: &str, verifier: &str, redirect_uri: &str) -> Result<OAuthTokens, AgentError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
            ("client_id", self.client_id.as_str()),
        ];
        self.request_tokens(&params, "Authorization code exchange").await
    }

    async fn request_tokens(&self, params: &[(&str, &str)], what: &str) -> Result<OAuthTokens, AgentError> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| AgentError::Auth(format!("{what} request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AgentError::Auth(format!(
                "{what} rejected ({status}): {body}; re-run the OAuth2 authorization flow"
            )));
        }

        serde_json::from_str(&body).map_err(|e| AgentError::Auth(format!("Malformed token response: {e}")))
    }
}

fn required_env(key: &str) -> Result<String, AgentError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AgentError::Config(format!("{key} is not set")))
}

#[async_trait]
impl CredentialStore for EnvFileCredentialStore {
    async fn refresh(&self) -> Result<OAuthTokens, AgentError> {
        let refresh_token = self.current_refresh_token().ok_or_else(|| {
            AgentError::Auth(format!(
                "{REFRESH_TOKEN_KEY} missing; run basebot-auth to obtain one"
            ))
        })?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        let tokens = self.request_tokens(&params, "Token refresh").await?;
        tracing::info!(expires_in = ?tokens.expires_in, "Access token refreshed");

        if let Some(new_token) = tokens.refresh_token.as_deref() {
            if new_token != refresh_token {
                if let Err(e) = self.persist_refresh_token(new_token) {
                    tracing::warn!(
                        path = %self.env_file.display(),
                        error = %e,
                        "Failed to persist refresh token; update {} manually before the next restart",
                        REFRESH_TOKEN_KEY
                    );
                }
            }
        }
        Ok(tokens)
    }
}

/// 读取 KEY=value 行，去掉包裹的引号
pub fn read_env_value(content: &str, key: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        if k.trim() != key {
            return None;
        }
        let v = v.trim();
        let v = v
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(v);
        Some(v.to_string())
    })
}

/// 替换已有的 refresh token 行，没有则追加
pub fn rewrite_refresh_token(content: &str, token: &str) -> String {
    let line = format!("{REFRESH_TOKEN_KEY}={token}");
    let pattern = format!(r"(?m)^{REFRESH_TOKEN_KEY}=.*$");
    match Regex::new(&pattern) {
        Ok(re) if re.is_match(content) => re.replace(content, NoExpand(&line)).into_owned(),
        _ => {
            let mut out = content.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&line);
            out.push('\n');
            out
        }
    }
}

/// PKCE（S256）verifier 与 challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// 64 位随机字母数字 verifier
    pub fn generate() -> Self {
        let verifier: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();
        Self::from_verifier(verifier)
    }

    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self { verifier, challenge }
    }
}

/// 拼出浏览器授权页地址
pub fn authorize_url(
    base: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &str,
    state: &str,
    pkce: &PkcePair,
) -> Result<reqwest::Url, AgentError> {
    reqwest::Url::parse_with_params(
        base,
        &[
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("scope", scopes),
            ("state", state),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| AgentError::Config(format!("Invalid authorize_url {base}: {e}")))
}

/// 从用户粘贴的回调地址（或裸授权码）中取出 code，并校验 state
pub fn extract_authorization_code(input: &str, expected_state: &str) -> Result<String, AgentError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AgentError::Auth("No authorization code entered".to_string()));
    }
    if !input.starts_with("http://") && !input.starts_with("https://") {
        return Ok(input.to_string());
    }
    let url = reqwest::Url::parse(input).map_err(|e| AgentError::Auth(format!("Invalid callback URL: {e}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(AgentError::Auth(format!("Authorization denied: {value}"))),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(AgentError::Auth("Callback state does not match; restart the authorization flow".to_string()));
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| AgentError::Auth("Callback URL has no code parameter".to_string()))
}
