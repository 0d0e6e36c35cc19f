//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BASEBOT__*` 覆盖（双下划线表示嵌套，如 `BASEBOT__SCHEDULE__MENTION_POLL_INTERVAL_SECS=600`）。
//! 密钥（Twitter client id/secret、refresh token、OpenAI key）不放在配置文件里，只从进程环境读取。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::loops::DispatchOrder;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub schedule: ScheduleSection,
    pub social: SocialSection,
    pub dedupe: DedupeSection,
    pub pipeline: PipelineSection,
    pub llm: LlmSection,
    pub credentials: CredentialsSection,
}

/// [agent] 段：会话线程、人设覆盖、循环开关
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 两条循环共享的对话线程
    #[serde(default = "default_thread_id")]
    pub thread_id: String,
    /// 覆盖内置人设提示词
    pub system_prompt: Option<String>,
    #[serde(default = "default_true")]
    pub enable_mentions: bool,
    #[serde(default = "default_true")]
    pub enable_autonomous: bool,
}

fn default_thread_id() -> String {
    "Base AI Agent".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            thread_id: default_thread_id(),
            system_prompt: None,
            enable_mentions: true,
            enable_autonomous: true,
        }
    }
}

/// [schedule] 段：两条循环的节奏（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSection {
    #[serde(default = "default_mention_poll_interval_secs")]
    pub mention_poll_interval_secs: u64,
    #[serde(default = "default_autonomous_interval_secs")]
    pub autonomous_interval_secs: u64,
    #[serde(default = "default_inter_mention_delay_secs")]
    pub inter_mention_delay_secs: u64,
    /// 自主发帖失败后的短退避
    #[serde(default = "default_autonomous_error_backoff_secs")]
    pub autonomous_error_backoff_secs: u64,
}

fn default_mention_poll_interval_secs() -> u64 {
    1200
}

fn default_autonomous_interval_secs() -> u64 {
    3600
}

fn default_inter_mention_delay_secs() -> u64 {
    1
}

fn default_autonomous_error_backoff_secs() -> u64 {
    60
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            mention_poll_interval_secs: default_mention_poll_interval_secs(),
            autonomous_interval_secs: default_autonomous_interval_secs(),
            inter_mention_delay_secs: default_inter_mention_delay_secs(),
            autonomous_error_backoff_secs: default_autonomous_error_backoff_secs(),
        }
    }
}

impl ScheduleSection {
    pub fn mention_poll_interval(&self) -> Duration {
        Duration::from_secs(self.mention_poll_interval_secs)
    }

    pub fn autonomous_interval(&self) -> Duration {
        Duration::from_secs(self.autonomous_interval_secs)
    }

    pub fn inter_mention_delay(&self) -> Duration {
        Duration::from_secs(self.inter_mention_delay_secs)
    }

    pub fn autonomous_error_backoff(&self) -> Duration {
        Duration::from_secs(self.autonomous_error_backoff_secs)
    }
}

/// [social] 段：Twitter v2 端点与机器人账号
#[derive(Debug, Clone, Deserialize)]
pub struct SocialSection {
    /// 机器人账号 ID；未设置时读环境变量 TWITTER_USER_ID
    pub user_id: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.twitter.com/2".to_string()
}

fn default_page_size() -> u32 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for SocialSection {
    fn default() -> Self {
        Self {
            user_id: None,
            api_base: default_api_base(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl SocialSection {
    /// 配置优先，其次环境变量
    pub fn resolve_user_id(&self) -> Option<String> {
        self.user_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| std::env::var("TWITTER_USER_ID").ok().filter(|s| !s.trim().is_empty()))
    }
}

/// [dedupe] 段
#[derive(Debug, Clone, Deserialize)]
pub struct DedupeSection {
    /// 去重集合上限，超出后淘汰最早的 ID
    #[serde(default = "default_dedupe_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub dispatch_order: DispatchOrder,
    /// act_then_mark 下同一条提及最多分发几次，之后标记为已处理并放弃
    #[serde(default = "default_max_dispatch_attempts")]
    pub max_dispatch_attempts: u32,
}

fn default_dedupe_capacity() -> usize {
    crate::core::dedupe::DEFAULT_CAPACITY
}

fn default_max_dispatch_attempts() -> u32 {
    3
}

impl Default for DedupeSection {
    fn default() -> Self {
        Self {
            capacity: default_dedupe_capacity(),
            dispatch_order: DispatchOrder::default(),
            max_dispatch_attempts: default_max_dispatch_attempts(),
        }
    }
}

/// [pipeline] 段：ReAct 步数、单次分发超时、线程历史上限
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_pipeline_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_max_steps() -> usize {
    10
}

fn default_pipeline_timeout_secs() -> u64 {
    600
}

fn default_max_history_messages() -> usize {
    40
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            timeout_secs: default_pipeline_timeout_secs(),
            max_history_messages: default_max_history_messages(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl PipelineSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
        }
    }
}

/// [credentials] 段：refresh token 的持久化文件与 OAuth2 端点
///
/// authorize_url / redirect_uri / scopes 只在 basebot-auth 授权流程中使用。
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsSection {
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    /// 必须与开发者后台登记的回调地址一致
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: String,
}

fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}

fn default_token_url() -> String {
    "https://api.twitter.com/2/oauth2/token".to_string()
}

fn default_authorize_url() -> String {
    "https://twitter.com/i/oauth2/authorize".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:3000/callback".to_string()
}

fn default_scopes() -> String {
    "tweet.read tweet.write users.read offline.access".to_string()
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            env_file: default_env_file(),
            token_url: default_token_url(),
            authorize_url: default_authorize_url(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 BASEBOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BASEBOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BASEBOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
