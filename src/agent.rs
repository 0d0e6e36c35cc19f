//! 运行时装配
//!
//! 配置 -> LLM 后端 -> 工具（send_tweet）-> ReactPipeline -> Orchestrator。
//! 凭证刷新与 Twitter 客户端的建立也在这里，main 只负责串起来并处理致命错误。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, Orchestrator};
use crate::credentials::CredentialStore;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::react::{Planner, ReactPipeline, DEFAULT_PERSONA};
use crate::social::{SocialClient, TwitterClient};
use crate::tools::{SendTweetTool, ToolExecutor, ToolRegistry};

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
///
/// Mock 只能显式配置（`llm.provider = "mock"`）：它会直接调用 send_tweet，缺 key 时不能悄悄顶替。
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
    select_llm(cfg, api_key)
}

fn select_llm(cfg: &AppConfig, api_key: Option<String>) -> Result<Arc<dyn LlmClient>, AgentError> {
    match cfg.llm.provider.to_lowercase().as_str() {
        "mock" => {
            tracing::info!("Using Mock LLM (configured)");
            Ok(Arc::new(MockLlmClient))
        }
        "openai" => {
            let key = api_key.ok_or_else(|| {
                AgentError::Config(
                    "OPENAI_API_KEY is not set (set llm.provider = \"mock\" to run without a model)".to_string(),
                )
            })?;
            tracing::info!(model = %cfg.llm.model, "Using OpenAI LLM");
            Ok(Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, &key)))
        }
        other => Err(AgentError::Config(format!("Unknown llm.provider: {other}"))),
    }
}

/// 构建动作管线：只注册 send_tweet
pub fn build_pipeline(cfg: &AppConfig, llm: Arc<dyn LlmClient>, social: Arc<dyn SocialClient>) -> ReactPipeline {
    let mut tools = ToolRegistry::new();
    tools.register(SendTweetTool::new(social));
    tracing::info!(tools = ?tools.tool_names(), "Tools registered");

    let persona = cfg.agent.system_prompt.as_deref().unwrap_or(DEFAULT_PERSONA);
    let planner = Planner::new(llm, persona, &tools.to_schema_json());
    let executor = ToolExecutor::new(tools, cfg.pipeline.tool_timeout_secs);

    ReactPipeline::new(
        planner,
        executor,
        cfg.pipeline.max_steps,
        cfg.pipeline.max_history_messages,
    )
}

/// 刷新凭证并建立 Twitter 客户端；刷新失败直接返回错误（启动致命）
pub async fn connect_social(cfg: &AppConfig, credentials: &dyn CredentialStore) -> Result<Arc<TwitterClient>, AgentError> {
    let tokens = credentials.refresh().await?;
    let client = TwitterClient::new(
        &cfg.social.api_base,
        tokens.access_token,
        cfg.social.request_timeout_secs,
    )
    .map_err(|e| AgentError::Config(format!("Failed to build Twitter client: {e}")))?;
    Ok(Arc::new(client))
}

/// 组装编排器
pub fn build_orchestrator(
    cfg: &AppConfig,
    social: Arc<dyn SocialClient>,
    llm: Arc<dyn LlmClient>,
) -> Result<Orchestrator, AgentError> {
    let pipeline = build_pipeline(cfg, llm, Arc::clone(&social));
    let orchestrator = Orchestrator::from_config(cfg, social, Arc::new(pipeline))?;
    if !orchestrator.has_loops() {
        return Err(AgentError::Config(
            "both agent.enable_mentions and agent.enable_autonomous are false".to_string(),
        ));
    }
    Ok(orchestrator)
}
