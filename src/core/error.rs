//! 错误类型与恢复动作
//!
//! SocialError 描述社交平台客户端的失败；AgentError 是循环与动作管线共用的错误分类。
//! 与 RecoveryEngine 配合：根据 AgentError 决定下一轮前的等待时长或停止。

use std::time::Duration;

use thiserror::Error;

/// 社交平台 API 失败（限流 / 授权过期 / 网络 / 非 2xx / 解码）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocialError {
    #[error("Rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Access token expired or revoked")]
    AuthExpired,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// 编排引擎运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 选题目录为空或含非正权重
    #[error("Invalid prompt catalogue: {0}")]
    InvalidCatalogue(String),

    /// 拉取提及失败（含 AuthExpired，按普通周期失败处理）
    #[error("Fetch failure: {0}")]
    FetchFailure(#[from] SocialError),

    /// 动作管线抛错，或最终的 post / reply 工具调用失败
    #[error("Dispatch failure: {0}")]
    DispatchFailure(String),

    /// 平台拒绝了 post / reply；保留 SocialError，限流时按 retry-after 退避
    #[error("Post failure: {0}")]
    PostFailure(SocialError),

    /// 启动期授权失败（致命，不重试）
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Step limit exceeded ({0} steps)")]
    StepLimitExceeded(usize),

    #[error("Timed out after {after:?}: {what}")]
    Timeout { what: String, after: Duration },

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    /// 周期内的失败是否来自平台授权过期
    pub fn is_auth_expired(&self) -> bool {
        matches!(
            self,
            AgentError::FetchFailure(SocialError::AuthExpired) | AgentError::PostFailure(SocialError::AuthExpired)
        )
    }

    /// 平台限流时给出的等待时长（拉取与发帖两侧）
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AgentError::FetchFailure(SocialError::RateLimited { retry_after_secs })
            | AgentError::PostFailure(SocialError::RateLimited { retry_after_secs }) => {
                retry_after_secs.map(Duration::from_secs)
            }
            _ => None,
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 等待 delay 后进入下一轮
    Retry { delay: Duration },
    /// 停止循环（仅在收到关闭信号时）
    Stop,
}
