//! 两条常驻循环：提及轮询（MentionPoller）与自主发帖（AutonomousPoster）
//!
//! 两者都通过 dispatch 把指令交给 ActionPipeline，并逐条记录返回的事件。

pub mod autonomous;
pub mod mentions;
pub mod prompts;

use std::time::Duration;

use futures_util::StreamExt;

use crate::core::AgentError;
use crate::react::{ActionEvent, ActionPipeline, SessionContext};

pub use autonomous::AutonomousPoster;
pub use mentions::{DispatchOrder, MentionPoller, MentionPollerConfig};
pub use prompts::{default_catalogue, select_prompt, validate_catalogue, WeightedPrompt};

/// 运行管线直到事件流结束，返回事件数
///
/// 管线内的失败归为 DispatchFailure；平台拒绝发帖（PostFailure）原样返回，以便按 retry-after 退避。
/// 整体超过 timeout 返回 Timeout。
pub async fn dispatch(
    pipeline: &dyn ActionPipeline,
    instruction: &str,
    session: &SessionContext,
    timeout: Duration,
    cycle: &'static str,
) -> Result<usize, AgentError> {
    let work = async {
        let mut events = pipeline.run(instruction, session).await?;
        let mut count = 0usize;
        while let Some(event) = events.next().await {
            match event? {
                ActionEvent::Reasoning { message } => {
                    tracing::info!(cycle, "Agent response: {}", message);
                }
                ActionEvent::ToolExecution { tool, message } => {
                    tracing::info!(cycle, tool = %tool, "Tool execution: {}", message);
                }
            }
            count += 1;
        }
        Ok::<usize, AgentError>(count)
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(Ok(count)) => Ok(count),
        Ok(Err(e @ (AgentError::Cancelled | AgentError::PostFailure(_)))) => Err(e),
        Ok(Err(e)) => Err(AgentError::DispatchFailure(e.to_string())),
        Err(_) => Err(AgentError::Timeout {
            what: "action pipeline".to_string(),
            after: timeout,
        }),
    }
}
