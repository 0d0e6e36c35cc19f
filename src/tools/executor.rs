//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时；超时或失败时转为 AgentError，每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{Tool, ToolError, ToolRegistry};

/// 一次工具调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    /// 该工具成功后管线应结束
    pub terminal: bool,
}

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 未注册的工具 -> HallucinatedTool；超时 -> Timeout；
    /// 平台拒绝 -> PostFailure；其余工具失败 -> ToolExecutionFailed
    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> Result<ToolOutput, AgentError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| AgentError::HallucinatedTool(tool_name.to_string()))?;

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(ToolError::Platform(_))) => (false, "platform_error"),
            Ok(Err(ToolError::Failed(_))) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(Ok(content)) => Ok(ToolOutput {
                content,
                terminal: tool.is_terminal(),
            }),
            Ok(Err(ToolError::Platform(e))) => Err(AgentError::PostFailure(e)),
            Ok(Err(ToolError::Failed(e))) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::Timeout {
                what: format!("tool {tool_name}"),
                after: self.timeout,
            }),
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SocialError;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("late".to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            Err("nope".to_string().into())
        }
    }

    struct Throttled;

    #[async_trait]
    impl Tool for Throttled {
        fn name(&self) -> &str {
            "throttled"
        }

        fn description(&self) -> &str {
            "Always rate limited"
        }

        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            Err(SocialError::RateLimited { retry_after_secs: Some(120) }.into())
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Slow);
        registry.register(Failing);
        registry.register(Throttled);
        ToolExecutor::new(registry, 1)
    }

    #[tokio::test]
    async fn test_unknown_tool_is_hallucinated() {
        let err = executor().execute("deploy_token", Value::Null).await.unwrap_err();
        assert!(matches!(err, AgentError::HallucinatedTool(name) if name == "deploy_token"));
    }

    #[tokio::test]
    async fn test_tool_error_maps_to_execution_failed() {
        let err = executor().execute("failing", Value::Null).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailed(msg) if msg == "nope"));
    }

    #[tokio::test]
    async fn test_platform_error_keeps_social_error() {
        let err = executor().execute("throttled", Value::Null).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::PostFailure(SocialError::RateLimited { retry_after_secs: Some(120) })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_timeout() {
        let err = executor().execute("slow", Value::Null).await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout { .. }));
    }
}
