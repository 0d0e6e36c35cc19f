//! 动作管线事件：编排器只按标签分支并记录 message，不关心其余负载

use serde::Serialize;

/// 管线的一步：推理，或一次工具执行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionEvent {
    /// LLM 的推理/回复内容
    Reasoning { message: String },
    /// 工具返回
    ToolExecution { tool: String, message: String },
}

impl ActionEvent {
    pub fn reasoning(message: impl Into<String>) -> Self {
        Self::Reasoning {
            message: message.into(),
        }
    }

    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Reasoning { message } | Self::ToolExecution { message, .. } => message,
        }
    }
}
