//! Planner：人格 system prompt + Tool Call 解析
//!
//! 调用 LLM 得到回复或 JSON Tool Call；parse_llm_output 从文本中提取 JSON 并解析为 ToolCall 或直接回复。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;

/// Base 链上人格（配置 agent.system_prompt 可覆盖）
pub const DEFAULT_PERSONA: &str = "You are a fun and engaging AI agent on Base blockchain. \
You can perform various onchain actions and interact with users via Twitter. \
You have access to Base Sepolia testnet. If you need funds, use the faucet. \
Your personality is creative, helpful, and enthusiastic about crypto and web3. \
Don't use markdown or HTML in your responses. \
When users ask for something you can't do, suggest alternatives or guide them to Coinbase Developer Platform. \
Keep responses short, concise, and engaging, using emojis where appropriate. \
When replying to a tweet, formulate your response and then use the send_tweet tool with format 'REPLY:tweetId:yourResponse'.";

/// JSON 格式错误时注入下一轮的纠正提示
pub fn malformed_tool_call_prompt(raw: &str) -> String {
    format!(
        "Your previous output was not valid tool-call JSON: {raw}. \
        When calling a tool you must output exactly one JSON object and nothing else, \
        in the form {{\"tool\": \"name\", \"args\": {{...}}}}. \
        For example: {{\"tool\": \"send_tweet\", \"args\": {{\"input\": \"gm\"}}}}."
    )
}

/// LLM 返回的 Tool Call（简化 JSON：{"tool": "send_tweet", "args": {"input": "..."}}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 直接回复，管线结束
    Response(String),
    ToolCall(ToolCall),
}

/// 解析 LLM 输出：若含有效 JSON 且 tool 非空则为 ToolCall，否则为 Response
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            return Ok(PlannerOutput::Response(trimmed.to_string()));
        }
    } else {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    };

    let parsed: ToolCall = serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json_str)))?;

    if parsed.tool.is_empty() {
        Ok(PlannerOutput::Response(trimmed.to_string()))
    } else {
        Ok(PlannerOutput::ToolCall(parsed))
    }
}

/// Planner：持有 LLM、人格与工具 schema，plan 时拼 system + messages 后调用 LLM
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, persona: &str, tools_schema: &str) -> Self {
        let system_prompt = format!(
            "{persona}\n\nAvailable tools:\n{tools_schema}\n\n\
            To call a tool, output only one JSON object: {{\"tool\": \"name\", \"args\": {{...}}}}. \
            When you are finished, answer in plain text without JSON."
        );
        Self { llm, system_prompt }
    }

    /// 进程内累计 token 用量 (prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub async fn plan(&self, messages: &[Message]) -> Result<String, AgentError> {
        let mut full_messages = Vec::with_capacity(messages.len() + 1);
        full_messages.push(Message::system(self.system_prompt.clone()));
        full_messages.extend_from_slice(messages);
        self.llm.complete(&full_messages).await.map_err(AgentError::Llm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_response() {
        assert_eq!(
            parse_llm_output("All done 🚀").unwrap(),
            PlannerOutput::Response("All done 🚀".to_string())
        );
    }

    #[test]
    fn test_parse_tool_call() {
        let out = parse_llm_output(r#"{"tool": "send_tweet", "args": {"input": "gm"}}"#).unwrap();
        match out {
            PlannerOutput::ToolCall(tc) => {
                assert_eq!(tc.tool, "send_tweet");
                assert_eq!(tc.args["input"], "gm");
            }
            other => panic!("Expected ToolCall, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_fenced_tool_call() {
        let out = parse_llm_output("Sure!\n```json\n{\"tool\": \"send_tweet\", \"args\": {\"input\": \"hi\"}}\n```").unwrap();
        assert!(matches!(out, PlannerOutput::ToolCall(tc) if tc.tool == "send_tweet"));
    }

    #[test]
    fn test_parse_malformed_json() {
        let err = parse_llm_output(r#"{"tool": "send_tweet", "args": }"#).unwrap_err();
        assert!(matches!(err, AgentError::JsonParseError(_)));
    }

    #[test]
    fn test_malformed_prompt_mentions_format() {
        assert!(malformed_tool_call_prompt("oops").contains("\"tool\""));
    }
}
