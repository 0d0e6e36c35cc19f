//! Mock LLM 客户端（`llm.provider = "mock"` 时的演练后端）
//!
//! 收到指令时生成一次 send_tweet 调用（指令中含 REPLY:<id>: 时生成回复），
//! 收到工具观察结果后直接收尾，便于本地跑通整条管线。注意它会真的调用 send_tweet。

use async_trait::async_trait;
use regex::Regex;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");

        if last_user.starts_with("Observation from") {
            return Ok("Done.".to_string());
        }

        let reply_re = Regex::new(r"REPLY:([0-9A-Za-z_]+):").map_err(|e| e.to_string())?;
        let input = match reply_re.captures(last_user).and_then(|c| c.get(1)) {
            Some(id) => format!("REPLY:{}:gm from the mock agent 🤖", id.as_str()),
            None => "gm from the mock agent 🤖 #Base".to_string(),
        };

        Ok(serde_json::json!({ "tool": "send_tweet", "args": { "input": input } }).to_string())
    }
}
