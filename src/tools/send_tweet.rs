//! send_tweet 工具：发新帖或回复
//!
//! 输入为纯文本时发新帖；形如 `REPLY:<tweetId>:<text>` 时回复指定帖子（正文中的冒号原样保留）。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::social::SocialClient;
use crate::tools::{Tool, ToolError};

const REPLY_PREFIX: &str = "REPLY:";

/// 解析后的发帖请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TweetRequest {
    Post { text: String },
    Reply { parent_id: String, text: String },
}

/// 解析 send_tweet 的 input；REPLY 格式缺少 ID 或正文时报错
pub fn parse_tweet_input(input: &str) -> Result<TweetRequest, String> {
    let Some(rest) = input.strip_prefix(REPLY_PREFIX) else {
        let text = input.trim();
        if text.is_empty() {
            return Err("send_tweet: empty tweet text".to_string());
        }
        return Ok(TweetRequest::Post {
            text: text.to_string(),
        });
    };

    let (parent_id, text) = rest
        .split_once(':')
        .ok_or_else(|| format!("send_tweet: expected 'REPLY:tweetId:text', got '{input}'"))?;
    let (parent_id, text) = (parent_id.trim(), text.trim());
    if parent_id.is_empty() || text.is_empty() {
        return Err(format!("send_tweet: expected 'REPLY:tweetId:text', got '{input}'"));
    }
    Ok(TweetRequest::Reply {
        parent_id: parent_id.to_string(),
        text: text.to_string(),
    })
}

pub struct SendTweetTool {
    client: Arc<dyn SocialClient>,
}

impl SendTweetTool {
    pub fn new(client: Arc<dyn SocialClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for SendTweetTool {
    fn name(&self) -> &str {
        "send_tweet"
    }

    fn description(&self) -> &str {
        "Send a tweet. Input format: for new tweet just send the text, for replies use format 'REPLY:tweetId:text'"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "Tweet text, or 'REPLY:tweetId:text' to reply"
                }
            },
            "required": ["input"]
        })
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        // 兼容 LLM 直接传字符串
        let input = match &args {
            Value::String(s) => s.as_str(),
            _ => args.get("input").and_then(|v| v.as_str()).unwrap_or(""),
        };

        match parse_tweet_input(input)? {
            TweetRequest::Reply { parent_id, text } => {
                let id = self.client.reply(&text, &parent_id).await.map_err(|e| {
                    tracing::error!(error = %e, parent_id = %parent_id, "Error sending tweet");
                    ToolError::Platform(e)
                })?;
                Ok(format!("Tweet sent as reply: {id}"))
            }
            TweetRequest::Post { text } => {
                let id = self.client.post(&text).await.map_err(|e| {
                    tracing::error!(error = %e, "Error sending tweet");
                    ToolError::Platform(e)
                })?;
                Ok(format!("Tweet sent: {id}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SocialError;
    use crate::social::ScriptedSocialClient;

    #[test]
    fn test_parse_plain_post() {
        assert_eq!(
            parse_tweet_input("gm Base 🔵"),
            Ok(TweetRequest::Post { text: "gm Base 🔵".to_string() })
        );
        assert!(parse_tweet_input("   ").is_err());
    }

    #[test]
    fn test_parse_reply_keeps_colons_in_body() {
        assert_eq!(
            parse_tweet_input("REPLY:1789:@alice ratio is 2:1 today"),
            Ok(TweetRequest::Reply {
                parent_id: "1789".to_string(),
                text: "@alice ratio is 2:1 today".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_malformed_reply() {
        assert!(parse_tweet_input("REPLY:1789").is_err());
        assert!(parse_tweet_input("REPLY::hello").is_err());
        assert!(parse_tweet_input("REPLY:1789:").is_err());
    }

    #[tokio::test]
    async fn test_execute_reply_and_post() {
        let client = Arc::new(ScriptedSocialClient::new());
        let tool = SendTweetTool::new(client.clone());

        let out = tool
            .execute(serde_json::json!({ "input": "REPLY:42:@bob on it" }))
            .await
            .unwrap();
        assert!(out.starts_with("Tweet sent as reply: "));

        let out = tool.execute(Value::String("hello web3".to_string())).await.unwrap();
        assert!(out.starts_with("Tweet sent: "));

        let sent = client.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].reply_to.as_deref(), Some("42"));
        assert_eq!(sent[0].text, "@bob on it");
        assert_eq!(sent[1].reply_to, None);
    }

    #[tokio::test]
    async fn test_execute_keeps_rate_limit_from_platform() {
        let client = Arc::new(ScriptedSocialClient::new());
        client.fail_next_send(SocialError::RateLimited { retry_after_secs: Some(900) });
        let tool = SendTweetTool::new(client.clone());

        let err = tool
            .execute(serde_json::json!({ "input": "REPLY:42:@bob on it" }))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Platform(SocialError::RateLimited { retry_after_secs: Some(900) }));
        assert!(client.sent().is_empty());

        let err = tool.execute(Value::String(" ".to_string())).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }
}
