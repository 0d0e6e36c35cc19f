//! Twitter API v2 客户端
//!
//! 使用 OAuth 2.0 用户级 access token（Bearer）调用 mentions / tweets 端点。
//! 状态码映射：429 -> RateLimited，401 -> AuthExpired，其它非 2xx -> Api。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::core::SocialError;
use crate::social::{MentionPage, MentionRecord, SocialClient};

/// v2 mentions 端点允许的 max_results 范围
const MIN_PAGE_SIZE: u32 = 5;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct MentionsResponse {
    data: Option<Vec<Tweet>>,
    includes: Option<Includes>,
    meta: Option<MentionsMeta>,
    errors: Option<Vec<TwitterApiError>>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    #[serde(default)]
    author_id: String,
    referenced_tweets: Option<Vec<ReferencedTweet>>,
}

#[derive(Debug, Deserialize)]
struct ReferencedTweet {
    #[serde(rename = "type")]
    ref_type: String,
}

#[derive(Debug, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<TwitterUser>,
}

#[derive(Debug, Deserialize)]
struct TwitterUser {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct MentionsMeta {
    newest_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwitterApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
struct PostTweetResponse {
    data: Option<PostedTweet>,
    errors: Option<Vec<TwitterApiError>>,
}

#[derive(Debug, Deserialize)]
struct PostedTweet {
    id: String,
}

/// Twitter v2 客户端：api_base 可配置（测试或代理）
pub struct TwitterClient {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl TwitterClient {
    pub fn new(api_base: &str, access_token: impl Into<String>, timeout_secs: u64) -> Result<Self, SocialError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SocialError::Network(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    async fn post_tweet(&self, text: &str, reply_to: Option<&str>) -> Result<String, SocialError> {
        let url = format!("{}/tweets", self.api_base);
        let mut body = serde_json::json!({ "text": text });
        if let Some(parent) = reply_to {
            body["reply"] = serde_json::json!({ "in_reply_to_tweet_id": parent });
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SocialError::Network(e.to_string()))?;

        let body = read_success_body(response).await?;
        let data: PostTweetResponse =
            serde_json::from_str(&body).map_err(|e| SocialError::Decode(e.to_string()))?;

        match data.data {
            Some(tweet) => {
                tracing::info!(tweet_id = %tweet.id, reply_to = ?reply_to, "Tweet posted");
                Ok(tweet.id)
            }
            None => Err(SocialError::Api {
                status: 200,
                body: join_errors(data.errors.as_deref().unwrap_or_default()),
            }),
        }
    }
}

#[async_trait]
impl SocialClient for TwitterClient {
    async fn fetch_mentions_since(
        &self,
        user_id: &str,
        since_id: Option<&str>,
        page_size: u32,
    ) -> Result<MentionPage, SocialError> {
        let url = format!("{}/users/{}/mentions", self.api_base, user_id);
        let max_results = page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE).to_string();

        let mut params: Vec<(&str, &str)> = vec![
            ("tweet.fields", "author_id,referenced_tweets"),
            ("expansions", "author_id"),
            ("max_results", max_results.as_str()),
        ];
        if let Some(id) = since_id {
            params.push(("since_id", id));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await
            .map_err(|e| SocialError::Network(e.to_string()))?;

        let body = read_success_body(response).await?;
        parse_mentions(&body)
    }

    async fn post(&self, text: &str) -> Result<String, SocialError> {
        self.post_tweet(text, None).await
    }

    async fn reply(&self, text: &str, parent_id: &str) -> Result<String, SocialError> {
        self.post_tweet(text, Some(parent_id)).await
    }
}

/// 非 2xx 映射为 SocialError，成功时返回响应体文本
async fn read_success_body(response: reqwest::Response) -> Result<String, SocialError> {
    let status = response.status();
    let retry_after = rate_limit_delay(response.headers(), chrono::Utc::now().timestamp());
    let body = response.text().await.unwrap_or_default();
    classify_status(status.as_u16(), retry_after, body)
}

fn classify_status(status: u16, retry_after: Option<u64>, body: String) -> Result<String, SocialError> {
    match status {
        200..=299 => Ok(body),
        429 => Err(SocialError::RateLimited {
            retry_after_secs: retry_after,
        }),
        401 => Err(SocialError::AuthExpired),
        code => Err(SocialError::Api { status: code, body }),
    }
}

/// retry-after（秒）优先，其次 x-rate-limit-reset（epoch 秒）
fn rate_limit_delay(headers: &HeaderMap, now_epoch: i64) -> Option<u64> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<i64>().ok())
    };

    if let Some(secs) = header("retry-after") {
        return Some(secs.max(0) as u64);
    }
    header("x-rate-limit-reset").map(|reset| (reset - now_epoch).max(0) as u64)
}

fn parse_mentions(body: &str) -> Result<MentionPage, SocialError> {
    let data: MentionsResponse =
        serde_json::from_str(body).map_err(|e| SocialError::Decode(e.to_string()))?;

    let tweets = match (data.data, data.errors) {
        (Some(tweets), _) => tweets,
        (None, Some(errors)) if !errors.is_empty() => {
            return Err(SocialError::Api {
                status: 200,
                body: join_errors(&errors),
            });
        }
        (None, _) => Vec::new(),
    };

    let author_by_id: HashMap<String, String> = data
        .includes
        .map(|inc| inc.users.into_iter().map(|u| (u.id, u.username)).collect())
        .unwrap_or_default();

    let mentions = tweets
        .into_iter()
        .map(|t| MentionRecord {
            id: t.id,
            author_id: t.author_id,
            text: t.text,
            referenced_tweet_types: t
                .referenced_tweets
                .unwrap_or_default()
                .into_iter()
                .map(|r| r.ref_type)
                .collect(),
        })
        .collect();

    Ok(MentionPage {
        mentions,
        author_by_id,
        newest_id: data.meta.and_then(|m| m.newest_id),
    })
}

fn join_errors(errors: &[TwitterApiError]) -> String {
    errors
        .iter()
        .map(|e| if e.detail.is_empty() { e.message.clone() } else { e.detail.clone() })
        .collect::<Vec<_>>()
        .join("; ")
}
