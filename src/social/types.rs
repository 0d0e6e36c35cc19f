//! 提及记录与分页结果

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 转推标记：v2 API 返回 "retweeted"，旧客户端用 "retweet"
const RETWEET_MARKERS: [&str; 2] = ["retweet", "retweeted"];

/// 单条提及（每轮拉取后分发即丢弃）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionRecord {
    /// 平台内唯一 ID
    pub id: String,
    pub author_id: String,
    pub text: String,
    /// referenced_tweets[].type
    #[serde(default)]
    pub referenced_tweet_types: Vec<String>,
}

impl MentionRecord {
    pub fn new(id: impl Into<String>, author_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            text: text.into(),
            referenced_tweet_types: Vec::new(),
        }
    }

    pub fn with_reference(mut self, ref_type: impl Into<String>) -> Self {
        self.referenced_tweet_types.push(ref_type.into());
        self
    }

    pub fn is_retweet(&self) -> bool {
        self.referenced_tweet_types
            .iter()
            .any(|t| RETWEET_MARKERS.contains(&t.as_str()))
    }
}

/// 一次拉取的结果：按接收顺序的提及 + includes.users 侧表（author_id -> handle）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionPage {
    pub mentions: Vec<MentionRecord>,
    pub author_by_id: HashMap<String, String>,
    /// meta.newest_id；缺失时由 mentions 推算
    pub newest_id: Option<String>,
}

impl MentionPage {
    pub fn author_handle(&self, mention: &MentionRecord) -> Option<&str> {
        self.author_by_id.get(&mention.author_id).map(String::as_str)
    }

    /// 本页最新的提及 ID
    pub fn newest_id(&self) -> Option<String> {
        self.newest_id.clone().or_else(|| {
            self.mentions
                .iter()
                .map(|m| m.id.as_str())
                .max_by(|a, b| compare_ids(a, b))
                .map(str::to_string)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }
}

/// 平台 ID 为十进制数字串：先比长度再按字典序
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
