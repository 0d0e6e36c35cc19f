//! 脚本化社交客户端（用于测试与本地演练，无需 API）
//!
//! 按顺序返回预置的拉取结果，队列耗尽后返回空页；记录每次拉取的 since_id 与发出的帖子。
//! 发帖失败同样可以预置，按顺序消耗。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::SocialError;
use crate::social::{MentionPage, SocialClient};

/// 已发出的帖子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPost {
    pub id: String,
    pub text: String,
    pub reply_to: Option<String>,
}

#[derive(Debug, Default)]
pub struct ScriptedSocialClient {
    pages: Mutex<VecDeque<Result<MentionPage, SocialError>>>,
    fetches: Mutex<Vec<Option<String>>>,
    send_failures: Mutex<VecDeque<SocialError>>,
    sent: Mutex<Vec<SentPost>>,
    next_id: AtomicU64,
}

impl ScriptedSocialClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一次拉取结果
    pub fn push_page(&self, page: Result<MentionPage, SocialError>) {
        lock(&self.pages).push_back(page);
    }

    /// 下一次 post / reply 返回该错误
    pub fn fail_next_send(&self, err: SocialError) {
        lock(&self.send_failures).push_back(err);
    }

    /// 每次拉取传入的 since_id
    pub fn fetch_cursors(&self) -> Vec<Option<String>> {
        lock(&self.fetches).clone()
    }

    pub fn sent(&self) -> Vec<SentPost> {
        lock(&self.sent).clone()
    }

    fn record(&self, text: &str, reply_to: Option<&str>) -> Result<String, SocialError> {
        if let Some(err) = lock(&self.send_failures).pop_front() {
            return Err(err);
        }
        let id = format!("post_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.sent).push(SentPost {
            id: id.clone(),
            text: text.to_string(),
            reply_to: reply_to.map(str::to_string),
        });
        Ok(id)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl SocialClient for ScriptedSocialClient {
    async fn fetch_mentions_since(
        &self,
        _user_id: &str,
        since_id: Option<&str>,
        _page_size: u32,
    ) -> Result<MentionPage, SocialError> {
        lock(&self.fetches).push(since_id.map(str::to_string));
        lock(&self.pages)
            .pop_front()
            .unwrap_or_else(|| Ok(MentionPage::default()))
    }

    async fn post(&self, text: &str) -> Result<String, SocialError> {
        self.record(text, None)
    }

    async fn reply(&self, text: &str, parent_id: &str) -> Result<String, SocialError> {
        self.record(text, Some(parent_id))
    }
}
