//! 社交平台客户端抽象
//!
//! 编排引擎只通过 SocialClient 拉取提及、发帖与回复；Twitter v2 实现见 twitter.rs，
//! 测试与演练使用 mock.rs 中的脚本化实现。

use async_trait::async_trait;

use crate::core::SocialError;
use crate::social::MentionPage;

#[async_trait]
pub trait SocialClient: Send + Sync {
    /// 拉取 since_id 之后的提及（未设置时取最近一页），最多 page_size 条
    async fn fetch_mentions_since(
        &self,
        user_id: &str,
        since_id: Option<&str>,
        page_size: u32,
    ) -> Result<MentionPage, SocialError>;

    /// 发布新帖，返回帖子 ID
    async fn post(&self, text: &str) -> Result<String, SocialError>;

    /// 回复 parent_id，返回帖子 ID
    async fn reply(&self, text: &str, parent_id: &str) -> Result<String, SocialError>;
}
