//! 提及轮询
//!
//! 每个周期：拉取 last_processed_mention_id 之后的提及 -> 按接收顺序过滤（转推、已处理、作者缺失）
//! -> 逐条交给动作管线，条与条之间固定间隔。
//! 游标只在整个周期成功后前移到本页最新 ID；重叠窗口中的重复由 DedupeTracker 挡住。
//!
//! 分发失败的处理取决于 DispatchOrder：mark_then_act 中止本周期（该提及已放弃）；
//! act_then_mark 继续处理本页其余提及，失败的提及留待下一周期重试，
//! 同一 ID 失败达到 max_dispatch_attempts 次后标记为已处理并放弃，游标随之恢复前移。
//! 平台限流时两种顺序都立即结束本页。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::{AgentError, CycleReport, CycleTask, DedupeTracker};
use crate::react::{ActionPipeline, SessionContext};
use crate::social::{compare_ids, MentionRecord, SocialClient};

use super::dispatch;

/// 标记已处理与分发的先后顺序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOrder {
    /// 先标记再分发：分发失败则该提及永久放弃（不会重复回复）
    #[default]
    MarkThenAct,
    /// 分发成功后才标记：失败的提及会在后续周期重试，最多 max_dispatch_attempts 次（可能重复回复）
    ActThenMark,
}

#[derive(Debug, Clone)]
pub struct MentionPollerConfig {
    /// 机器人账号 ID
    pub user_id: String,
    pub page_size: u32,
    pub inter_mention_delay: Duration,
    pub dispatch_timeout: Duration,
    pub dispatch_order: DispatchOrder,
    /// act_then_mark 下单条提及的最多分发次数
    pub max_dispatch_attempts: u32,
}

impl MentionPollerConfig {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            page_size: 10,
            inter_mention_delay: Duration::from_secs(1),
            dispatch_timeout: Duration::from_secs(600),
            dispatch_order: DispatchOrder::MarkThenAct,
            max_dispatch_attempts: 3,
        }
    }
}

pub struct MentionPoller {
    social: Arc<dyn SocialClient>,
    pipeline: Arc<dyn ActionPipeline>,
    session: SessionContext,
    dedupe: DedupeTracker,
    last_processed_mention_id: Option<String>,
    /// act_then_mark 下尚未成功的提及及其失败次数
    failed_attempts: HashMap<String, u32>,
    config: MentionPollerConfig,
}

/// 回复指令：要求管线最终以 REPLY:<id>:@handle ... 调用 send_tweet
pub fn reply_instruction(author: &str, text: &str, mention_id: &str) -> String {
    format!(
        "User @{author} tweeted: {text}\n\
        Process their request and respond appropriately. \
        When you have your response ready, use the send_tweet tool with format 'REPLY:{mention_id}:@{author} yourResponse'"
    )
}

impl MentionPoller {
    pub fn new(
        social: Arc<dyn SocialClient>,
        pipeline: Arc<dyn ActionPipeline>,
        session: SessionContext,
        dedupe: DedupeTracker,
        config: MentionPollerConfig,
    ) -> Self {
        Self {
            social,
            pipeline,
            session,
            dedupe,
            last_processed_mention_id: None,
            failed_attempts: HashMap::new(),
            config,
        }
    }

    pub fn last_processed_mention_id(&self) -> Option<&str> {
        self.last_processed_mention_id.as_deref()
    }

    pub fn dedupe(&self) -> &DedupeTracker {
        &self.dedupe
    }

    /// 执行一个轮询周期
    pub async fn check_mentions(&mut self) -> Result<CycleReport, AgentError> {
        let page = self
            .social
            .fetch_mentions_since(
                &self.config.user_id,
                self.last_processed_mention_id.as_deref(),
                self.config.page_size,
            )
            .await?;

        tracing::debug!(count = page.mentions.len(), since_id = ?self.last_processed_mention_id, "Fetched mentions");

        let mut report = CycleReport::default();
        let mut attempted = 0usize;
        let mut first_error: Option<AgentError> = None;
        for mention in &page.mentions {
            if mention.is_retweet() {
                tracing::debug!(mention_id = %mention.id, "Skipping retweet");
                report.skipped += 1;
                continue;
            }
            if self.dedupe.has_seen(&mention.id) {
                tracing::info!(mention_id = %mention.id, "Mention already processed, skipping");
                report.skipped += 1;
                continue;
            }
            let Some(author) = page.author_handle(mention) else {
                tracing::warn!(mention_id = %mention.id, author_id = %mention.author_id, "Author missing from includes, skipping");
                report.skipped += 1;
                continue;
            };

            if attempted > 0 {
                tokio::time::sleep(self.config.inter_mention_delay).await;
            }
            attempted += 1;

            match self.handle_mention(mention, author).await {
                Ok(()) => report.dispatched += 1,
                Err(e) => {
                    let abort_page = matches!(self.config.dispatch_order, DispatchOrder::MarkThenAct)
                        || matches!(e, AgentError::Cancelled)
                        || e.retry_after().is_some();
                    if abort_page {
                        return Err(e);
                    }
                    tracing::warn!(mention_id = %mention.id, error = %e, "Mention dispatch failed, continuing with the rest of the page");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            tracing::warn!(
                dispatched = report.dispatched,
                pending_retry = self.failed_attempts.len(),
                "Mention cycle had failures; cursor stays put"
            );
            return Err(e);
        }

        if let Some(newest) = page.newest_id() {
            let advance = self
                .last_processed_mention_id
                .as_deref()
                .map_or(true, |current| compare_ids(&newest, current).is_gt());
            if advance {
                self.last_processed_mention_id = Some(newest);
            }
        }

        Ok(report)
    }

    async fn handle_mention(&mut self, mention: &MentionRecord, author: &str) -> Result<(), AgentError> {
        tracing::info!(mention_id = %mention.id, author = %author, "Processing mention: {}", mention.text);
        let instruction = reply_instruction(author, &mention.text, &mention.id);

        match self.config.dispatch_order {
            DispatchOrder::MarkThenAct => {
                self.dedupe.mark_seen(mention.id.clone());
                self.dispatch(&instruction).await
            }
            DispatchOrder::ActThenMark => match self.dispatch(&instruction).await {
                Ok(()) => {
                    self.failed_attempts.remove(&mention.id);
                    self.dedupe.mark_seen(mention.id.clone());
                    Ok(())
                }
                Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
                Err(e) => {
                    let attempts = self.failed_attempts.entry(mention.id.clone()).or_insert(0);
                    *attempts += 1;
                    if *attempts >= self.config.max_dispatch_attempts {
                        tracing::warn!(
                            mention_id = %mention.id,
                            attempts = *attempts,
                            "Giving up on mention after repeated dispatch failures"
                        );
                        self.failed_attempts.remove(&mention.id);
                        self.dedupe.mark_seen(mention.id.clone());
                    }
                    Err(e)
                }
            },
        }
    }

    async fn dispatch(&self, instruction: &str) -> Result<(), AgentError> {
        dispatch(
            self.pipeline.as_ref(),
            instruction,
            &self.session,
            self.config.dispatch_timeout,
            "mentions",
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl CycleTask for MentionPoller {
    fn name(&self) -> &'static str {
        "mentions"
    }

    async fn run_cycle(&mut self) -> Result<CycleReport, AgentError> {
        self.check_mentions().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SocialError;
    use crate::react::{ActionEvent, ActionStream};
    use crate::social::{MentionPage, ScriptedSocialClient};
    use futures_util::stream;
    use std::sync::Mutex;

    /// 记录收到的指令；fail_on 中包含的片段会让该次运行的事件流报错
    #[derive(Default)]
    struct RecordingPipeline {
        instructions: Mutex<Vec<String>>,
        fail_on: Vec<String>,
    }

    #[async_trait]
    impl ActionPipeline for RecordingPipeline {
        async fn run(&self, instruction: &str, _session: &SessionContext) -> Result<ActionStream, AgentError> {
            self.instructions.lock().unwrap().push(instruction.to_string());
            if self.fail_on.iter().any(|f| instruction.contains(f.as_str())) {
                return Ok(Box::pin(stream::iter(vec![
                    Ok(ActionEvent::reasoning("trying")),
                    Err(AgentError::ToolExecutionFailed("Failed to send tweet".to_string())),
                ])));
            }
            Ok(Box::pin(stream::iter(vec![
                Ok(ActionEvent::reasoning("replying")),
                Ok(ActionEvent::tool_execution("send_tweet", "Tweet sent as reply: 1")),
            ])))
        }
    }

    /// 每次运行都以平台限流结束
    #[derive(Default)]
    struct ThrottledPipeline {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ActionPipeline for ThrottledPipeline {
        async fn run(&self, _instruction: &str, _session: &SessionContext) -> Result<ActionStream, AgentError> {
            *self.calls.lock().unwrap() += 1;
            Ok(Box::pin(stream::iter(vec![Err(AgentError::PostFailure(SocialError::RateLimited {
                retry_after_secs: Some(900),
            }))])))
        }
    }

    fn page(mentions: Vec<MentionRecord>) -> MentionPage {
        let mut page = MentionPage {
            mentions,
            ..Default::default()
        };
        page.author_by_id.insert("u1".to_string(), "alice".to_string());
        page.author_by_id.insert("u2".to_string(), "bob".to_string());
        page
    }

    fn poller(social: Arc<ScriptedSocialClient>, pipeline: Arc<RecordingPipeline>, order: DispatchOrder) -> MentionPoller {
        let mut config = MentionPollerConfig::new("bot");
        config.dispatch_order = order;
        MentionPoller::new(social, pipeline, SessionContext::new("t"), DedupeTracker::new(100), config)
    }

    #[test]
    fn test_reply_instruction_format() {
        let text = reply_instruction("alice", "mint me an NFT", "1234");
        assert!(text.starts_with("User @alice tweeted: mint me an NFT"));
        assert!(text.contains("'REPLY:1234:@alice yourResponse'"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_retweets_unknown_authors_and_duplicates() {
        let social = Arc::new(ScriptedSocialClient::new());
        social.push_page(Ok(page(vec![
            MentionRecord::new("105", "u1", "gm @bot"),
            MentionRecord::new("104", "u2", "RT @bot gm").with_reference("retweet"),
            MentionRecord::new("103", "ghost", "who am i"),
            MentionRecord::new("102", "u2", "help @bot"),
        ])));
        // 重叠窗口：105 再次出现
        social.push_page(Ok(page(vec![
            MentionRecord::new("106", "u1", "again @bot"),
            MentionRecord::new("105", "u1", "gm @bot"),
        ])));
        let pipeline = Arc::new(RecordingPipeline::default());
        let mut poller = poller(social.clone(), pipeline.clone(), DispatchOrder::MarkThenAct);

        let first = poller.check_mentions().await.unwrap();
        assert_eq!(first, CycleReport { dispatched: 2, skipped: 2 });
        assert_eq!(poller.last_processed_mention_id(), Some("105"));

        let second = poller.check_mentions().await.unwrap();
        assert_eq!(second, CycleReport { dispatched: 1, skipped: 1 });
        assert_eq!(poller.last_processed_mention_id(), Some("106"));

        let instructions = pipeline.instructions.lock().unwrap().clone();
        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions.iter().filter(|i| i.contains("REPLY:105:")).count(), 1);
        assert!(!instructions.iter().any(|i| i.contains("REPLY:104:")));
        assert!(!instructions.iter().any(|i| i.contains("REPLY:103:")));

        assert_eq!(social.fetch_cursors(), vec![None, Some("105".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_mention_delay_between_dispatches() {
        let social = Arc::new(ScriptedSocialClient::new());
        social.push_page(Ok(page(vec![
            MentionRecord::new("3", "u1", "a"),
            MentionRecord::new("2", "u1", "b"),
            MentionRecord::new("1", "u1", "c"),
        ])));
        let mut poller = poller(social, Arc::new(RecordingPipeline::default()), DispatchOrder::MarkThenAct);

        let start = tokio::time::Instant::now();
        poller.check_mentions().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_cursor() {
        let social = Arc::new(ScriptedSocialClient::new());
        social.push_page(Ok(page(vec![MentionRecord::new("10", "u1", "hi")])));
        social.push_page(Err(SocialError::AuthExpired));
        let mut poller = poller(social, Arc::new(RecordingPipeline::default()), DispatchOrder::MarkThenAct);

        poller.check_mentions().await.unwrap();
        let err = poller.check_mentions().await.unwrap_err();
        assert!(err.is_auth_expired());
        assert_eq!(poller.last_processed_mention_id(), Some("10"));
    }

    #[tokio::test]
    async fn test_mark_then_act_forfeits_failed_mention() {
        let social = Arc::new(ScriptedSocialClient::new());
        let failing = page(vec![MentionRecord::new("7", "u1", "boom")]);
        social.push_page(Ok(failing.clone()));
        social.push_page(Ok(failing));
        let pipeline = Arc::new(RecordingPipeline {
            fail_on: vec!["REPLY:7:".to_string()],
            ..Default::default()
        });
        let mut poller = poller(social.clone(), pipeline.clone(), DispatchOrder::MarkThenAct);

        let err = poller.check_mentions().await.unwrap_err();
        assert!(matches!(err, AgentError::DispatchFailure(_)));
        assert!(poller.dedupe().has_seen("7"));
        assert_eq!(poller.last_processed_mention_id(), None);

        let report = poller.check_mentions().await.unwrap();
        assert_eq!(report, CycleReport { dispatched: 0, skipped: 1 });
        assert_eq!(pipeline.instructions.lock().unwrap().len(), 1);
        assert_eq!(social.fetch_cursors(), vec![None, None]);
    }

    #[tokio::test]
    async fn test_act_then_mark_retries_failed_mention() {
        let social = Arc::new(ScriptedSocialClient::new());
        let failing = page(vec![MentionRecord::new("7", "u1", "boom")]);
        social.push_page(Ok(failing.clone()));
        social.push_page(Ok(failing));
        let pipeline = Arc::new(RecordingPipeline {
            fail_on: vec!["REPLY:7:".to_string()],
            ..Default::default()
        });
        let mut poller = poller(social, pipeline.clone(), DispatchOrder::ActThenMark);

        assert!(poller.check_mentions().await.is_err());
        assert!(!poller.dedupe().has_seen("7"));
        assert!(poller.check_mentions().await.is_err());
        assert_eq!(pipeline.instructions.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_act_then_mark_failure_does_not_block_newer_mentions() {
        let social = Arc::new(ScriptedSocialClient::new());
        let window = page(vec![
            MentionRecord::new("9", "u1", "boom"),
            MentionRecord::new("8", "u2", "gm"),
        ]);
        for _ in 0..4 {
            social.push_page(Ok(window.clone()));
        }
        let pipeline = Arc::new(RecordingPipeline {
            fail_on: vec!["REPLY:9:".to_string()],
            ..Default::default()
        });
        let mut poller = poller(social.clone(), pipeline.clone(), DispatchOrder::ActThenMark);

        // 9 失败不影响同页的 8
        assert!(matches!(poller.check_mentions().await, Err(AgentError::DispatchFailure(_))));
        assert!(poller.dedupe().has_seen("8"));
        assert!(!poller.dedupe().has_seen("9"));
        assert_eq!(poller.last_processed_mention_id(), None);

        assert!(poller.check_mentions().await.is_err());
        assert!(!poller.dedupe().has_seen("9"));

        // 第三次失败后放弃
        assert!(poller.check_mentions().await.is_err());
        assert!(poller.dedupe().has_seen("9"));

        let report = poller.check_mentions().await.unwrap();
        assert_eq!(report, CycleReport { dispatched: 0, skipped: 2 });
        assert_eq!(poller.last_processed_mention_id(), Some("9"));

        let instructions = pipeline.instructions.lock().unwrap().clone();
        assert_eq!(instructions.iter().filter(|i| i.contains("REPLY:9:")).count(), 3);
        assert_eq!(instructions.iter().filter(|i| i.contains("REPLY:8:")).count(), 1);
        assert_eq!(social.fetch_cursors(), vec![None, None, None, None]);
    }

    #[tokio::test]
    async fn test_rate_limited_reply_ends_page_under_either_order() {
        for order in [DispatchOrder::MarkThenAct, DispatchOrder::ActThenMark] {
            let social = Arc::new(ScriptedSocialClient::new());
            social.push_page(Ok(page(vec![
                MentionRecord::new("9", "u1", "first"),
                MentionRecord::new("8", "u2", "second"),
            ])));
            let pipeline = Arc::new(ThrottledPipeline::default());
            let mut config = MentionPollerConfig::new("bot");
            config.dispatch_order = order;
            let mut poller = MentionPoller::new(social, pipeline.clone(), SessionContext::new("t"), DedupeTracker::new(100), config);

            let err = poller.check_mentions().await.unwrap_err();
            assert_eq!(err.retry_after(), Some(Duration::from_secs(900)));
            assert_eq!(*pipeline.calls.lock().unwrap(), 1);
        }
    }

    #[test]
    fn test_dispatch_order_from_config_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            order: DispatchOrder,
        }
        let w: Wrapper = serde_json::from_str(r#"{"order": "act_then_mark"}"#).unwrap();
        assert_eq!(w.order, DispatchOrder::ActThenMark);
        assert_eq!(DispatchOrder::default(), DispatchOrder::MarkThenAct);
    }
}
