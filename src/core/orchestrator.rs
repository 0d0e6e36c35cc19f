//! 编排器：以独立的 tokio 任务并行运行提及轮询与自主发帖
//!
//! 两条循环互不等待、互不影响；共享同一个 CancellationToken，关闭时一起退出。
//! 单个周期失败只影响该循环的下一次等待时长（见 RecoveryEngine）。

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{run_cycles, AgentError, Cadence, DedupeTracker, LoopStats, RecoveryEngine, ShutdownManager};
use crate::loops::{default_catalogue, AutonomousPoster, MentionPoller, MentionPollerConfig};
use crate::react::{ActionPipeline, SessionContext};
use crate::social::SocialClient;

/// 循环 + 节奏
pub struct ScheduledLoop<T> {
    pub task: T,
    pub cadence: Cadence,
}

pub struct Orchestrator {
    mentions: Option<ScheduledLoop<MentionPoller>>,
    autonomous: Option<ScheduledLoop<AutonomousPoster>>,
    recovery: Arc<RecoveryEngine>,
}

/// spawn 后的任务句柄
pub struct OrchestratorHandle {
    token: CancellationToken,
    mentions: Option<JoinHandle<LoopStats>>,
    autonomous: Option<JoinHandle<LoopStats>>,
}

/// 两条循环退出时的统计（未启用的为 None）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    pub mentions: Option<LoopStats>,
    pub autonomous: Option<LoopStats>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            mentions: None,
            autonomous: None,
            recovery: Arc::new(RecoveryEngine::new()),
        }
    }

    pub fn with_mentions(mut self, poller: MentionPoller, cadence: Cadence) -> Self {
        self.mentions = Some(ScheduledLoop { task: poller, cadence });
        self
    }

    pub fn with_autonomous(mut self, poster: AutonomousPoster, cadence: Cadence) -> Self {
        self.autonomous = Some(ScheduledLoop { task: poster, cadence });
        self
    }

    /// 按配置组装两条循环；两者共享 thread_id 对应的会话
    pub fn from_config(
        cfg: &AppConfig,
        social: Arc<dyn SocialClient>,
        pipeline: Arc<dyn ActionPipeline>,
    ) -> Result<Self, AgentError> {
        let session = SessionContext::new(cfg.agent.thread_id.clone());
        let mut orchestrator = Self::new();

        if cfg.agent.enable_mentions {
            let user_id = cfg.social.resolve_user_id().ok_or_else(|| {
                AgentError::Config("social.user_id (or TWITTER_USER_ID) is required for mention polling".to_string())
            })?;
            let poller = MentionPoller::new(
                Arc::clone(&social),
                Arc::clone(&pipeline),
                session.clone(),
                DedupeTracker::new(cfg.dedupe.capacity),
                MentionPollerConfig {
                    user_id,
                    page_size: cfg.social.page_size,
                    inter_mention_delay: cfg.schedule.inter_mention_delay(),
                    dispatch_timeout: cfg.pipeline.timeout(),
                    dispatch_order: cfg.dedupe.dispatch_order,
                    max_dispatch_attempts: cfg.dedupe.max_dispatch_attempts,
                },
            );
            orchestrator = orchestrator.with_mentions(poller, Cadence::uniform(cfg.schedule.mention_poll_interval()));
        }

        if cfg.agent.enable_autonomous {
            let poster = AutonomousPoster::new(
                Arc::clone(&pipeline),
                session,
                default_catalogue(),
                cfg.pipeline.timeout(),
            )?;
            orchestrator = orchestrator.with_autonomous(
                poster,
                Cadence::new(cfg.schedule.autonomous_interval(), cfg.schedule.autonomous_error_backoff()),
            );
        }

        Ok(orchestrator)
    }

    pub fn has_loops(&self) -> bool {
        self.mentions.is_some() || self.autonomous.is_some()
    }

    /// 启动各循环，立即返回
    pub fn spawn(self, token: CancellationToken) -> OrchestratorHandle {
        let mentions = self
            .mentions
            .map(|scheduled| spawn_loop(scheduled, Arc::clone(&self.recovery), token.clone()));
        let autonomous = self
            .autonomous
            .map(|scheduled| spawn_loop(scheduled, Arc::clone(&self.recovery), token.clone()));

        tracing::info!(
            mentions = mentions.is_some(),
            autonomous = autonomous.is_some(),
            "Orchestrator started"
        );
        OrchestratorHandle {
            token,
            mentions,
            autonomous,
        }
    }

    /// 运行直到收到关闭信号，然后等待两条循环退出
    pub async fn run_until_shutdown(self, shutdown: Arc<ShutdownManager>) -> OrchestratorStats {
        let mut reasons = shutdown.subscribe();
        let handle = self.spawn(shutdown.token());
        shutdown.wait_for_shutdown().await;
        let reason = reasons.try_recv().ok();
        tracing::info!(?reason, "Shutdown requested, waiting for loops to stop");
        handle.join().await
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_loop<T>(
    scheduled: ScheduledLoop<T>,
    recovery: Arc<RecoveryEngine>,
    token: CancellationToken,
) -> JoinHandle<LoopStats>
where
    T: crate::core::CycleTask + 'static,
{
    let ScheduledLoop { mut task, cadence } = scheduled;
    tokio::spawn(async move { run_cycles(&mut task, cadence, &recovery, token).await })
}

impl OrchestratorHandle {
    /// 取消所有循环
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 等待循环结束（不会主动取消）
    pub async fn join(self) -> OrchestratorStats {
        OrchestratorStats {
            mentions: join_loop("mentions", self.mentions).await,
            autonomous: join_loop("autonomous", self.autonomous).await,
        }
    }

    /// 取消并等待
    pub async fn shutdown(self) -> OrchestratorStats {
        self.cancel();
        self.join().await
    }
}

async fn join_loop(name: &str, handle: Option<JoinHandle<LoopStats>>) -> Option<LoopStats> {
    match handle?.await {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::error!(cycle = name, error = %e, "Loop task panicked or was aborted");
            None
        }
    }
}
