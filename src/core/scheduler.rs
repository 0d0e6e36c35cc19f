//! 周期调度：按固定节奏反复执行一个 CycleTask，直到取消
//!
//! 每个周期在独立的 tracing span 中运行；周期失败交给 RecoveryEngine 决定等待时长，
//! 不会终止循环。取消令牌在两个挂起点生效：周期执行中、周期间等待中。

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};

/// 单个周期的结果摘要（用于日志）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// 交给动作管线的次数
    pub dispatched: usize,
    /// 被过滤掉的输入（转推、重复、作者缺失）
    pub skipped: usize,
}

/// 可被调度器反复执行的周期任务
#[async_trait]
pub trait CycleTask: Send {
    /// 循环名称（日志中的 cycle 类型）
    fn name(&self) -> &'static str;

    /// 执行一个周期
    async fn run_cycle(&mut self) -> Result<CycleReport, AgentError>;
}

/// 周期节奏：成功后等待 interval，失败后等待 error_backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub interval: Duration,
    pub error_backoff: Duration,
}

impl Cadence {
    pub fn new(interval: Duration, error_backoff: Duration) -> Self {
        Self {
            interval,
            error_backoff,
        }
    }

    /// 成功与失败使用同一间隔
    pub fn uniform(interval: Duration) -> Self {
        Self::new(interval, interval)
    }
}

/// 循环退出时的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub succeeded: u64,
    pub failed: u64,
}

/// 等待 delay；期间若 token 被取消则提前返回 false
pub async fn sleep_or_cancel(delay: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// 反复执行 task：立即跑第一轮，之后按 cadence 等待，直到 token 被取消
pub async fn run_cycles<T>(
    task: &mut T,
    cadence: Cadence,
    recovery: &RecoveryEngine,
    token: CancellationToken,
) -> LoopStats
where
    T: CycleTask + ?Sized,
{
    let name = task.name();
    let mut stats = LoopStats::default();

    tracing::info!(
        cycle = name,
        interval_secs = cadence.interval.as_secs(),
        backoff_secs = cadence.error_backoff.as_secs(),
        "Loop started"
    );

    while !token.is_cancelled() {
        let started_at = chrono::Utc::now();
        let span = tracing::info_span!("cycle", cycle = name, id = %uuid::Uuid::new_v4());

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(AgentError::Cancelled),
            result = task.run_cycle().instrument(span) => result,
        };

        let delay = match outcome {
            Ok(report) => {
                stats.succeeded += 1;
                tracing::info!(
                    cycle = name,
                    started_at = %started_at.to_rfc3339(),
                    dispatched = report.dispatched,
                    skipped = report.skipped,
                    "Cycle completed"
                );
                cadence.interval
            }
            Err(e) => match recovery.handle(&e, cadence.error_backoff) {
                RecoveryAction::Stop => break,
                RecoveryAction::Retry { delay } => {
                    stats.failed += 1;
                    tracing::error!(
                        cycle = name,
                        started_at = %started_at.to_rfc3339(),
                        error = %e,
                        retry_in_secs = delay.as_secs(),
                        "Cycle failed"
                    );
                    delay
                }
            },
        };

        if !sleep_or_cancel(delay, &token).await {
            break;
        }
    }

    tracing::info!(
        cycle = name,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "Loop stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    /// 按脚本成功/失败，记录每轮开始时刻；跑满 script 后取消
    struct ScriptedTask {
        script: Vec<bool>,
        started: Vec<Instant>,
        token: CancellationToken,
    }

    #[async_trait]
    impl CycleTask for ScriptedTask {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn run_cycle(&mut self) -> Result<CycleReport, AgentError> {
            let idx = self.started.len();
            self.started.push(Instant::now());
            if idx + 1 >= self.script.len() {
                self.token.cancel();
            }
            if self.script[idx] {
                Ok(CycleReport::default())
            } else {
                Err(AgentError::DispatchFailure("boom".to_string()))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_uses_backoff_and_success_uses_interval() {
        let token = CancellationToken::new();
        let mut task = ScriptedTask {
            script: vec![false, true, true],
            started: Vec::new(),
            token: token.clone(),
        };
        let cadence = Cadence::new(Duration::from_secs(3600), Duration::from_secs(60));

        let stats = run_cycles(&mut task, cadence, &RecoveryEngine::new(), token).await;

        assert_eq!(stats, LoopStats { succeeded: 2, failed: 1 });
        assert_eq!(task.started.len(), 3);
        assert_eq!(task.started[1] - task.started[0], Duration::from_secs(60));
        assert_eq!(task.started[2] - task.started[1], Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sleep_stops_loop() {
        let token = CancellationToken::new();
        let mut task = ScriptedTask {
            script: vec![true, true, true, true],
            started: Vec::new(),
            token: CancellationToken::new(),
        };
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            cancel.cancel();
        });

        let stats = run_cycles(&mut task, Cadence::uniform(Duration::from_secs(100)), &RecoveryEngine::new(), token).await;

        assert_eq!(stats.succeeded, 2);
        assert_eq!(task.started.len(), 2);
    }

    #[tokio::test]
    async fn test_already_cancelled_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let mut task = ScriptedTask {
            script: vec![true],
            started: Vec::new(),
            token: token.clone(),
        };
        let stats = run_cycles(&mut task, Cadence::uniform(Duration::from_secs(1)), &RecoveryEngine::new(), token).await;
        assert_eq!(stats, LoopStats::default());
        assert!(task.started.is_empty());
    }

    #[tokio::test]
    async fn test_sleep_or_cancel() {
        let token = CancellationToken::new();
        assert!(sleep_or_cancel(Duration::from_millis(1), &token).await);
        token.cancel();
        assert!(!sleep_or_cancel(Duration::from_secs(3600), &token).await);
    }
}
