//! 错误恢复引擎
//!
//! 根据 AgentError 返回 RecoveryAction：两条循环都不会因单个周期失败而终止，
//! 只有关闭信号（Cancelled）会让循环停下。

use std::time::Duration;

use crate::core::{AgentError, RecoveryAction};

/// 周期失败 -> 下一轮等待时长
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// backoff 为该循环配置的失败后等待时长；平台给出 retry-after 且更长时以平台为准
    pub fn handle(&self, err: &AgentError, backoff: Duration) -> RecoveryAction {
        if matches!(err, AgentError::Cancelled) {
            return RecoveryAction::Stop;
        }
        if err.is_auth_expired() {
            tracing::warn!(
                "Platform credentials expired; retrying after backoff until they are refreshed externally"
            );
        }
        let delay = err.retry_after().map_or(backoff, |after| backoff.max(after));
        RecoveryAction::Retry { delay }
    }
}
