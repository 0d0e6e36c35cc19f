//! 核心编排层：错误与恢复、去重、周期调度、优雅关闭、编排器

pub mod dedupe;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod scheduler;
pub mod shutdown;

pub use dedupe::DedupeTracker;
pub use error::{AgentError, RecoveryAction, SocialError};
pub use orchestrator::{Orchestrator, OrchestratorHandle, OrchestratorStats};
pub use recovery::RecoveryEngine;
pub use scheduler::{run_cycles, sleep_or_cancel, Cadence, CycleReport, CycleTask, LoopStats};
pub use shutdown::{ShutdownManager, ShutdownReason};
