//! 自主发帖：每个周期按权重选一个话题，包装成发帖指令交给动作管线

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::core::{AgentError, CycleReport, CycleTask};
use crate::react::{ActionPipeline, SessionContext};

use super::{dispatch, select_prompt, validate_catalogue, WeightedPrompt};

/// 发帖指令模板
pub fn post_instruction(thought: &str) -> String {
    format!(
        "Create an engaging tweet based on this prompt: {thought}\n\n\
        Guidelines:\n\
        - Focus on providing value through information and engagement\n\
        - Only perform on-chain actions if explicitly prompted\n\
        - Keep tweets concise and friendly\n\
        - Use emojis appropriately\n\
        - Include hashtags like #Base #Web3 when relevant\n\
        When ready, use the send_tweet tool to share your message."
    )
}

pub struct AutonomousPoster {
    pipeline: Arc<dyn ActionPipeline>,
    session: SessionContext,
    catalogue: Vec<WeightedPrompt>,
    rng: StdRng,
    dispatch_timeout: Duration,
}

impl AutonomousPoster {
    /// 目录在构造时校验，空目录或零权重直接拒绝
    pub fn new(
        pipeline: Arc<dyn ActionPipeline>,
        session: SessionContext,
        catalogue: Vec<WeightedPrompt>,
        dispatch_timeout: Duration,
    ) -> Result<Self, AgentError> {
        validate_catalogue(&catalogue)?;
        Ok(Self {
            pipeline,
            session,
            catalogue,
            rng: StdRng::from_entropy(),
            dispatch_timeout,
        })
    }

    /// 固定随机种子（测试用）
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// 执行一个发帖周期
    pub async fn post_once(&mut self) -> Result<CycleReport, AgentError> {
        let thought = select_prompt(&self.catalogue, &mut self.rng)?.to_string();
        tracing::info!(prompt = %thought, "Selected autonomous prompt");

        let events = dispatch(
            self.pipeline.as_ref(),
            &post_instruction(&thought),
            &self.session,
            self.dispatch_timeout,
            "autonomous",
        )
        .await?;
        tracing::debug!(events, "Autonomous post finished");

        Ok(CycleReport {
            dispatched: 1,
            skipped: 0,
        })
    }
}

#[async_trait]
impl CycleTask for AutonomousPoster {
    fn name(&self) -> &'static str {
        "autonomous"
    }

    async fn run_cycle(&mut self) -> Result<CycleReport, AgentError> {
        self.post_once().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{run_cycles, Cadence, RecoveryEngine};
    use crate::react::{ActionEvent, ActionStream};
    use futures_util::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    /// 按脚本逐次成功/失败，记录指令与时刻；脚本用完后取消 token
    struct ScriptedPipeline {
        script: Mutex<VecDeque<bool>>,
        calls: Mutex<Vec<(Instant, String)>>,
        token: CancellationToken,
    }

    impl ScriptedPipeline {
        fn new(script: &[bool], token: CancellationToken) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.iter().copied().collect()),
                calls: Mutex::new(Vec::new()),
                token,
            })
        }
    }

    #[async_trait]
    impl ActionPipeline for ScriptedPipeline {
        async fn run(&self, instruction: &str, _session: &SessionContext) -> Result<ActionStream, AgentError> {
            self.calls.lock().unwrap().push((Instant::now(), instruction.to_string()));
            let mut script = self.script.lock().unwrap();
            let ok = script.pop_front().unwrap_or(true);
            if script.is_empty() {
                self.token.cancel();
            }
            if ok {
                Ok(Box::pin(stream::iter(vec![Ok(ActionEvent::tool_execution(
                    "send_tweet",
                    "Tweet sent: 1",
                ))])))
            } else {
                Err(AgentError::Llm("upstream 500".to_string()))
            }
        }
    }

    #[test]
    fn test_post_instruction_embeds_thought() {
        let text = post_instruction("Explain gas fees");
        assert!(text.starts_with("Create an engaging tweet based on this prompt: Explain gas fees\n\nGuidelines:"));
        assert!(text.contains("- Include hashtags like #Base #Web3 when relevant"));
        assert!(text.ends_with("use the send_tweet tool to share your message."));
    }

    #[test]
    fn test_empty_catalogue_rejected_at_construction() {
        let pipeline = ScriptedPipeline::new(&[], CancellationToken::new());
        let result = AutonomousPoster::new(pipeline, SessionContext::new("t"), Vec::new(), Duration::from_secs(5));
        assert!(matches!(result, Err(AgentError::InvalidCatalogue(_))));
    }

    #[tokio::test]
    async fn test_post_once_uses_a_catalogue_prompt() {
        let pipeline = ScriptedPipeline::new(&[true, true], CancellationToken::new());
        let catalogue = vec![WeightedPrompt::new("Talk about Base", 1)];
        let mut poster = AutonomousPoster::new(pipeline.clone(), SessionContext::new("t"), catalogue, Duration::from_secs(5))
            .unwrap()
            .with_seed(9);

        let report = poster.post_once().await.unwrap();
        assert_eq!(report.dispatched, 1);
        let calls = pipeline.calls.lock().unwrap();
        assert_eq!(calls[0].1, post_instruction("Talk about Base"));
    }

    #[tokio::test]
    async fn test_pipeline_error_becomes_dispatch_failure() {
        let pipeline = ScriptedPipeline::new(&[false, true], CancellationToken::new());
        let mut poster = AutonomousPoster::new(pipeline, SessionContext::new("t"), crate::loops::default_catalogue(), Duration::from_secs(5))
            .unwrap()
            .with_seed(1);
        assert!(matches!(poster.post_once().await, Err(AgentError::DispatchFailure(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_retries_after_backoff() {
        let token = CancellationToken::new();
        let pipeline = ScriptedPipeline::new(&[false, true], token.clone());
        let mut poster = AutonomousPoster::new(pipeline.clone(), SessionContext::new("t"), crate::loops::default_catalogue(), Duration::from_secs(600))
            .unwrap()
            .with_seed(5);
        let cadence = Cadence::new(Duration::from_secs(3600), Duration::from_secs(60));

        let stats = run_cycles(&mut poster, cadence, &RecoveryEngine::new(), token).await;

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 1);
        let calls = pipeline.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0 - calls[0].0, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_pipeline_times_out() {
        struct Hung;
        #[async_trait]
        impl ActionPipeline for Hung {
            async fn run(&self, _i: &str, _s: &SessionContext) -> Result<ActionStream, AgentError> {
                Ok(Box::pin(stream::pending::<Result<ActionEvent, AgentError>>()))
            }
        }
        let mut poster = AutonomousPoster::new(Arc::new(Hung), SessionContext::new("t"), crate::loops::default_catalogue(), Duration::from_secs(600))
            .unwrap();
        assert!(matches!(poster.post_once().await, Err(AgentError::Timeout { .. })));
    }
}
