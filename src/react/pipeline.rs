//! 动作管线：自然语言指令 -> 推理/工具执行事件流
//!
//! ActionPipeline 是编排器调用的唯一入口；ReactPipeline 为 Plan -> Act (Tool) -> Observe 的实现，
//! 每拉取一次流就推进一步（惰性），直到模型给出纯文本回复、终结工具（send_tweet）成功或步数耗尽。
//! 同一 thread_id 的对话历史在进程内保留。

use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{stream, Stream};

use crate::core::AgentError;
use crate::memory::{Message, ThreadStore};
use crate::react::{malformed_tool_call_prompt, parse_llm_output, ActionEvent, Planner, PlannerOutput, ToolCall};
use crate::tools::ToolExecutor;

/// 有限、不可重启的事件流
pub type ActionStream = Pin<Box<dyn Stream<Item = Result<ActionEvent, AgentError>> + Send>>;

/// 会话上下文：同一 thread_id 共享对话历史
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub thread_id: String,
}

impl SessionContext {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
        }
    }
}

#[async_trait]
pub trait ActionPipeline: Send + Sync {
    async fn run(&self, instruction: &str, session: &SessionContext) -> Result<ActionStream, AgentError>;
}

struct PipelineInner {
    planner: Planner,
    executor: ToolExecutor,
    threads: Mutex<ThreadStore>,
    max_steps: usize,
}

/// ReAct 实现
#[derive(Clone)]
pub struct ReactPipeline {
    inner: Arc<PipelineInner>,
}

impl ReactPipeline {
    pub fn new(planner: Planner, executor: ToolExecutor, max_steps: usize, max_history_messages: usize) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                planner,
                executor,
                threads: Mutex::new(ThreadStore::new(max_history_messages)),
                max_steps: max_steps.max(1),
            }),
        }
    }

    /// 线程历史快照
    pub fn history(&self, thread_id: &str) -> Vec<Message> {
        lock_threads(&self.inner.threads).history(thread_id)
    }
}

fn lock_threads(m: &Mutex<ThreadStore>) -> std::sync::MutexGuard<'_, ThreadStore> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ActionPipeline for ReactPipeline {
    async fn run(&self, instruction: &str, session: &SessionContext) -> Result<ActionStream, AgentError> {
        let history = lock_threads(&self.inner.threads).history(&session.thread_id);
        let run = ReactRun {
            inner: Arc::clone(&self.inner),
            thread_id: session.thread_id.clone(),
            history,
            new_messages: vec![Message::user(instruction)],
            pending: None,
            step: 0,
            done: false,
        };

        Ok(Box::pin(stream::unfold(run, |mut run| async move {
            if run.done {
                return None;
            }
            let event = run.advance().await;
            if event.is_err() {
                run.finish();
            }
            Some((event, run))
        })))
    }
}

/// 单次运行状态
struct ReactRun {
    inner: Arc<PipelineInner>,
    thread_id: String,
    /// 运行前的线程历史
    history: Vec<Message>,
    /// 本次运行新增消息，结束时写回线程
    new_messages: Vec<Message>,
    pending: Option<ToolCall>,
    step: usize,
    done: bool,
}

impl ReactRun {
    async fn advance(&mut self) -> Result<ActionEvent, AgentError> {
        if let Some(call) = self.pending.take() {
            let output = self.inner.executor.execute(&call.tool, call.args).await?;
            self.new_messages.push(Message::assistant(format!(
                "Tool call: {} | Result: {}",
                call.tool, output.content
            )));
            self.new_messages.push(Message::user(format!(
                "Observation from {}: {}",
                call.tool, output.content
            )));
            if output.terminal {
                self.finish();
            }
            return Ok(ActionEvent::tool_execution(call.tool, output.content));
        }

        if self.step >= self.inner.max_steps {
            return Err(AgentError::StepLimitExceeded(self.inner.max_steps));
        }
        self.step += 1;

        let mut messages = self.history.clone();
        messages.extend(self.new_messages.iter().cloned());
        let output = self.inner.planner.plan(&messages).await?;

        match parse_llm_output(&output) {
            Ok(PlannerOutput::Response(text)) => {
                self.new_messages.push(Message::assistant(text.clone()));
                self.finish();
                Ok(ActionEvent::reasoning(text))
            }
            Ok(PlannerOutput::ToolCall(call)) => {
                self.pending = Some(call);
                Ok(ActionEvent::reasoning(output))
            }
            Err(AgentError::JsonParseError(raw)) => {
                self.new_messages.push(Message::assistant(output));
                self.new_messages.push(Message::user(malformed_tool_call_prompt(&raw)));
                Ok(ActionEvent::reasoning(format!("Malformed tool call, retrying: {raw}")))
            }
            Err(e) => Err(e),
        }
    }

    /// 结束运行并把本次消息写回线程（只写一次）
    fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        let msgs = std::mem::take(&mut self.new_messages);
        let appended = msgs.len();
        lock_threads(&self.inner.threads).append(&self.thread_id, msgs);

        let (prompt, completion, total) = self.inner.planner.token_usage();
        tracing::debug!(
            thread_id = %self.thread_id,
            steps = self.step,
            appended,
            prompt_tokens = prompt,
            completion_tokens = completion,
            total_tokens = total,
            "Run finished"
        );
    }
}

/// 流被提前丢弃（超时、取消）时也把已产生的消息写回线程
impl Drop for ReactRun {
    fn drop(&mut self) {
        self.finish();
    }
}
