//! 动作管线：事件类型、Planner、ReAct 实现

pub mod events;
pub mod pipeline;
pub mod planner;

pub use events::ActionEvent;
pub use pipeline::{ActionPipeline, ActionStream, ReactPipeline, SessionContext};
pub use planner::{
    malformed_tool_call_prompt, parse_llm_output, Planner, PlannerOutput, ToolCall, DEFAULT_PERSONA,
};
