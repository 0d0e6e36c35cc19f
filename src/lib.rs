//! Basebot - Base 链上社交 Agent 编排引擎
//!
//! 模块划分：
//! - **agent**: 运行时装配（LLM、工具、动作管线、编排器）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、去重、周期调度、优雅关闭、编排器
//! - **credentials**: OAuth2 refresh token 刷新与持久化
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **loops**: 提及轮询、自主发帖、加权选题
//! - **memory**: 会话线程的对话历史
//! - **react**: 动作管线（Planner + ReAct 事件流）
//! - **social**: 社交平台客户端（Twitter v2 / Mock）
//! - **tools**: 工具注册、执行器与 send_tweet

pub mod agent;
pub mod config;
pub mod core;
pub mod credentials;
pub mod llm;
pub mod loops;
pub mod memory;
pub mod observability;
pub mod react;
pub mod social;
pub mod tools;
