//! 对话历史
//!
//! 每个会话线程（thread_id）保留最近 N 条消息，超出时剪掉最旧部分；供 LLM 上下文使用。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 单线程对话：最多保留 max_messages 条
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<Message>,
    max_messages: usize,
}

impl ConversationMemory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages: max_messages.max(1),
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.prune();
    }

    pub fn extend(&mut self, msgs: impl IntoIterator<Item = Message>) {
        self.messages.extend(msgs);
        self.prune();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 超出上限时丢弃最旧的消息
    fn prune(&mut self) {
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// thread_id -> 对话历史（进程生命周期内有效）
#[derive(Debug, Default)]
pub struct ThreadStore {
    threads: HashMap<String, ConversationMemory>,
    max_messages: usize,
}

impl ThreadStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            threads: HashMap::new(),
            max_messages,
        }
    }

    /// 线程历史快照（不存在时为空）
    pub fn history(&self, thread_id: &str) -> Vec<Message> {
        self.threads
            .get(thread_id)
            .map(|c| c.messages().to_vec())
            .unwrap_or_default()
    }

    /// 将一次运行新增的消息追加到线程
    pub fn append(&mut self, thread_id: &str, msgs: Vec<Message>) {
        let max = self.max_messages;
        self.threads
            .entry(thread_id.to_string())
            .or_insert_with(|| ConversationMemory::new(max))
            .extend(msgs);
    }
}
