//! 记忆层：按会话线程保存的对话历史

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role, ThreadStore};
