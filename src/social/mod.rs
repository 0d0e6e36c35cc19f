//! 社交平台层：客户端抽象、提及数据模型与实现（Twitter v2 / 脚本化 Mock）

pub mod client;
pub mod mock;
pub mod twitter;
pub mod types;

pub use client::SocialClient;
pub use mock::{ScriptedSocialClient, SentPost};
pub use twitter::TwitterClient;
pub use types::{compare_ids, MentionPage, MentionRecord};
