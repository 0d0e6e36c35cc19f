//! 工具箱：Tool trait、注册表、带超时的执行器与 send_tweet 工具

pub mod executor;
pub mod registry;
pub mod send_tweet;

pub use executor::{ToolExecutor, ToolOutput};
pub use registry::{Tool, ToolError, ToolRegistry};
pub use send_tweet::{parse_tweet_input, SendTweetTool, TweetRequest};
