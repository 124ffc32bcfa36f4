pub mod provider;
pub mod providers;
pub mod types;

pub use provider::{generate_with_retry, LlmProvider};
pub use types::{split_thinking, ContentPart, Message, Role};
