pub mod context;
pub mod history;

pub use context::{SYSTEM_PROMPT, build_generation_request};
pub use history::{ChatMessage, ChatRole, build_history_messages};
