pub mod context;
pub mod runtime;

pub use context::Conversation;
pub use runtime::{AgentRuntime, Turn};
