//! `LlmClient` trait - abstraction over chat-completion backends.
//!
//! The agent runtime only needs "send this conversation, get text back";
//! providers translate to and from their own wire formats.

use anyhow::Result;
use async_trait::async_trait;

use super::{LlmResponse, Message};

/// Abstraction over LLM backends.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends a conversation to the LLM and returns the response.
    ///
    /// `messages` never contains the system prompt; providers place
    /// `system_prompt` wherever their API expects it.
    async fn complete(&self, system_prompt: &str, messages: &[Message]) -> Result<LlmResponse>;

    /// Human-readable description of the provider and model.
    ///
    /// Used in status output, e.g. `"openai (gpt-4o-mini)"`.
    fn description(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time verification that `LlmClient` is object-safe.
    #[test]
    fn test_llm_client_is_object_safe() {
        fn _assert_object_safe(_: &dyn LlmClient) {}
    }
}
