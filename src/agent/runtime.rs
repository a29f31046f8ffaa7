use anyhow::Result;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::executor::{ExecutionResult, OperationExecutor};
use crate::llm::{LlmClient, Message};
use crate::protocol::{has_operations, parse, protocol_prompt, OperationRecord};

use super::context::Conversation;

/// Outcome of one user turn.
#[derive(Debug)]
pub struct Turn {
    /// Last model reply of the turn.
    pub reply: String,
    /// Every operation result of the turn, in execution order.
    pub results: Vec<ExecutionResult>,
    /// LLM round trips used.
    pub rounds: usize,
    /// True when the turn stopped at the round limit with operations pending.
    pub exhausted: bool,
}

/// Drives the model ↔ sandbox loop.
///
/// Each reply is scanned for operation tags; when it has some they are
/// executed and the results go back to the model as a JSON array, until a
/// reply carries no operations or `max_rounds` is reached.
pub struct AgentRuntime {
    llm: Box<dyn LlmClient>,
    executor: OperationExecutor,
    conversation: Conversation,
    max_rounds: usize,
}

impl AgentRuntime {
    pub fn new(config: &AgentConfig, llm: Box<dyn LlmClient>, executor: OperationExecutor) -> Self {
        let system_prompt = format!("{}{}", config.system_prompt, protocol_prompt());
        Self {
            llm,
            executor,
            conversation: Conversation::new(system_prompt, config.max_context),
            max_rounds: config.max_rounds.max(1),
        }
    }

    pub fn executor(&self) -> &OperationExecutor {
        &self.executor
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn llm_description(&self) -> String {
        self.llm.description()
    }

    /// Starts a fresh conversation. Files in the sandbox are left alone.
    pub fn reset(&mut self) {
        self.conversation.reset();
        info!("Conversation reset");
    }

    pub async fn chat(&mut self, input: &str) -> Result<Turn> {
        self.chat_with(input, |_, _| {}).await
    }

    /// Runs one user turn, reporting each executed operation to `on_result`.
    pub async fn chat_with<F>(&mut self, input: &str, mut on_result: F) -> Result<Turn>
    where
        F: FnMut(&OperationRecord, &ExecutionResult),
    {
        let mut outgoing = input.to_string();
        let mut results = Vec::new();
        let mut reply = String::new();

        for round in 1..=self.max_rounds {
            self.conversation.push(Message::user(outgoing));
            let response = self
                .llm
                .complete(self.conversation.system_prompt(), self.conversation.messages())
                .await?;
            reply = response.text;
            self.conversation.push(Message::assistant(reply.clone()));

            let records = if has_operations(&reply) {
                parse(&reply)
            } else {
                Vec::new()
            };
            if records.is_empty() {
                return Ok(Turn {
                    reply,
                    results,
                    rounds: round,
                    exhausted: false,
                });
            }

            info!("Round {round}: executing {} operation(s)", records.len());
            let mut batch = Vec::with_capacity(records.len());
            for record in &records {
                let result = self.executor.execute(record);
                on_result(record, &result);
                batch.push(result);
            }

            outgoing = serde_json::to_string(&batch)?;
            results.extend(batch);
        }

        warn!(
            "Stopped after {} round(s) with operations still pending",
            self.max_rounds
        );
        Ok(Turn {
            reply,
            results,
            rounds: self.max_rounds,
            exhausted: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays canned replies and records what it was sent.
    struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
        calls: Arc<Mutex<Vec<(String, Vec<Message>)>>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, system_prompt: &str, messages: &[Message]) -> Result<LlmResponse> {
            self.calls
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), messages.to_vec()));
            let text = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;
            Ok(LlmResponse {
                text,
                input_tokens: 0,
                output_tokens: 0,
            })
        }

        fn description(&self) -> String {
            "scripted (test)".to_string()
        }
    }

    type Calls = Arc<Mutex<Vec<(String, Vec<Message>)>>>;

    fn runtime(
        dir: &tempfile::TempDir,
        replies: &[&str],
        max_rounds: usize,
    ) -> (AgentRuntime, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let llm = ScriptedLlm {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            calls: calls.clone(),
        };
        let config = AgentConfig {
            system_prompt: "You are a test agent.\n".to_string(),
            max_rounds,
            ..AgentConfig::default()
        };
        let executor = OperationExecutor::new(dir.path().join("output")).unwrap();
        (AgentRuntime::new(&config, Box::new(llm), executor), calls)
    }

    #[tokio::test]
    async fn test_plain_reply_ends_turn() {
        let dir = tempfile::tempdir().unwrap();
        let (mut rt, calls) = runtime(&dir, &["Sure, what should the app do?"], 5);

        let turn = rt.chat("build me an app").await.unwrap();
        assert_eq!(turn.reply, "Sure, what should the app do?");
        assert_eq!(turn.rounds, 1);
        assert!(turn.results.is_empty());
        assert!(!turn.exhausted);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.starts_with("You are a test agent."));
        assert!(calls[0].0.contains("<create_file"));
        assert_eq!(calls[0].1, vec![Message::user("build me an app")]);
    }

    #[tokio::test]
    async fn test_operations_feed_results_back() {
        let dir = tempfile::tempdir().unwrap();
        let (mut rt, calls) = runtime(
            &dir,
            &[
                r#"<create_file path="main.py">print("Hello")</create_file><again reason="check" />"#,
                "<list_files />",
                "Done: main.py prints Hello.",
            ],
            5,
        );

        let mut seen = Vec::new();
        let turn = rt
            .chat_with("hello world script", |record, result| {
                seen.push((record.kind.to_string(), result.success));
            })
            .await
            .unwrap();

        assert_eq!(turn.rounds, 3);
        assert_eq!(turn.reply, "Done: main.py prints Hello.");
        assert_eq!(turn.results.len(), 3);
        assert_eq!(
            seen,
            vec![
                ("CREATE_FILE".to_string(), true),
                ("AGAIN".to_string(), true),
                ("LIST_FILES".to_string(), true),
            ]
        );
        assert_eq!(
            std::fs::read_to_string(rt.executor().root().join("main.py")).unwrap(),
            "print(\"Hello\")"
        );

        let calls = calls.lock().unwrap();
        // Second call carries the JSON results of the first batch
        let feedback = &calls[1].1.last().unwrap().content;
        let parsed: serde_json::Value = serde_json::from_str(feedback).unwrap();
        assert_eq!(parsed[0]["operation"], "CREATE_FILE");
        assert_eq!(parsed[1]["requires_follow_up"], true);
        // Third call sees the listing
        let feedback: serde_json::Value =
            serde_json::from_str(&calls[2].1.last().unwrap().content).unwrap();
        assert_eq!(feedback[0]["files"][0], "main.py");
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (mut rt, calls) = runtime(
            &dir,
            &[r#"<read_file path="missing.txt" />"#, "The file does not exist."],
            5,
        );

        let turn = rt.chat("show missing.txt").await.unwrap();
        assert_eq!(turn.rounds, 2);
        assert!(!turn.results[0].success);

        let calls = calls.lock().unwrap();
        let feedback: serde_json::Value =
            serde_json::from_str(&calls[1].1.last().unwrap().content).unwrap();
        assert_eq!(feedback[0]["error"], "file not found");
    }

    #[tokio::test]
    async fn test_round_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (mut rt, _calls) = runtime(&dir, &["<again />", "<again />", "<again />"], 2);

        let turn = rt.chat("loop forever").await.unwrap();
        assert!(turn.exhausted);
        assert_eq!(turn.rounds, 2);
        assert_eq!(turn.results.len(), 2);
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let (mut rt, _calls) = runtime(&dir, &[], 3);
        assert!(rt.chat("hi").await.is_err());
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let dir = tempfile::tempdir().unwrap();
        let (mut rt, calls) = runtime(&dir, &["one", "two"], 3);

        rt.chat("first").await.unwrap();
        rt.reset();
        assert!(rt.conversation().messages().is_empty());
        rt.chat("second").await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[1].1, vec![Message::user("second")]);
    }

    #[test]
    fn test_llm_description() {
        let dir = tempfile::tempdir().unwrap();
        let (rt, _calls) = runtime(&dir, &[], 1);
        assert_eq!(rt.llm_description(), "scripted (test)");
    }
}
