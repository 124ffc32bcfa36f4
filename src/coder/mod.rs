//! Bounded code sub-agent: a nested LLM loop that writes python/bash
//! snippets, runs them in a subprocess, and reports a structured summary
//! back to the planner.

pub mod executor;

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::config::CoderConfig;
use crate::errors::DeskPilotResult;
use crate::llm::provider::{generate_with_retry, LlmProvider};
use crate::llm::types::{Message, Role};
use executor::{ExecutionRecord, Language, SnippetRunner};

const SYSTEM_PROMPT: &str = "\
You are a code assistant embedded in a desktop automation agent. You solve \
data-manipulation tasks by writing short scripts.

Rules:
- Reply with exactly one fenced code block tagged `python` or `bash`.
- Each script must be self-contained; state does not persist between runs.
- Inspect results from the execution report before deciding the next step.
- When the task is complete, reply with the single word DONE.
- If the task cannot be completed, reply with the single word FAIL.";

#[derive(Debug, Clone, Serialize)]
pub struct CodeAgentReport {
    pub task_instruction: String,
    pub completion_reason: String,
    pub summary: String,
    pub execution_history: Vec<ExecutionRecord>,
    pub steps_executed: u32,
    pub budget: u32,
}

impl CodeAgentReport {
    /// Compact rendering spliced into the worker's next prompt.
    pub fn render(&self) -> String {
        format!(
            "Code agent report for task: {}\nCompletion: {} ({} of {} steps used)\nSummary: {}",
            self.task_instruction,
            self.completion_reason,
            self.steps_executed,
            self.budget,
            self.summary
        )
    }
}

pub struct CodeAgent {
    provider: Arc<dyn LlmProvider>,
    runner: SnippetRunner,
    budget: u32,
    temperature: f32,
}

impl CodeAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &CoderConfig) -> Self {
        Self {
            provider,
            runner: SnippetRunner::new(Duration::from_secs(config.timeout_seconds)),
            budget: config.budget,
            temperature: config.temperature,
        }
    }

    pub async fn run(&self, task: &str) -> DeskPilotResult<CodeAgentReport> {
        let mut conversation = vec![
            Message::text(Role::System, SYSTEM_PROMPT),
            Message::text(Role::User, format!("Task: {task}")),
        ];
        let mut history: Vec<ExecutionRecord> = Vec::new();
        let mut completion_reason: Option<String> = None;
        let mut steps_executed = 0u32;

        for step in 1..=self.budget {
            let response =
                generate_with_retry(&*self.provider, &conversation, self.temperature, None, false)
                    .await;
            steps_executed = step;

            if response.is_empty() {
                tracing::warn!(step, "code agent got empty response");
                conversation.push(Message::text(Role::Assistant, ""));
                conversation.push(Message::text(
                    Role::User,
                    "Your previous reply was empty. Reply with one fenced python or bash \
                     code block, or DONE / FAIL.",
                ));
                continue;
            }

            conversation.push(Message::text(Role::Assistant, response.clone()));

            if let Some(sentinel) = find_sentinel(&response) {
                completion_reason = Some(sentinel.to_string());
                break;
            }

            match extract_snippet(&response) {
                Some((language, code)) => {
                    tracing::info!(step, language = ?language, bytes = code.len(), "running snippet");
                    let record = self.runner.run(language, &code).await?;
                    conversation.push(Message::text(Role::User, record.render()));
                    history.push(record);
                }
                None => {
                    tracing::warn!(step, "code agent response had no snippet or sentinel");
                    conversation.push(Message::text(
                        Role::User,
                        "No code block found. Reply with one fenced python or bash code \
                         block, or DONE / FAIL.",
                    ));
                }
            }
        }

        let completion_reason = completion_reason.unwrap_or_else(|| {
            format!("BUDGET_EXHAUSTED_AFTER_{}_STEPS", self.budget)
        });

        let summary = self.summarize(&conversation, task).await;

        Ok(CodeAgentReport {
            task_instruction: task.to_string(),
            completion_reason,
            summary,
            execution_history: history,
            steps_executed,
            budget: self.budget,
        })
    }

    /// Second pass over the session producing a short factual summary.
    async fn summarize(&self, conversation: &[Message], task: &str) -> String {
        let mut messages = conversation.to_vec();
        messages.push(Message::text(
            Role::User,
            format!(
                "The session is over. In a few sentences, summarize factually what was \
                 done for the task \"{task}\" and what the outcome was. Do not write code."
            ),
        ));
        let summary = generate_with_retry(&*self.provider, &messages, 0.0, None, false).await;
        if summary.trim().is_empty() {
            "No summary available.".to_string()
        } else {
            summary.trim().to_string()
        }
    }
}

/// A line consisting solely of DONE or FAIL ends the session.
fn find_sentinel(response: &str) -> Option<&'static str> {
    for line in response.lines() {
        match line.trim() {
            "DONE" => return Some("DONE"),
            "FAIL" => return Some("FAIL"),
            _ => {}
        }
    }
    None
}

/// The last fenced block tagged python or bash. Untagged blocks default to
/// python, matching how models usually answer data tasks.
fn extract_snippet(response: &str) -> Option<(Language, String)> {
    let re = Regex::new(r"(?s)```([a-zA-Z0-9_+-]*)[ \t]*\r?\n(.*?)```").ok()?;
    let mut found = None;
    for captures in re.captures_iter(response) {
        let tag = captures.get(1).map(|m| m.as_str()).unwrap_or("");
        let code = captures.get(2).map(|m| m.as_str().trim().to_string())?;
        let language = if tag.is_empty() {
            Language::Python
        } else {
            match Language::from_tag(tag) {
                Some(language) => language,
                None => continue,
            }
        };
        found = Some((language, code));
    }
    found
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::Mutex;

    use super::*;
    use crate::errors::DeskPilotResult;

    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _messages: &[Message],
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> DeskPilotResult<String> {
            Ok(self.responses.lock().unwrap().pop().unwrap_or_default())
        }
    }

    fn coder_config(budget: u32) -> CoderConfig {
        CoderConfig {
            budget,
            timeout_seconds: 10,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn done_sentinel_ends_the_session() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "```bash\necho step-one\n```",
            "All good.\nDONE",
            "The task printed step-one successfully.",
        ]));
        let agent = CodeAgent::new(provider, &coder_config(5));
        let report = agent.run("print step-one").await.unwrap();
        assert_eq!(report.completion_reason, "DONE");
        assert_eq!(report.steps_executed, 2);
        assert_eq!(report.execution_history.len(), 1);
        assert!(report.execution_history[0].succeeded());
        assert!(!report.summary.is_empty());
    }

    #[tokio::test]
    async fn budget_exhaustion_reason_names_the_budget() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "```bash\necho one\n```",
            "```bash\necho two\n```",
            "Ran two snippets, never signalled completion.",
        ]));
        let agent = CodeAgent::new(provider, &coder_config(2));
        let report = agent.run("loop forever").await.unwrap();
        assert_eq!(report.completion_reason, "BUDGET_EXHAUSTED_AFTER_2_STEPS");
        assert_eq!(report.steps_executed, 2);
        assert!(!report.summary.is_empty());
    }

    #[test]
    fn snippet_extraction_prefers_last_tagged_block() {
        let response = "```python\nprint(1)\n```\nthen\n```bash\necho 2\n```";
        let (language, code) = extract_snippet(response).unwrap();
        assert_eq!(language, Language::Bash);
        assert_eq!(code, "echo 2");
    }

    #[test]
    fn sentinel_must_be_a_whole_line() {
        assert_eq!(find_sentinel("work is DONE now"), None);
        assert_eq!(find_sentinel("DONE"), Some("DONE"));
        assert_eq!(find_sentinel("  FAIL  "), Some("FAIL"));
    }
}
