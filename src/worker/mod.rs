//! The worker turns an observation plus history into the next plan. Every
//! response is format-checked; malformed output is retried with targeted
//! feedback, and a step that stays malformed degrades to a short wait so
//! the loop keeps moving.

pub mod trajectory;

use std::sync::Arc;

use crate::action::parser::{extract_calls, parse_code_block, parse_plan};
use crate::action::AgentAction;
use crate::coder::CodeAgentReport;
use crate::config::AgentTuning;
use crate::llm::provider::{generate_with_retry, LlmProvider};
use crate::llm::types::{split_thinking, Message, Role};
use crate::screen::Observation;
use trajectory::{Conversation, TrajectoryMeta};

const MAX_FORMAT_ATTEMPTS: u32 = 3;
/// Exec-code of a degraded step; distinctive on purpose so it stands out
/// in logs.
pub const DEGRADED_WAIT_SECONDS: f32 = 1.333;

const SYSTEM_PROMPT: &str = "\
You are a desktop automation agent. You are given a task, and on every turn \
a screenshot of the current screen. Decide the single next step that makes \
progress on the task.

Task: {task}

Respond with your reasoning followed by exactly ONE fenced code block \
containing exactly ONE action call. Available actions:

agent.click(description, num_clicks=1, button=\"left\", hold_keys=[])
agent.type(description=None, text=\"...\", overwrite=False, enter=False)
agent.scroll(description, clicks, horizontal=False)
agent.drag_and_drop(start_desc, end_desc, hold_keys=[])
agent.highlight_text_span(start_phrase, end_phrase, button=\"left\")
agent.hotkey([\"ctrl\", \"s\"])
agent.hold_and_press(hold_keys, press_keys)
agent.wait(seconds)
agent.call_code_agent(task=None)
agent.switch_applications(app_code)
agent.open(app_or_filename)
agent.save_to_knowledge([\"note\"])
agent.set_cell_values(values={\"A1\": 1}, app=\"...\", sheet=\"...\")
agent.done()
agent.fail()

Rules:
- Describe UI elements by what a person sees, not by coordinates.
- One action per turn. Use agent.done() only when the task is visibly \
complete, agent.fail() only when it cannot be completed.
- Use agent.call_code_agent for file and data manipulation that is easier \
in code than through the GUI.";

/// A format checker inspects the raw answer text and either accepts it or
/// returns feedback for the retry prompt. Checkers run in order; the first
/// failure aborts the chain.
pub type FormatChecker = fn(&str) -> Result<(), String>;

pub fn check_single_call(answer: &str) -> Result<(), String> {
    let code = parse_code_block(answer).ok_or_else(|| {
        "Your response must end with one fenced code block containing a single \
         agent action call."
            .to_string()
    })?;
    match extract_calls(&code).len() {
        0 => Err("The code block must contain one agent.<verb>(...) call.".to_string()),
        1 => Ok(()),
        n => Err(format!(
            "The code block contains {n} agent calls; emit exactly one."
        )),
    }
}

pub fn check_parses(answer: &str) -> Result<(), String> {
    parse_plan(answer).map(|_| ()).map_err(|e| e.feedback())
}

/// One step's planning output.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// The model's answer text (thoughts stripped).
    pub plan: String,
    pub thoughts: Option<String>,
    /// The extracted call, e.g. `agent.wait(1.0)`.
    pub plan_code: String,
    pub action: AgentAction,
    /// True when the format loop exhausted its retries and the step was
    /// degraded to a short wait.
    pub degraded: bool,
}

pub struct Worker {
    provider: Arc<dyn LlmProvider>,
    conversation: Conversation,
    meta: TrajectoryMeta,
    checkers: Vec<FormatChecker>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl Worker {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        instruction: &str,
        tuning: &AgentTuning,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Self {
        let system = SYSTEM_PROMPT.replace("{task}", instruction);
        Self {
            provider,
            conversation: Conversation::new(Message::text(Role::System, system)),
            meta: TrajectoryMeta {
                turn_count: 0,
                max_trajectory_length: tuning.max_trajectory_length,
                max_images: tuning.max_images,
            },
            checkers: vec![check_single_call, check_parses],
            temperature,
            max_tokens,
        }
    }

    pub fn turn_count(&self) -> u32 {
        self.meta.turn_count
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Generates the next plan for this observation, retrying malformed
    /// responses with feedback up to three times.
    pub async fn predict(
        &mut self,
        observation: &Observation,
        reflection: Option<&str>,
        knowledge: &[String],
        code_report: Option<&CodeAgentReport>,
    ) -> Prediction {
        let mut user = Message {
            role: Role::User,
            parts: Vec::new(),
        };
        let mut sections: Vec<String> = Vec::new();
        if let Some(reflection) = reflection {
            sections.push(format!("Reflection on your recent progress:\n{reflection}"));
        }
        if !knowledge.is_empty() {
            let notes = knowledge
                .iter()
                .map(|n| format!("- {n}"))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("Notes you saved earlier:\n{notes}"));
        }
        if let Some(report) = code_report {
            sections.push(report.render());
        }
        sections.push("Current screenshot:".to_string());
        user.push_text(sections.join("\n\n"));
        user.push_image(observation.grounding_png.clone(), "image/png");
        self.conversation.push(user);

        let mut last_answer = String::new();
        for attempt in 1..=MAX_FORMAT_ATTEMPTS {
            let raw = generate_with_retry(
                &*self.provider,
                &self.conversation.messages,
                self.temperature,
                self.max_tokens,
                true,
            )
            .await;
            let (thoughts, answer) = split_thinking(&raw);

            match self.run_checkers(&answer) {
                Ok(()) => match parse_plan(&answer) {
                    Ok((plan_code, action)) => {
                        self.conversation.push(Message::text(Role::Assistant, raw));
                        self.finish_turn();
                        tracing::info!(
                            turn = self.meta.turn_count,
                            action = action.verb(),
                            "plan accepted"
                        );
                        return Prediction {
                            plan: answer,
                            thoughts,
                            plan_code,
                            action,
                            degraded: false,
                        };
                    }
                    Err(e) => self.push_retry(raw, e.feedback(), attempt),
                },
                Err(feedback) => self.push_retry(raw, feedback, attempt),
            }
            last_answer = answer;
        }

        tracing::warn!(
            turn = self.meta.turn_count,
            "format retries exhausted, degrading step to a short wait"
        );
        self.finish_turn();
        Prediction {
            plan: last_answer,
            thoughts: None,
            plan_code: format!("agent.wait({DEGRADED_WAIT_SECONDS})"),
            action: AgentAction::Wait {
                seconds: DEGRADED_WAIT_SECONDS,
            },
            degraded: true,
        }
    }

    fn run_checkers(&self, answer: &str) -> Result<(), String> {
        for checker in &self.checkers {
            checker(answer)?;
        }
        Ok(())
    }

    fn push_retry(&mut self, raw: String, feedback: String, attempt: u32) {
        tracing::warn!(attempt, feedback = %feedback, "format check failed");
        self.conversation.push(Message::text(Role::Assistant, raw));
        self.conversation.push(Message::text(
            Role::User,
            format!("Your last response was rejected: {feedback}\nTry again."),
        ));
    }

    /// Turn bookkeeping plus the trajectory flush appropriate for the
    /// provider's context profile.
    fn finish_turn(&mut self) {
        self.meta.turn_count += 1;
        if self.provider.long_context() {
            self.conversation.flush_images(self.meta.max_images);
        } else {
            self.conversation
                .flush_rounds(2 * self.meta.max_trajectory_length + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::errors::DeskPilotResult;
    use crate::screen::{encode_png, Frame};
    use image::DynamicImage;

    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
        calls: AtomicU32,
        long_context: bool,
    }

    impl ScriptedProvider {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
                calls: AtomicU32::new(0),
                long_context: true,
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn long_context(&self) -> bool {
            self.long_context
        }

        async fn generate(
            &self,
            _messages: &[Message],
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> DeskPilotResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.responses.lock().unwrap().pop().unwrap_or_default())
        }
    }

    fn observation() -> Observation {
        let img = image::RgbaImage::from_pixel(64, 64, image::Rgba([0, 0, 0, 255]));
        let frame = Frame {
            png: encode_png(&DynamicImage::ImageRgba8(img)).unwrap(),
            width: 64,
            height: 64,
        };
        Observation::from_frame(frame, 1000, 1000).unwrap()
    }

    fn worker(provider: Arc<ScriptedProvider>) -> Worker {
        Worker::new(provider, "test task", &AgentTuning::default(), 0.0, None)
    }

    #[tokio::test]
    async fn accepts_well_formed_plan_on_first_attempt() {
        let provider = ScriptedProvider::new(&["Click it.\n```\nagent.click(\"the button\")\n```"]);
        let mut worker = worker(provider.clone());
        let prediction = worker.predict(&observation(), None, &[], None).await;
        assert!(!prediction.degraded);
        assert_eq!(prediction.plan_code, "agent.click(\"the button\")");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_with_feedback_then_succeeds() {
        let provider = ScriptedProvider::new(&[
            "I think I should click something.",
            "Waiting.\n```\nagent.wait(1.0)\n```",
        ]);
        let mut worker = worker(provider.clone());
        let prediction = worker.predict(&observation(), None, &[], None).await;
        assert!(!prediction.degraded);
        assert_eq!(prediction.action, AgentAction::Wait { seconds: 1.0 });
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        // The failed attempt and its feedback stay in the conversation.
        let texts: Vec<String> = worker
            .conversation()
            .messages
            .iter()
            .map(|m| m.joined_text())
            .collect();
        assert!(texts.iter().any(|t| t.contains("was rejected")));
    }

    #[tokio::test]
    async fn exhausted_retries_degrade_to_wait() {
        let provider = ScriptedProvider::new(&["nope", "still nope", "agent.done() without fences"]);
        let mut worker = worker(provider.clone());
        let prediction = worker.predict(&observation(), None, &[], None).await;
        assert!(prediction.degraded);
        assert_eq!(
            prediction.action,
            AgentAction::Wait {
                seconds: DEGRADED_WAIT_SECONDS
            }
        );
        assert_eq!(prediction.plan_code, "agent.wait(1.333)");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn long_context_flush_caps_images() {
        let responses: Vec<String> = (0..6)
            .map(|_| "ok\n```\nagent.wait(0.1)\n```".to_string())
            .collect();
        let refs: Vec<&str> = responses.iter().map(|s| s.as_str()).collect();
        let provider = ScriptedProvider::new(&refs);
        let mut worker = worker(provider);
        for _ in 0..6 {
            worker.predict(&observation(), None, &[], None).await;
        }
        let max_images = AgentTuning::default().max_images;
        assert!(worker.conversation().total_images() <= max_images);
        // All six user turns are still present as text.
        let user_turns = worker
            .conversation()
            .messages
            .iter()
            .filter(|m| m.role == Role::User && m.joined_text().contains("Current screenshot"))
            .count();
        assert_eq!(user_turns, 6);
    }

    #[tokio::test]
    async fn knowledge_and_reflection_reach_the_prompt() {
        let provider = ScriptedProvider::new(&["ok\n```\nagent.done()\n```"]);
        let mut worker = worker(provider);
        let knowledge = vec!["the file is on the desktop".to_string()];
        worker
            .predict(&observation(), Some("You are on track."), &knowledge, None)
            .await;
        let user_text = worker.conversation().messages[1].joined_text();
        assert!(user_text.contains("You are on track."));
        assert!(user_text.contains("the file is on the desktop"));
    }
}
