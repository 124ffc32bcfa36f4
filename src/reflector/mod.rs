//! Advisory trajectory critic. Each step it reads the worker's latest plan
//! against the fresh screenshot and answers with one of three verdicts:
//! on plan, off plan / cycling, or task complete. Its text is spliced into
//! the next worker prompt; it never terminates the loop by itself.

use std::sync::Arc;

use crate::config::AgentTuning;
use crate::llm::provider::{generate_with_retry, LlmProvider};
use crate::llm::types::{split_thinking, Message, Role};
use crate::screen::Observation;
use crate::worker::trajectory::{Conversation, TrajectoryMeta};

const SYSTEM_PROMPT: &str = "\
You are watching a desktop automation agent work on the following task:

{task}

Each turn you see the agent's latest plan and the screenshot that followed \
it. Judge the trajectory and answer with exactly one of:
1. The agent is making progress. Say so briefly and do NOT suggest any \
concrete next action.
2. The agent has gone off track or is repeating itself. Explain what went \
wrong, without prescribing the next action.
3. The task is already complete. Say so.

Be factual and terse.";

#[derive(Debug, Clone)]
pub struct Reflection {
    pub text: String,
    pub thoughts: Option<String>,
}

pub struct Reflector {
    provider: Arc<dyn LlmProvider>,
    conversation: Conversation,
    meta: TrajectoryMeta,
    temperature: f32,
}

impl Reflector {
    pub fn new(provider: Arc<dyn LlmProvider>, instruction: &str, tuning: &AgentTuning) -> Self {
        let system = SYSTEM_PROMPT.replace("{task}", instruction);
        Self {
            provider,
            conversation: Conversation::new(Message::text(Role::System, system)),
            meta: TrajectoryMeta {
                turn_count: 0,
                max_trajectory_length: tuning.max_trajectory_length,
                max_images: tuning.max_images,
            },
            temperature: 0.0,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Turn 0 only registers the initial screenshot; critique starts once
    /// there is a plan to judge.
    pub async fn reflect(
        &mut self,
        latest_plan: Option<&str>,
        observation: &Observation,
    ) -> Option<Reflection> {
        let mut user = Message {
            role: Role::User,
            parts: Vec::new(),
        };

        let result = match (self.meta.turn_count, latest_plan) {
            (0, _) | (_, None) => {
                user.push_text("Initial screen state for the task:");
                user.push_image(observation.grounding_png.clone(), "image/png");
                self.conversation.push(user);
                None
            }
            (_, Some(plan)) => {
                user.push_text(format!(
                    "The agent's latest plan:\n{plan}\n\nThe screen now looks like this:"
                ));
                user.push_image(observation.grounding_png.clone(), "image/png");
                self.conversation.push(user);

                let raw = generate_with_retry(
                    &*self.provider,
                    &self.conversation.messages,
                    self.temperature,
                    None,
                    true,
                )
                .await;
                if raw.is_empty() {
                    tracing::warn!("reflector returned nothing, skipping critique this step");
                    None
                } else {
                    let (thoughts, text) = split_thinking(&raw);
                    self.conversation
                        .push(Message::text(Role::Assistant, raw));
                    Some(Reflection { text, thoughts })
                }
            }
        };

        self.meta.turn_count += 1;
        if self.provider.long_context() {
            self.conversation.flush_images(self.meta.max_images);
        } else {
            self.conversation
                .flush_rounds(self.meta.max_trajectory_length + 1);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::Mutex;

    use super::*;
    use crate::errors::DeskPilotResult;
    use crate::screen::{encode_png, Frame};
    use image::DynamicImage;

    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            })
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

    fn observation() -> Observation {
        let img = image::RgbaImage::from_pixel(32, 32, image::Rgba([0, 0, 0, 255]));
        let frame = Frame {
            png: encode_png(&DynamicImage::ImageRgba8(img)).unwrap(),
            width: 32,
            height: 32,
        };
        Observation::from_frame(frame, 1000, 1000).unwrap()
    }

    #[tokio::test]
    async fn turn_zero_registers_without_critique() {
        let provider = ScriptedProvider::new(&["should not be called"]);
        let mut reflector = Reflector::new(provider, "task", &AgentTuning::default());
        let reflection = reflector.reflect(None, &observation()).await;
        assert!(reflection.is_none());
        assert_eq!(reflector.conversation().messages.len(), 2);
    }

    #[tokio::test]
    async fn later_turns_produce_critique() {
        let provider = ScriptedProvider::new(&["The agent is making progress."]);
        let mut reflector = Reflector::new(provider, "task", &AgentTuning::default());
        reflector.reflect(None, &observation()).await;
        let reflection = reflector
            .reflect(Some("I clicked the button."), &observation())
            .await
            .unwrap();
        assert_eq!(reflection.text, "The agent is making progress.");
        assert!(reflection.thoughts.is_none());
    }
}
