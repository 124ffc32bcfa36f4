use std::time::Duration;

use async_trait::async_trait;

use crate::errors::DeskPilotResult;
use crate::llm::types::Message;

/// Unified multi-turn chat interface. One implementation per vendor plus
/// the local grounding server; the rest of the crate never sees a wire
/// format.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the provider separates reasoning from the answer. When true,
    /// `generate_with_thinking` returns
    /// `<thoughts>…</thoughts>\n<answer>…</answer>`.
    fn supports_thinking(&self) -> bool {
        false
    }

    /// Long-context providers keep full text history and prune only images;
    /// short-context providers drop whole rounds instead.
    fn long_context(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> DeskPilotResult<String>;

    async fn generate_with_thinking(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> DeskPilotResult<String> {
        self.generate(messages, temperature, max_tokens).await
    }
}

const MAX_ATTEMPTS: u32 = 3;
const RETRY_SLEEP: Duration = Duration::from_secs(1);

/// Bounded retry wrapper: up to 3 attempts with a 1 s pause, swallowing
/// transport errors. Exhaustion returns an empty string, which upstream
/// format checking treats as a format failure rather than a crash.
pub async fn generate_with_retry(
    provider: &dyn LlmProvider,
    messages: &[Message],
    temperature: f32,
    max_tokens: Option<u32>,
    thinking: bool,
) -> String {
    for attempt in 1..=MAX_ATTEMPTS {
        let result = if thinking && provider.supports_thinking() {
            provider
                .generate_with_thinking(messages, temperature, max_tokens)
                .await
        } else {
            provider.generate(messages, temperature, max_tokens).await
        };
        match result {
            Ok(text) => return text,
            Err(e) => {
                tracing::warn!(
                    provider = provider.name(),
                    attempt,
                    error = %e,
                    "generation attempt failed"
                );
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(RETRY_SLEEP).await;
                }
            }
        }
    }
    String::new()
}
