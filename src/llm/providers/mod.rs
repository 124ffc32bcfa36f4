pub mod anthropic;
pub mod local;
pub mod openai;

use std::sync::Arc;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::LlmProvider;

pub use anthropic::AnthropicProvider;
pub use local::{GroundingReply, LocalGroundingClient};
pub use openai::OpenAiProvider;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Builds a provider from its CLI/config name. API keys come from the
/// environment; a missing key is a startup configuration error.
pub fn create_provider(name: &str, model: &str) -> DeskPilotResult<Arc<dyn LlmProvider>> {
    match name {
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
                DeskPilotError::Config("OPENAI_API_KEY is not set".into())
            })?;
            Ok(Arc::new(OpenAiProvider::new(
                "openai",
                OPENAI_API_BASE,
                api_key,
                model.to_string(),
            )))
        }
        "anthropic" => {
            let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
                DeskPilotError::Config("ANTHROPIC_API_KEY is not set".into())
            })?;
            Ok(Arc::new(AnthropicProvider::new(api_key, model.to_string())))
        }
        other => Err(DeskPilotError::Config(format!(
            "unknown provider '{other}' (expected openai|anthropic)"
        ))),
    }
}
