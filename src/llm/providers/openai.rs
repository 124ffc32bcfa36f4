//! OpenAI-compatible chat-completions adapter. Image parts travel as
//! base64 data URLs inside `image_url` content blocks.

use async_trait::async_trait;
use base64::Engine as _;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{ContentPart, Message};

pub struct OpenAiProvider {
    id: String,
    api_base: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(id: impl Into<String>, api_base: impl Into<String>, api_key: String, model: String) -> Self {
        Self {
            id: id.into(),
            api_base: api_base.into(),
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }
}

pub(crate) fn content_value(parts: &[ContentPart]) -> serde_json::Value {
    // Single text part collapses to a plain string, the common case for
    // text-only turns.
    if let [ContentPart::Text { text }] = parts {
        return serde_json::Value::String(text.clone());
    }
    let blocks: Vec<serde_json::Value> = parts
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => serde_json::json!({ "type": "text", "text": text }),
            ContentPart::Image { data, mime, detail } => {
                let url = format!(
                    "data:{mime};base64,{}",
                    base64::engine::general_purpose::STANDARD.encode(data)
                );
                let mut image_url = serde_json::json!({ "url": url });
                if let Some(detail) = detail {
                    image_url["detail"] = serde_json::Value::String(detail.clone());
                }
                serde_json::json!({ "type": "image_url", "image_url": image_url })
            }
        })
        .collect();
    serde_json::Value::Array(blocks)
}

pub(crate) fn build_body(
    model: &str,
    messages: &[Message],
    temperature: f32,
    max_tokens: Option<u32>,
) -> serde_json::Value {
    let wire_messages: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role.as_str(),
                "content": content_value(&m.parts),
            })
        })
        .collect();
    let mut body = serde_json::json!({
        "model": model,
        "messages": wire_messages,
        "temperature": temperature,
    });
    if let Some(max_tokens) = max_tokens {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }
    body
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn generate(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> DeskPilotResult<String> {
        let body = build_body(&self.model, messages, temperature, max_tokens);

        tracing::debug!(
            provider = %self.id,
            model = %self.model,
            messages = messages.len(),
            images = messages.iter().map(|m| m.image_count()).sum::<usize>(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(DeskPilotError::Transport(format!("{status}: {err_body}")));
        }

        let json: serde_json::Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        tracing::debug!(provider = %self.id, content_len = content.len(), "chat completion received");
        Ok(content)
    }
}
