//! Anthropic messages-API adapter. Image parts travel as
//! `{type: base64, media_type, data}` source blocks; the system prompt is
//! lifted out of the message list into the top-level `system` field.

use async_trait::async_trait;
use base64::Engine as _;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{ContentPart, Message, Role};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const THINKING_BUDGET_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    async fn request(&self, body: serde_json::Value) -> DeskPilotResult<serde_json::Value> {
        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(DeskPilotError::Transport(format!("{status}: {err_body}")));
        }
        Ok(response.json().await?)
    }
}

fn content_blocks(parts: &[ContentPart]) -> Vec<serde_json::Value> {
    parts
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => serde_json::json!({ "type": "text", "text": text }),
            ContentPart::Image { data, mime, .. } => serde_json::json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": mime,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                },
            }),
        })
        .collect()
}

pub(crate) fn build_body(
    model: &str,
    messages: &[Message],
    temperature: f32,
    max_tokens: Option<u32>,
    thinking: bool,
) -> serde_json::Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .flat_map(|m| m.parts.iter())
        .filter_map(|p| match p {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    let wire_messages: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            serde_json::json!({
                "role": m.role.as_str(),
                "content": content_blocks(&m.parts),
            })
        })
        .collect();

    let mut body = serde_json::json!({
        "model": model,
        "messages": wire_messages,
        "max_tokens": max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });
    if !system.is_empty() {
        body["system"] = serde_json::Value::String(system.join("\n\n"));
    }
    if thinking {
        // Thinking requires temperature 1 and an explicit budget.
        body["thinking"] = serde_json::json!({
            "type": "enabled",
            "budget_tokens": THINKING_BUDGET_TOKENS,
        });
        body["temperature"] = serde_json::json!(1.0);
        let floor = THINKING_BUDGET_TOKENS + DEFAULT_MAX_TOKENS;
        if body["max_tokens"].as_u64().unwrap_or(0) < floor as u64 {
            body["max_tokens"] = serde_json::json!(floor);
        }
    } else {
        body["temperature"] = serde_json::json!(temperature);
    }
    body
}

fn collect_blocks(json: &serde_json::Value, block_type: &str, field: &str) -> String {
    json["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == block_type)
                .filter_map(|b| b[field].as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn supports_thinking(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> DeskPilotResult<String> {
        let body = build_body(&self.model, messages, temperature, max_tokens, false);
        let json = self.request(body).await?;
        Ok(collect_blocks(&json, "text", "text"))
    }

    async fn generate_with_thinking(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> DeskPilotResult<String> {
        let body = build_body(&self.model, messages, temperature, max_tokens, true);
        let json = self.request(body).await?;
        let thoughts = collect_blocks(&json, "thinking", "thinking");
        let answer = collect_blocks(&json, "text", "text");
        Ok(format!("<thoughts>{thoughts}</thoughts>\n<answer>{answer}</answer>"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_lifted_out() {
        let messages = [
            Message::text(Role::System, "you are an agent"),
            Message::text(Role::User, "go"),
        ];
        let body = build_body("m", &messages, 0.0, None, false);
        assert_eq!(body["system"], "you are an agent");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn image_part_becomes_base64_source() {
        let mut msg = Message::text(Role::User, "see");
        msg.push_image(vec![9u8, 9, 9], "image/png");
        let body = build_body("m", &[msg], 0.0, None, false);
        let blocks = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(blocks[1]["type"], "image");
        assert_eq!(blocks[1]["source"]["type"], "base64");
        assert_eq!(blocks[1]["source"]["media_type"], "image/png");
    }

    #[test]
    fn thinking_sets_budget_and_raises_cap() {
        let body = build_body("m", &[Message::text(Role::User, "go")], 0.0, Some(100), true);
        assert_eq!(body["thinking"]["type"], "enabled");
        assert!(body["max_tokens"].as_u64().unwrap() > THINKING_BUDGET_TOKENS as u64);
    }
}
