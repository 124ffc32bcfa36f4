//! Client for the auxiliary grounding-model server: a local HTTP endpoint
//! exposing `POST /grounding/generate` (prompt + base64 image in,
//! response text + parsed coordinates out) and `GET /health`.

use base64::Engine as _;
use serde::Deserialize;

use crate::errors::{DeskPilotError, DeskPilotResult};

#[derive(Debug, Clone, Deserialize)]
pub struct GroundingReply {
    pub response: String,
    /// First two integers found in the model text, or None when the model
    /// produced no usable point.
    pub coordinates: Option<(i32, i32)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthReply {
    pub status: String,
    #[serde(default)]
    pub model: String,
}

pub struct LocalGroundingClient {
    base_url: String,
    client: reqwest::Client,
}

impl LocalGroundingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub async fn health(&self) -> DeskPilotResult<HealthReply> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeskPilotError::Transport(format!(
                "grounding server health: {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    pub async fn generate(&self, prompt: &str, image_png: &[u8]) -> DeskPilotResult<GroundingReply> {
        // The server binds `prompt` and `image` from the query string, not
        // a JSON body.
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_png);
        let response = self
            .client
            .post(format!("{}/grounding/generate", self.base_url))
            .query(&[("prompt", prompt), ("image", encoded.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(DeskPilotError::Transport(format!(
                "grounding server: {status}: {err_body}"
            )));
        }
        Ok(response.json().await?)
    }
}
