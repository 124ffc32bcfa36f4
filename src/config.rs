use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};

/// Host platform the grounder compiles `Open`/`SwitchApplications` for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Darwin,
    Linux,
    Windows,
}

impl Platform {
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::Darwin,
            "windows" => Platform::Windows,
            _ => Platform::Linux,
        }
    }

    pub fn parse(s: &str) -> DeskPilotResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "darwin" | "macos" => Ok(Platform::Darwin),
            "linux" => Ok(Platform::Linux),
            "windows" => Ok(Platform::Windows),
            other => Err(DeskPilotError::Config(format!(
                "unknown platform '{other}' (expected darwin|linux|windows)"
            ))),
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::detect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub grounding: GroundingConfig,
    #[serde(default)]
    pub agent: AgentTuning,
    #[serde(default)]
    pub coder: CoderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai" or "anthropic".
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Max tokens per planning call; None lets the provider decide.
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingConfig {
    /// "openai", "anthropic", or "local" (auxiliary grounding server).
    #[serde(default = "default_ground_provider")]
    pub provider: String,
    #[serde(default = "default_ground_model")]
    pub model: String,
    /// Base URL for the local grounding server; env GROUNDING_URL overrides.
    #[serde(default = "default_ground_url")]
    pub url: String,
    /// Canvas resolution the grounding model returns coordinates in.
    #[serde(default = "default_canvas")]
    pub width: u32,
    #[serde(default = "default_canvas")]
    pub height: u32,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            provider: default_ground_provider(),
            model: default_ground_model(),
            url: default_ground_url(),
            width: default_canvas(),
            height: default_canvas(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTuning {
    #[serde(default)]
    pub platform: Platform,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Image parts retained by the long-context trajectory flush.
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    /// Rounds retained by the short-context trajectory flush.
    #[serde(default = "default_max_trajectory_length")]
    pub max_trajectory_length: usize,
    /// Upper bound applied to `agent.wait(seconds)`.
    #[serde(default = "default_max_wait_seconds")]
    pub max_wait_seconds: f32,
    /// Pause after each executed action before the next capture.
    #[serde(default = "default_settle_seconds")]
    pub settle_seconds: f32,
    /// Wheel ticks emitted per scroll "click" requested by the model.
    #[serde(default = "default_scroll_unit")]
    pub scroll_unit: i32,
    #[serde(default = "default_capture_retries")]
    pub max_capture_retries: u32,
    /// Punctuation kept (besides alphabetic chars) when cleaning OCR text.
    #[serde(default = "default_ocr_keep_chars")]
    pub ocr_keep_chars: String,
    /// Directory for the session JSONL log; None disables persistence.
    pub log_dir: Option<PathBuf>,
}

impl Default for AgentTuning {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            max_steps: default_max_steps(),
            max_images: default_max_images(),
            max_trajectory_length: default_max_trajectory_length(),
            max_wait_seconds: default_max_wait_seconds(),
            settle_seconds: default_settle_seconds(),
            scroll_unit: default_scroll_unit(),
            max_capture_retries: default_capture_retries(),
            ocr_keep_chars: default_ocr_keep_chars(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoderConfig {
    #[serde(default = "default_coder_budget")]
    pub budget: u32,
    /// Per-snippet wall clock limit in seconds.
    #[serde(default = "default_coder_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for CoderConfig {
    fn default() -> Self {
        Self {
            budget: default_coder_budget(),
            timeout_seconds: default_coder_timeout(),
            temperature: default_temperature(),
        }
    }
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_ground_provider() -> String {
    "local".into()
}
fn default_ground_model() -> String {
    "tgi".into()
}
fn default_ground_url() -> String {
    std::env::var("GROUNDING_URL").unwrap_or_else(|_| "http://localhost:8080".into())
}
fn default_canvas() -> u32 {
    1000
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_steps() -> u32 {
    15
}
fn default_max_images() -> usize {
    3
}
fn default_max_trajectory_length() -> usize {
    8
}
fn default_max_wait_seconds() -> f32 {
    60.0
}
fn default_settle_seconds() -> f32 {
    0.5
}
fn default_scroll_unit() -> i32 {
    1
}
fn default_capture_retries() -> u32 {
    3
}
fn default_ocr_keep_chars() -> String {
    " .,!?;:-+".into()
}
fn default_coder_budget() -> u32 {
    20
}
fn default_coder_timeout() -> u64 {
    30
}

/// Returns the path to an existing deskpilot.toml, preferring the directory
/// next to the executable over the working directory.
fn find_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("deskpilot.toml");
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    let candidate = std::env::current_dir().ok()?.join("deskpilot.toml");
    candidate.exists().then_some(candidate)
}

/// Loads deskpilot.toml if present; every field is defaulted, so a missing
/// file yields the default configuration rather than an error.
pub fn load_config() -> DeskPilotResult<AppConfig> {
    match find_config_path() {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config: AppConfig = toml::from_str(&content)?;
            tracing::info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => {
            tracing::debug!("no deskpilot.toml found, using defaults");
            Ok(AppConfig::default())
        }
    }
}
