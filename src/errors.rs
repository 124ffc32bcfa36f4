use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeskPilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Grounding error: {0}")]
    Grounding(String),

    #[error("Input primitive error: {0}")]
    Primitive(String),

    #[error("Code agent error: {0}")]
    CodeAgent(String),

    #[error("Step budget exhausted after {steps} steps")]
    BudgetExhausted { steps: u32 },

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Task cancelled")]
    Cancelled,
}

impl DeskPilotError {
    /// Short kind tag used in structured step records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Transport(_) | Self::Http(_) => "transport",
            Self::Format(_) => "format",
            Self::Grounding(_) => "grounding",
            Self::Primitive(_) => "primitive",
            Self::CodeAgent(_) => "code_agent",
            Self::BudgetExhausted { .. } => "budget_exhausted",
            Self::Perception(_) => "perception",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::TomlDe(_) => "toml",
            Self::Cancelled => "cancelled",
        }
    }
}

impl serde::Serialize for DeskPilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type DeskPilotResult<T> = Result<T, DeskPilotError>;
