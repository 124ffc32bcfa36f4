pub mod parser;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Some(MouseButton::Left),
            "right" => Some(MouseButton::Right),
            "middle" => Some(MouseButton::Middle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// The closed set of verbs the planner model may emit. Every model response
/// must parse to exactly one of these; nothing else is ever executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentAction {
    Click {
        description: String,
        num_clicks: u32,
        button: MouseButton,
        hold_keys: Vec<String>,
    },
    Type {
        description: Option<String>,
        text: String,
        overwrite: bool,
        enter: bool,
    },
    Scroll {
        description: String,
        /// Sign encodes direction: positive scrolls up/left, negative down/right.
        clicks: i32,
        horizontal: bool,
    },
    DragAndDrop {
        start_description: String,
        end_description: String,
        hold_keys: Vec<String>,
    },
    HighlightTextSpan {
        start_phrase: String,
        end_phrase: String,
        button: MouseButton,
    },
    Hotkey {
        keys: Vec<String>,
    },
    HoldAndPress {
        hold_keys: Vec<String>,
        press_keys: Vec<String>,
    },
    Wait {
        seconds: f32,
    },
    Done,
    Fail,
    CallCodeAgent {
        /// None delegates the current task instruction.
        task: Option<String>,
    },
    SwitchApplications {
        app_code: String,
    },
    Open {
        app_or_filename: String,
    },
    SaveToKnowledge {
        notes: Vec<String>,
    },
    SetCellValues {
        values: BTreeMap<String, serde_json::Value>,
        app: String,
        sheet: String,
    },
}

impl AgentAction {
    /// The call-syntax verb, as the model writes it.
    pub fn verb(&self) -> &'static str {
        match self {
            AgentAction::Click { .. } => "click",
            AgentAction::Type { .. } => "type",
            AgentAction::Scroll { .. } => "scroll",
            AgentAction::DragAndDrop { .. } => "drag_and_drop",
            AgentAction::HighlightTextSpan { .. } => "highlight_text_span",
            AgentAction::Hotkey { .. } => "hotkey",
            AgentAction::HoldAndPress { .. } => "hold_and_press",
            AgentAction::Wait { .. } => "wait",
            AgentAction::Done => "done",
            AgentAction::Fail => "fail",
            AgentAction::CallCodeAgent { .. } => "call_code_agent",
            AgentAction::SwitchApplications { .. } => "switch_applications",
            AgentAction::Open { .. } => "open",
            AgentAction::SaveToKnowledge { .. } => "save_to_knowledge",
            AgentAction::SetCellValues { .. } => "set_cell_values",
        }
    }

    /// Terminal actions end the task without emitting primitives.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentAction::Done | AgentAction::Fail)
    }
}
