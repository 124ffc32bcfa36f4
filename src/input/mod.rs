//! Low-level input primitives and the backend boundary.
//!
//! The grounder compiles every [`AgentAction`] into a sequence of
//! [`Primitive`]s; an [`InputBackend`] is the only component that turns
//! those into OS input events. Primitives act at pixel coordinates and are
//! best-effort: they have no notion of UI elements and never fail because
//! a target is "not present".

use async_trait::async_trait;
use serde::Serialize;

use crate::action::MouseButton;
use crate::errors::DeskPilotResult;

/// Keys treated as modifiers by the hotkey partition. Everything else is a
/// regular key.
pub const MODIFIER_KEYS: &[&str] = &[
    "shift", "ctrl", "control", "cmd", "command", "alt", "option", "win", "super", "meta",
];

pub fn is_modifier(key: &str) -> bool {
    MODIFIER_KEYS.contains(&key.to_ascii_lowercase().as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KeyEvent {
    Down { key: String },
    Up { key: String },
}

/// Expands a hotkey into its exact key event sequence: modifiers down in
/// the given order, regular keys down in order, regular keys up in reverse,
/// modifiers up in reverse. The regular-key press in the middle is load
/// bearing; a chord that only toggles modifiers does nothing.
pub fn expand_hotkey(keys: &[String]) -> Vec<KeyEvent> {
    let (modifiers, regulars): (Vec<&String>, Vec<&String>) =
        keys.iter().partition(|k| is_modifier(k));

    let mut events = Vec::with_capacity(keys.len() * 2);
    for key in &modifiers {
        events.push(KeyEvent::Down { key: (*key).clone() });
    }
    for key in &regulars {
        events.push(KeyEvent::Down { key: (*key).clone() });
    }
    for key in regulars.iter().rev() {
        events.push(KeyEvent::Up { key: (*key).clone() });
    }
    for key in modifiers.iter().rev() {
        events.push(KeyEvent::Up { key: (*key).clone() });
    }
    events
}

/// One low-level input command. Produced by the grounder's compilation
/// table and consumed immediately by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Primitive {
    Click {
        x: i32,
        y: i32,
        count: u32,
        button: MouseButton,
    },
    Drag {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration: f32,
        button: MouseButton,
    },
    TypeText {
        text: String,
    },
    PressEnter,
    PressBackspace,
    KeyDown {
        key: String,
    },
    KeyUp {
        key: String,
    },
    Hotkey {
        keys: Vec<String>,
    },
    Scroll {
        x: i32,
        y: i32,
        ticks: i32,
        horizontal: bool,
    },
    ClipboardSet {
        text: String,
    },
    Sleep {
        seconds: f32,
    },
}

impl Primitive {
    /// Exec-code rendering used in step records and logs.
    pub fn describe(&self) -> String {
        match self {
            Primitive::Click { x, y, count, button } => {
                format!("CLICK({x}, {y}, clicks={count}, button={})", button.as_str())
            }
            Primitive::Drag {
                x1,
                y1,
                x2,
                y2,
                duration,
                button,
            } => format!(
                "DRAG({x1}, {y1} -> {x2}, {y2}, duration={duration}, button={})",
                button.as_str()
            ),
            Primitive::TypeText { text } => format!("TYPE({text:?})"),
            Primitive::PressEnter => "PRESS_ENTER()".into(),
            Primitive::PressBackspace => "PRESS_BACKSPACE()".into(),
            Primitive::KeyDown { key } => format!("KEY_DOWN({key})"),
            Primitive::KeyUp { key } => format!("KEY_UP({key})"),
            Primitive::Hotkey { keys } => format!("HOTKEY({})", keys.join(",")),
            Primitive::Scroll {
                x,
                y,
                ticks,
                horizontal,
            } => format!("SCROLL({x}, {y}, ticks={ticks}, horizontal={horizontal})"),
            Primitive::ClipboardSet { text } => format!("CLIPBOARD_SET({text:?})"),
            Primitive::Sleep { seconds } => format!("WAIT({seconds:?})"),
        }
    }
}

/// The single seam between the agent and the OS input subsystem. Hosts
/// supply a concrete implementation; the crate ships [`NullBackend`] for
/// dry runs and a recording double for tests.
#[async_trait]
pub trait InputBackend: Send + Sync {
    async fn execute(&mut self, primitive: &Primitive) -> DeskPilotResult<()>;
}

/// Logs every primitive instead of synthesizing events. `Sleep` still
/// sleeps so step pacing matches a real backend.
pub struct NullBackend;

#[async_trait]
impl InputBackend for NullBackend {
    async fn execute(&mut self, primitive: &Primitive) -> DeskPilotResult<()> {
        match primitive {
            Primitive::Sleep { seconds } => {
                tokio::time::sleep(std::time::Duration::from_secs_f32(*seconds)).await;
            }
            Primitive::Hotkey { keys } => {
                tracing::info!(exec = %primitive.describe(), events = ?expand_hotkey(keys), "dry-run primitive");
            }
            other => {
                tracing::info!(exec = %other.describe(), "dry-run primitive");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn hotkey_cmd_space_sequence() {
        let events = expand_hotkey(&keys(&["cmd", "space"]));
        assert_eq!(
            events,
            vec![
                KeyEvent::Down { key: "cmd".into() },
                KeyEvent::Down { key: "space".into() },
                KeyEvent::Up { key: "space".into() },
                KeyEvent::Up { key: "cmd".into() },
            ]
        );
    }

    #[test]
    fn hotkey_ctrl_shift_t_sequence() {
        let events = expand_hotkey(&keys(&["ctrl", "shift", "t"]));
        assert_eq!(
            events,
            vec![
                KeyEvent::Down { key: "ctrl".into() },
                KeyEvent::Down { key: "shift".into() },
                KeyEvent::Down { key: "t".into() },
                KeyEvent::Up { key: "t".into() },
                KeyEvent::Up { key: "shift".into() },
                KeyEvent::Up { key: "ctrl".into() },
            ]
        );
    }

    #[test]
    fn modifier_order_is_preserved_regardless_of_position() {
        let events = expand_hotkey(&keys(&["a", "ctrl"]));
        assert_eq!(
            events,
            vec![
                KeyEvent::Down { key: "ctrl".into() },
                KeyEvent::Down { key: "a".into() },
                KeyEvent::Up { key: "a".into() },
                KeyEvent::Up { key: "ctrl".into() },
            ]
        );
    }

    #[test]
    fn wait_primitive_exec_code() {
        let sleep = Primitive::Sleep { seconds: 1.333 };
        assert_eq!(sleep.describe(), "WAIT(1.333)");
    }
}
