use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Lifecycle states of one task run. The loop always re-captures between
/// actions; observations are never reused across steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Capturing,
    Predicting,
    Executing,
    Succeeded,
    Failed,
    BudgetExhausted,
}

/// How a task run ended, mapped to the process exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed { reason: String },
    BudgetExhausted { steps: u32 },
}

impl TaskOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            TaskOutcome::Succeeded => 0,
            TaskOutcome::Failed { .. } => 1,
            TaskOutcome::BudgetExhausted { .. } => 2,
        }
    }
}

/// Cooperative pause/cancel flags. The engine polls them at every phase
/// boundary; an in-flight LLM call or input primitive is always allowed to
/// finish first.
#[derive(Debug, Clone, Default)]
pub struct ControlFlags {
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_exit_codes() {
        assert_eq!(TaskOutcome::Succeeded.exit_code(), 0);
        assert_eq!(
            TaskOutcome::Failed {
                reason: "x".into()
            }
            .exit_code(),
            1
        );
        assert_eq!(TaskOutcome::BudgetExhausted { steps: 15 }.exit_code(), 2);
    }

    #[test]
    fn flags_are_shared_between_clones() {
        let flags = ControlFlags::new();
        let handle = flags.clone();
        handle.pause();
        assert!(flags.is_paused());
        handle.resume();
        handle.cancel();
        assert!(!flags.is_paused());
        assert!(flags.is_cancelled());
    }
}
