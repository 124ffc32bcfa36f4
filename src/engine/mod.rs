pub mod engine;
pub mod history;
pub mod state;

pub use engine::Engine;
pub use state::{AgentState, ControlFlags, TaskOutcome};
