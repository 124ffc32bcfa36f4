//! The per-task orchestration loop: capture, predict, execute, repeat
//! until a terminal action or the step budget. Pause and cancel are
//! cooperative flags polled at every phase boundary.

use std::time::Duration;

use crate::action::AgentAction;
use crate::engine::history::{SessionHistory, StepRecord};
use crate::engine::state::{AgentState, ControlFlags, TaskOutcome};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::ground::Grounder;
use crate::input::InputBackend;
use crate::reflector::Reflector;
use crate::screen::{Frame, Observation, ScreenSource};
use crate::worker::Worker;

const PAUSE_POLL: Duration = Duration::from_millis(100);
const CAPTURE_RETRY_SLEEP: Duration = Duration::from_millis(500);

pub struct Engine {
    screen: Box<dyn ScreenSource>,
    backend: Box<dyn InputBackend>,
    worker: Worker,
    reflector: Reflector,
    grounder: Grounder,
    flags: ControlFlags,
    history: SessionHistory,
    instruction: String,
    max_steps: u32,
    settle: Duration,
    max_capture_retries: u32,
    canvas_width: u32,
    canvas_height: u32,
    state: AgentState,
}

pub struct EngineParts {
    pub screen: Box<dyn ScreenSource>,
    pub backend: Box<dyn InputBackend>,
    pub worker: Worker,
    pub reflector: Reflector,
    pub grounder: Grounder,
    pub history: SessionHistory,
    pub instruction: String,
    pub max_steps: u32,
    pub settle_seconds: f32,
    pub max_capture_retries: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Engine {
    pub fn new(parts: EngineParts) -> Self {
        Self {
            screen: parts.screen,
            backend: parts.backend,
            worker: parts.worker,
            reflector: parts.reflector,
            grounder: parts.grounder,
            flags: ControlFlags::new(),
            history: parts.history,
            instruction: parts.instruction,
            max_steps: parts.max_steps,
            settle: Duration::from_secs_f32(parts.settle_seconds),
            max_capture_retries: parts.max_capture_retries,
            canvas_width: parts.canvas_width,
            canvas_height: parts.canvas_height,
            state: AgentState::Idle,
        }
    }

    /// Handle the host can use to pause, resume, or cancel the run.
    pub fn control_flags(&self) -> ControlFlags {
        self.flags.clone()
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    pub async fn run(&mut self) -> DeskPilotResult<TaskOutcome> {
        tracing::info!(
            instruction = %self.instruction,
            max_steps = self.max_steps,
            session = %self.history.session_id,
            "task started"
        );
        let mut last_plan: Option<String> = None;
        let mut step = 0u32;

        loop {
            self.checkpoint().await?;
            if step >= self.max_steps {
                self.set_state(AgentState::BudgetExhausted);
                tracing::error!(steps = step, "step budget exhausted");
                return Ok(TaskOutcome::BudgetExhausted { steps: step });
            }

            // ── Capturing ─────────────────────────────────────────────────
            self.set_state(AgentState::Capturing);
            let frame = self.capture_with_retry().await?;
            let observation =
                Observation::from_frame(frame, self.canvas_width, self.canvas_height)?;
            self.grounder.bind_observation(observation.clone());

            // ── Predicting ────────────────────────────────────────────────
            self.checkpoint().await?;
            self.set_state(AgentState::Predicting);
            let reflection = self
                .reflector
                .reflect(last_plan.as_deref(), &observation)
                .await;
            let prediction = self
                .worker
                .predict(
                    &observation,
                    reflection.as_ref().map(|r| r.text.as_str()),
                    self.grounder.knowledge(),
                    self.grounder.last_code_report(),
                )
                .await;
            step += 1;
            last_plan = Some(prediction.plan.clone());

            let mut record = StepRecord {
                step,
                ts: chrono::Utc::now(),
                plan: prediction.plan.clone(),
                plan_code: prediction.plan_code.clone(),
                action: prediction.action.clone(),
                exec_code: Vec::new(),
                reflection: reflection.as_ref().map(|r| r.text.clone()),
                reflection_thoughts: reflection.and_then(|r| r.thoughts),
                degraded: prediction.degraded,
                error: None,
            };

            match &prediction.action {
                AgentAction::Done => {
                    self.finish_step(record);
                    self.set_state(AgentState::Succeeded);
                    tracing::info!(step, "task succeeded");
                    return Ok(TaskOutcome::Succeeded);
                }
                AgentAction::Fail => {
                    self.finish_step(record);
                    self.set_state(AgentState::Failed);
                    tracing::error!(step, "agent declared failure");
                    return Ok(TaskOutcome::Failed {
                        reason: "agent declared the task infeasible".into(),
                    });
                }
                action => {
                    // ── Executing ─────────────────────────────────────────
                    self.checkpoint().await?;
                    let primitives = match self.grounder.compile(action, &self.instruction).await {
                        Ok(primitives) => primitives,
                        Err(e) => {
                            // Grounding and code-agent trouble degrade the
                            // step to a short wait; the next capture drives
                            // recovery.
                            tracing::warn!(step, kind = e.kind(), error = %e, "compile degraded to wait");
                            record.error = Some(format!("{}: {e}", e.kind()));
                            vec![crate::input::Primitive::Sleep {
                                seconds: crate::worker::DEGRADED_WAIT_SECONDS,
                            }]
                        }
                    };
                    record.exec_code = primitives.iter().map(|p| p.describe()).collect();

                    self.set_state(AgentState::Executing);
                    let had_input = !primitives.is_empty();
                    for primitive in &primitives {
                        self.checkpoint().await?;
                        if let Err(e) = self.backend.execute(primitive).await {
                            // Best-effort: log, count the step as executed,
                            // let the next observation show the damage.
                            tracing::error!(step, exec = %primitive.describe(), error = %e, "primitive failed");
                            record.error = Some(format!("primitive: {e}"));
                        }
                    }
                    let was_wait = matches!(action, AgentAction::Wait { .. });
                    self.finish_step(record);
                    if had_input && !was_wait {
                        tokio::time::sleep(self.settle).await;
                    }
                }
            }
        }
    }

    fn set_state(&mut self, state: AgentState) {
        if self.state != state {
            tracing::debug!(?state, "state transition");
            self.state = state;
        }
    }

    fn finish_step(&mut self, record: StepRecord) {
        tracing::info!(
            step = record.step,
            action = record.action.verb(),
            exec = ?record.exec_code,
            degraded = record.degraded,
            error = record.error.as_deref().unwrap_or(""),
            "step executed"
        );
        self.history.push(record);
        if let Err(e) = self.history.flush() {
            tracing::warn!(error = %e, "history flush failed");
        }
    }

    async fn capture_with_retry(&mut self) -> DeskPilotResult<Frame> {
        let mut retries = 0u32;
        loop {
            match self.screen.capture().await {
                Ok(frame) => return Ok(frame),
                Err(e) if retries < self.max_capture_retries => {
                    retries += 1;
                    tracing::warn!(retries, error = %e, "capture failed, retrying");
                    tokio::time::sleep(CAPTURE_RETRY_SLEEP).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Phase-boundary poll for the cooperative pause/cancel flags.
    async fn checkpoint(&self) -> DeskPilotResult<()> {
        loop {
            if self.flags.is_cancelled() {
                return Err(DeskPilotError::Cancelled);
            }
            if !self.flags.is_paused() {
                return Ok(());
            }
            tokio::time::sleep(PAUSE_POLL).await;
        }
    }
}
