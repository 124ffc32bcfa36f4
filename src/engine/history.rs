//! Per-step records and their JSONL session log. Process-local only; task
//! state never survives a restart.

use std::io::Write as _;
use std::path::PathBuf;

use serde::Serialize;

use crate::action::AgentAction;
use crate::errors::DeskPilotResult;

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: u32,
    pub ts: chrono::DateTime<chrono::Utc>,
    /// The model's answer text.
    pub plan: String,
    /// The extracted call, e.g. `agent.click("the button")`.
    pub plan_code: String,
    pub action: AgentAction,
    /// Exec-code rendering of the compiled primitives.
    pub exec_code: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflection_thoughts: Option<String>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SessionHistory {
    pub session_id: String,
    path: Option<PathBuf>,
    records: Vec<StepRecord>,
    written: usize,
}

impl SessionHistory {
    /// `log_dir = None` keeps records in memory only.
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let path = log_dir.map(|dir| dir.join(format!("deskpilot-{session_id}.jsonl")));
        Self {
            session_id,
            path,
            records: Vec::new(),
            written: 0,
        }
    }

    pub fn push(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Appends unwritten records to the JSONL file.
    pub fn flush(&mut self) -> DeskPilotResult<()> {
        let Some(path) = &self.path else {
            self.written = self.records.len();
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        for record in &self.records[self.written..] {
            let line = serde_json::to_string(record)?;
            writeln!(file, "{line}")?;
        }
        self.written = self.records.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(step: u32) -> StepRecord {
        StepRecord {
            step,
            ts: chrono::Utc::now(),
            plan: "plan".into(),
            plan_code: "agent.done()".into(),
            action: AgentAction::Done,
            exec_code: vec![],
            reflection: None,
            reflection_thoughts: None,
            degraded: false,
            error: None,
        }
    }

    #[test]
    fn flush_appends_jsonl_lines() {
        let dir = std::env::temp_dir().join(format!("deskpilot-test-{}", uuid::Uuid::new_v4()));
        let mut history = SessionHistory::new(Some(dir.clone()));
        history.push(record(1));
        history.flush().unwrap();
        history.push(record(2));
        history.flush().unwrap();

        let path = dir.join(format!("deskpilot-{}.jsonl", history.session_id));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn memory_only_history_never_touches_disk() {
        let mut history = SessionHistory::new(None);
        history.push(record(1));
        assert!(history.flush().is_ok());
        assert_eq!(history.records().len(), 1);
    }
}
