//! Subprocess executor for code-agent snippets. Each snippet runs in its
//! own child process with a hard wall-clock limit; the child is killed
//! when the limit elapses.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::process::Command;

use crate::errors::{DeskPilotError, DeskPilotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    Bash,
}

impl Language {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Some(Language::Python),
            "bash" | "sh" | "shell" => Some(Language::Bash),
            _ => None,
        }
    }

    fn interpreter(&self) -> &'static str {
        match self {
            Language::Python => "python3",
            Language::Bash => "bash",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::Bash => "sh",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub language: Language,
    pub code: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ExecutionRecord {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// The fixed report format appended to the code-agent conversation.
    pub fn render(&self) -> String {
        let status = if self.timed_out {
            "TIMEOUT"
        } else if self.succeeded() {
            "SUCCESS"
        } else {
            "FAILED"
        };
        let return_code = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".into());
        format!(
            "Status: {status}\nReturn Code: {return_code}\nOutput:\n{}\nError:\n{}",
            self.stdout, self.stderr
        )
    }
}

pub struct SnippetRunner {
    timeout: Duration,
}

impl SnippetRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn run(&self, language: Language, code: &str) -> DeskPilotResult<ExecutionRecord> {
        let path = std::env::temp_dir().join(format!(
            "deskpilot-{}.{}",
            uuid::Uuid::new_v4(),
            language.extension()
        ));
        tokio::fs::write(&path, code).await?;

        let started = Instant::now();
        let child = Command::new(language.interpreter())
            .arg(&path)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeskPilotError::CodeAgent(format!("spawn {}: {e}", language.interpreter())))?;

        // Dropping the wait future on timeout kills the child via
        // kill_on_drop.
        let record = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => ExecutionRecord {
                language,
                code: code.to_string(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
                timed_out: false,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Ok(Err(e)) => ExecutionRecord {
                language,
                code: code.to_string(),
                stdout: String::new(),
                stderr: format!("wait failed: {e}"),
                exit_code: None,
                timed_out: false,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Err(_) => ExecutionRecord {
                language,
                code: code.to_string(),
                stdout: String::new(),
                stderr: format!("killed after {}s timeout", self.timeout.as_secs()),
                exit_code: None,
                timed_out: true,
                duration_ms: started.elapsed().as_millis() as u64,
            },
        };

        let _ = tokio::fs::remove_file(&path).await;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bash_snippet_captures_stdout_and_status() {
        let runner = SnippetRunner::new(Duration::from_secs(10));
        let record = runner
            .run(Language::Bash, "echo hello\nexit 0\n")
            .await
            .unwrap();
        assert!(record.succeeded());
        assert_eq!(record.stdout.trim(), "hello");
        let rendered = record.render();
        assert!(rendered.starts_with("Status: SUCCESS\nReturn Code: 0\n"));
    }

    #[tokio::test]
    async fn failing_snippet_reports_exit_code() {
        let runner = SnippetRunner::new(Duration::from_secs(10));
        let record = runner
            .run(Language::Bash, "echo oops >&2\nexit 3\n")
            .await
            .unwrap();
        assert!(!record.succeeded());
        assert_eq!(record.exit_code, Some(3));
        assert!(record.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let runner = SnippetRunner::new(Duration::from_millis(200));
        let record = runner.run(Language::Bash, "sleep 30\n").await.unwrap();
        assert!(record.timed_out);
        assert_eq!(record.exit_code, None);
        assert!(record.render().starts_with("Status: TIMEOUT"));
    }

    #[test]
    fn language_tags() {
        assert_eq!(Language::from_tag("python"), Some(Language::Python));
        assert_eq!(Language::from_tag("sh"), Some(Language::Bash));
        assert_eq!(Language::from_tag("rust"), None);
    }
}
