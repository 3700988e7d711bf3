//! Execution result and streaming event types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exit code reported when the interpreter could not be started.
pub const EXIT_CODE_LAUNCH_FAILED: i32 = -1;

/// Exit code reported when the process was forcibly terminated (deadline or
/// cancellation). Normal exits never produce a negative code.
pub const EXIT_CODE_TERMINATED: i32 = -2;

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The process exited on its own; `exit_code` is meaningful.
    #[default]
    Completed,
    /// The deadline elapsed and the process tree was killed.
    TimedOut,
    /// Cancelled by the caller or by engine shutdown.
    Cancelled,
    /// The interpreter could not be started; `stderr` holds the reason.
    LaunchFailed,
}

/// Result of one invocation.
///
/// Built once, after the process has terminated and both output streams have
/// been drained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code, or one of the `EXIT_CODE_*` sentinels.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error (or the launch failure reason).
    pub stderr: String,
    /// Wall-clock time from launch request to result.
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
    /// How the invocation ended.
    pub outcome: Outcome,
    /// Interpreter process id, if it was launched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl ExecutionResult {
    /// Result for an interpreter that could not be started.
    pub fn launch_failed(reason: String, elapsed: Duration) -> Self {
        Self {
            exit_code: EXIT_CODE_LAUNCH_FAILED,
            stdout: String::new(),
            stderr: reason,
            elapsed,
            outcome: Outcome::LaunchFailed,
            pid: None,
        }
    }

    /// Check if the process exited on its own with code 0.
    pub fn success(&self) -> bool {
        self.outcome == Outcome::Completed && self.exit_code == 0
    }

    /// Check if the invocation failed in any way.
    pub fn failed(&self) -> bool {
        !self.success()
    }

    /// Whether the deadline killed the process.
    pub fn timed_out(&self) -> bool {
        self.outcome == Outcome::TimedOut
    }

    /// Whether the invocation was cancelled.
    pub fn cancelled(&self) -> bool {
        self.outcome == Outcome::Cancelled
    }

    /// Whether the process ran and exited without being killed.
    pub fn completed_normally(&self) -> bool {
        self.outcome == Outcome::Completed
    }

    /// Elapsed time in whole milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }

    /// Get standard output, trimmed.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get standard output lines.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Which output stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl OutputStream {
    /// Short name for logs and thread names.
    pub fn name(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// A piece of output delivered while the process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// Source stream.
    pub stream: OutputStream,
    /// Decoded text. Multi-byte characters are never split across chunks.
    pub text: String,
}

impl OutputChunk {
    /// Create a new output chunk.
    pub fn new(stream: OutputStream, text: impl Into<String>) -> Self {
        Self {
            stream,
            text: text.into(),
        }
    }

    /// Create a stdout chunk.
    pub fn stdout(text: impl Into<String>) -> Self {
        Self::new(OutputStream::Stdout, text)
    }

    /// Create a stderr chunk.
    pub fn stderr(text: impl Into<String>) -> Self {
        Self::new(OutputStream::Stderr, text)
    }

    /// Whether this chunk came from standard error.
    pub fn is_error(&self) -> bool {
        self.stream == OutputStream::Stderr
    }
}

/// Event delivered for an asynchronous invocation.
///
/// Zero or more `Output` events are followed by exactly one `Finished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    /// Incremental output.
    Output(OutputChunk),
    /// Terminal event; no further events follow.
    Finished(ExecutionResult),
}

impl ExecEvent {
    /// Check if this is the terminal event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecEvent::Finished(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_success() {
        let result = ExecutionResult::default();
        assert!(result.success());
        assert!(!result.failed());
        assert!(result.completed_normally());
    }

    #[test]
    fn test_nonzero_exit_failed() {
        let result = ExecutionResult {
            exit_code: 1,
            ..ExecutionResult::default()
        };
        assert!(!result.success());
        assert!(result.failed());
        assert!(result.completed_normally());
    }

    #[test]
    fn test_terminated_sentinel() {
        let result = ExecutionResult {
            exit_code: EXIT_CODE_TERMINATED,
            outcome: Outcome::TimedOut,
            ..ExecutionResult::default()
        };
        assert!(result.timed_out());
        assert!(!result.cancelled());
        assert!(result.failed());
        assert!(!result.completed_normally());
    }

    #[test]
    fn test_launch_failed() {
        let result = ExecutionResult::launch_failed(
            "No such file or directory".into(),
            Duration::from_millis(3),
        );
        assert_eq!(result.exit_code, EXIT_CODE_LAUNCH_FAILED);
        assert_eq!(result.outcome, Outcome::LaunchFailed);
        assert!(result.stderr.contains("No such file"));
        assert!(!result.timed_out());
        assert!(result.pid.is_none());
    }

    #[test]
    fn test_sentinels_distinct() {
        assert_ne!(EXIT_CODE_LAUNCH_FAILED, EXIT_CODE_TERMINATED);
        assert!(EXIT_CODE_LAUNCH_FAILED < 0 && EXIT_CODE_TERMINATED < 0);
    }

    #[test]
    fn test_stdout_helpers() {
        let result = ExecutionResult {
            stdout: "  a\nb\n".into(),
            ..ExecutionResult::default()
        };
        assert_eq!(result.stdout_trimmed(), "a\nb");
        assert_eq!(result.stdout_lines().collect::<Vec<_>>(), vec!["  a", "b"]);
    }

    #[test]
    fn test_json_shape() {
        let result = ExecutionResult {
            stdout: "hello\n".into(),
            elapsed: Duration::from_millis(1500),
            pid: Some(42),
            ..ExecutionResult::default()
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["elapsed_ms"], 1500);
        assert_eq!(value["outcome"], "completed");
        assert_eq!(value["stdout"], "hello\n");
        assert_eq!(value["pid"], 42);

        let back: ExecutionResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_chunk_helpers() {
        assert!(!OutputChunk::stdout("x").is_error());
        assert!(OutputChunk::stderr("x").is_error());
        assert!(ExecEvent::Finished(ExecutionResult::default()).is_terminal());
        assert!(!ExecEvent::Output(OutputChunk::stdout("x")).is_terminal());
    }
}
