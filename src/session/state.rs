//! Lifecycle state of an asynchronous invocation.

use serde::{Deserialize, Serialize};

use crate::execution::{ExecutionResult, Outcome};

/// Observable state of an asynchronous invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncState {
    /// Launching or running.
    #[default]
    Running,
    /// Exited with code 0.
    Completed,
    /// Exited non-zero, or could not be launched.
    Failed,
    /// Killed because the deadline elapsed.
    TimedOut,
    /// Killed on request.
    Cancelled,
}

impl AsyncState {
    /// Terminal state corresponding to a finished result.
    pub fn from_result(result: &ExecutionResult) -> Self {
        match result.outcome {
            Outcome::Completed if result.exit_code == 0 => AsyncState::Completed,
            Outcome::Completed | Outcome::LaunchFailed => AsyncState::Failed,
            Outcome::TimedOut => AsyncState::TimedOut,
            Outcome::Cancelled => AsyncState::Cancelled,
        }
    }

    /// Check if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AsyncState::Running)
    }

    /// Only `Running -> terminal` is a valid transition.
    pub fn can_transition_to(&self, target: AsyncState) -> bool {
        matches!(self, AsyncState::Running) && target.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(outcome: Outcome, exit_code: i32) -> ExecutionResult {
        ExecutionResult {
            exit_code,
            outcome,
            ..ExecutionResult::default()
        }
    }

    #[test]
    fn test_from_result() {
        assert_eq!(
            AsyncState::from_result(&result(Outcome::Completed, 0)),
            AsyncState::Completed
        );
        assert_eq!(
            AsyncState::from_result(&result(Outcome::Completed, 2)),
            AsyncState::Failed
        );
        assert_eq!(
            AsyncState::from_result(&ExecutionResult::launch_failed("nope".into(), Duration::ZERO)),
            AsyncState::Failed
        );
        assert_eq!(
            AsyncState::from_result(&result(Outcome::TimedOut, -2)),
            AsyncState::TimedOut
        );
        assert_eq!(
            AsyncState::from_result(&result(Outcome::Cancelled, -2)),
            AsyncState::Cancelled
        );
    }

    #[test]
    fn test_transitions() {
        assert!(AsyncState::Running.can_transition_to(AsyncState::Completed));
        assert!(AsyncState::Running.can_transition_to(AsyncState::Cancelled));
        assert!(!AsyncState::Running.can_transition_to(AsyncState::Running));
        assert!(!AsyncState::Completed.can_transition_to(AsyncState::Failed));
        assert!(!AsyncState::Cancelled.can_transition_to(AsyncState::TimedOut));
    }

    #[test]
    fn test_default_is_running() {
        assert_eq!(AsyncState::default(), AsyncState::Running);
        assert!(!AsyncState::Running.is_terminal());
        assert!(AsyncState::TimedOut.is_terminal());
    }
}
