//! Error types for zrun.

use thiserror::Error;

use crate::session::InvocationId;

/// Main error type for zrun operations.
///
/// Only conditions detectable before a process is created surface as errors
/// from the execution entry points. Anything that happens after launch is
/// folded into [`ExecutionResult`](crate::ExecutionResult).
#[derive(Error, Debug)]
pub enum ZrunError {
    /// Shell kind outside the recognized set.
    #[error("unsupported shell kind: {0}")]
    UnsupportedShellKind(String),

    /// Command text was empty or whitespace only.
    #[error("command text is empty")]
    EmptyCommand,

    /// Command text cannot be passed as a process argument.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The OS could not create the interpreter process.
    #[error("failed to launch {program}: {reason}")]
    LaunchFailure { program: String, reason: String },

    /// No in-flight asynchronous invocation with this identifier.
    #[error("unknown invocation id: {0}")]
    UnknownInvocationId(InvocationId),

    /// An invocation with this identifier is already registered.
    #[error("invocation already registered: {0}")]
    InvocationExists(InvocationId),

    /// Text could not be parsed as an invocation identifier.
    #[error("malformed invocation id: {0}")]
    InvalidInvocationId(String),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// Event channel closed before a terminal event arrived.
    #[error("event channel closed")]
    ChannelClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience Result type for zrun operations.
pub type Result<T> = std::result::Result<T, ZrunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_shell_display() {
        let err = ZrunError::UnsupportedShellKind("fish".into());
        assert!(err.to_string().contains("unsupported shell kind"));
        assert!(err.to_string().contains("fish"));
    }

    #[test]
    fn test_unknown_invocation_display() {
        let err = ZrunError::UnknownInvocationId(InvocationId::from_raw(7));
        assert!(err.to_string().contains("inv-00000007"));
    }

    #[test]
    fn test_launch_failure_display() {
        let err = ZrunError::LaunchFailure {
            program: "pwsh".into(),
            reason: "No such file or directory".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pwsh"));
        assert!(msg.contains("No such file"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ZrunError = io_err.into();
        assert!(matches!(err, ZrunError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }
}
