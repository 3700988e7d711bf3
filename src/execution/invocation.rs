//! One request to run a command line.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ZrunError;
use crate::shell::ShellKind;
use crate::Result;

/// Deadline applied when none is specified.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A command line plus the settings it runs under.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The command text handed to the interpreter.
    pub command: String,
    /// Interpreter that runs it.
    pub shell: ShellKind,
    /// Deadline; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Working directory override.
    pub working_dir: Option<PathBuf>,
    /// Environment variables layered over the engine's.
    pub env: HashMap<String, String>,
    /// Strip ANSI escapes from the captured text.
    pub strip_ansi: bool,
}

impl Invocation {
    /// Create an invocation for the platform's default shell with the
    /// default timeout.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: ShellKind::default(),
            timeout: Some(DEFAULT_TIMEOUT),
            working_dir: None,
            env: HashMap::new(),
            strip_ansi: false,
        }
    }

    /// Set the shell.
    pub fn shell(mut self, shell: ShellKind) -> Self {
        self.shell = shell;
        self
    }

    /// Set the deadline.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Disable the deadline.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set the deadline in milliseconds; zero or negative disables it.
    pub fn timeout_ms(mut self, millis: i64) -> Self {
        self.timeout = timeout_from_ms(millis);
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add multiple environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Set whether to strip ANSI escapes from the result text.
    pub fn strip_ansi(mut self, strip: bool) -> Self {
        self.strip_ansi = strip;
        self
    }

    /// Reject invocations that can never launch.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(ZrunError::EmptyCommand);
        }
        if self.command.contains('\0') {
            return Err(ZrunError::InvalidCommand(
                "command text contains a NUL byte".into(),
            ));
        }
        Ok(())
    }
}

/// Convert a millisecond timeout, treating zero or negative as "no timeout".
pub fn timeout_from_ms(millis: i64) -> Option<Duration> {
    u64::try_from(millis)
        .ok()
        .filter(|&ms| ms > 0)
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_new() {
        let inv = Invocation::new("ls -la");
        assert_eq!(inv.command, "ls -la");
        assert_eq!(inv.shell, ShellKind::default());
        assert_eq!(inv.timeout, Some(DEFAULT_TIMEOUT));
        assert!(inv.working_dir.is_none());
        assert!(inv.env.is_empty());
        assert!(!inv.strip_ansi);
    }

    #[test]
    fn test_builder_chain() {
        let inv = Invocation::new("cargo build")
            .shell(ShellKind::Bash)
            .working_dir("/project")
            .env("RUST_LOG", "debug")
            .timeout(Duration::from_secs(60))
            .strip_ansi(true);

        assert_eq!(inv.shell, ShellKind::Bash);
        assert_eq!(inv.working_dir, Some(PathBuf::from("/project")));
        assert_eq!(inv.env.get("RUST_LOG"), Some(&"debug".to_string()));
        assert_eq!(inv.timeout, Some(Duration::from_secs(60)));
        assert!(inv.strip_ansi);
    }

    #[test]
    fn test_envs() {
        let inv = Invocation::new("echo").envs([("KEY1", "val1"), ("KEY2", "val2")]);
        assert_eq!(inv.env.len(), 2);
        assert_eq!(inv.env.get("KEY2"), Some(&"val2".to_string()));
    }

    #[test]
    fn test_timeout_ms_sentinels() {
        assert_eq!(Invocation::new("x").timeout_ms(250).timeout, Some(Duration::from_millis(250)));
        assert_eq!(Invocation::new("x").timeout_ms(0).timeout, None);
        assert_eq!(Invocation::new("x").timeout_ms(-1).timeout, None);
        assert_eq!(Invocation::new("x").no_timeout().timeout, None);
    }

    #[test]
    fn test_validate() {
        assert!(Invocation::new("echo hi").validate().is_ok());
        assert!(matches!(
            Invocation::new("   ").validate(),
            Err(ZrunError::EmptyCommand)
        ));
        assert!(matches!(
            Invocation::new("echo \0").validate(),
            Err(ZrunError::InvalidCommand(_))
        ));
    }
}
