//! Configuration management for zrun.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::error::ZrunError;
use crate::execution::{EngineConfig, Invocation};
use crate::shell::{ShellKind, DEFAULT_EXECUTION_POLICY};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-invocation defaults.
    pub execution: ExecutionSection,
    /// Process supervision timing.
    pub process: ProcessSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Execution configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Shell used when none is given.
    pub shell: ShellKind,
    /// Deadline in milliseconds; zero or negative disables it.
    pub timeout_ms: i64,
    /// Working directory for every command.
    pub working_dir: Option<PathBuf>,
    /// Environment variables for every command.
    pub env: HashMap<String, String>,
    /// Start from the parent's environment. When false the interpreter sees
    /// only `env`.
    pub inherit_env: bool,
    /// PowerShell execution policy.
    pub execution_policy: String,
    /// Strip ANSI escapes from captured output.
    pub strip_ansi: bool,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            shell: ShellKind::default(),
            timeout_ms: 30_000,
            working_dir: None,
            env: HashMap::new(),
            inherit_env: true,
            execution_policy: DEFAULT_EXECUTION_POLICY.to_string(),
            strip_ansi: false,
        }
    }
}

/// Process supervision section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSection {
    /// Time a tree gets to exit after a stop request before it is killed.
    pub grace_period_ms: u64,
    /// Time to keep reading output after the interpreter exits.
    pub drain_timeout_ms: u64,
    /// Exit polling interval.
    pub poll_interval_ms: u64,
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self {
            grace_period_ms: 2000,
            drain_timeout_ms: 1000,
            poll_interval_ms: 10,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(shell) = var("ZRUN_SHELL") {
            self.execution.shell = shell
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ZRUN_SHELL", shell))?;
        }

        if let Some(timeout) = var("ZRUN_TIMEOUT_MS") {
            self.execution.timeout_ms = timeout
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ZRUN_TIMEOUT_MS", timeout))?;
        }

        if let Some(dir) = var("ZRUN_WORKING_DIR") {
            if !dir.is_empty() {
                self.execution.working_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(level) = var("ZRUN_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(shell) = args.shell {
            self.execution.shell = shell;
        }

        if let Some(timeout) = args.timeout_ms {
            self.execution.timeout_ms = timeout;
        }

        if let Some(ref dir) = args.cwd {
            self.execution.working_dir = Some(dir.clone());
        }

        for (key, value) in &args.env {
            self.execution.env.insert(key.clone(), value.clone());
        }

        if args.strip_ansi {
            self.execution.strip_ansi = true;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env()?;
        config.apply_args(args);

        Ok(config)
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            grace_period: Duration::from_millis(self.process.grace_period_ms),
            drain_timeout: Duration::from_millis(self.process.drain_timeout_ms),
            poll_interval: Duration::from_millis(self.process.poll_interval_ms.max(1)),
            execution_policy: self.execution.execution_policy.clone(),
            working_dir: self.execution.working_dir.clone(),
            env: self.execution.env.clone(),
            inherit_env: self.execution.inherit_env,
            strip_ansi: self.execution.strip_ansi,
        }
    }

    /// An invocation of `command` with the configured shell and deadline.
    pub fn invocation(&self, command: impl Into<String>) -> Invocation {
        Invocation::new(command)
            .shell(self.execution.shell)
            .timeout_ms(self.execution.timeout_ms)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Environment variable with an unusable value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidValue(name, value) => write!(f, "invalid value for {}: '{}'", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for ZrunError {
    fn from(e: ConfigError) -> Self {
        ZrunError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.execution.shell, ShellKind::platform_default());
        assert_eq!(config.execution.timeout_ms, 30_000);
        assert!(config.execution.inherit_env);
        assert_eq!(config.execution.execution_policy, "Bypass");
        assert_eq!(config.process.grace_period_ms, 2000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "execution": {
                "shell": "bash",
                "timeout_ms": 0,
                "working_dir": "/srv",
                "env": { "MODE": "ci" },
                "inherit_env": false
            },
            "process": {
                "grace_period_ms": 500
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.execution.shell, ShellKind::Bash);
        assert_eq!(config.execution.timeout_ms, 0);
        assert_eq!(config.execution.working_dir, Some(PathBuf::from("/srv")));
        assert_eq!(config.execution.env["MODE"], "ci");
        assert!(!config.execution.inherit_env);
        assert_eq!(config.process.grace_period_ms, 500);
        assert_eq!(config.process.drain_timeout_ms, 1000); // Default
    }

    #[test]
    fn test_config_bad_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
        let err: ZrunError = err.into();
        assert!(matches!(err, ZrunError::Config(_)));
    }

    #[test]
    fn test_apply_env() {
        let mut config = Config::default();
        config
            .apply_env_from(vars(&[
                ("ZRUN_SHELL", "cmd"),
                ("ZRUN_TIMEOUT_MS", " 250 "),
                ("ZRUN_WORKING_DIR", "/work"),
                ("ZRUN_LOG_LEVEL", "debug"),
                ("RUST_LOG", "trace"),
            ]))
            .unwrap();

        assert_eq!(config.execution.shell, ShellKind::Cmd);
        assert_eq!(config.execution.timeout_ms, 250);
        assert_eq!(config.execution.working_dir, Some(PathBuf::from("/work")));
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_rust_log_fallback() {
        let mut config = Config::default();
        config.apply_env_from(vars(&[("RUST_LOG", "warn")])).unwrap();
        assert_eq!(config.log_filter(), "warn");
    }

    #[test]
    fn test_apply_env_invalid() {
        let mut config = Config::default();
        let err = config
            .apply_env_from(vars(&[("ZRUN_SHELL", "zsh")]))
            .unwrap_err();
        assert!(err.to_string().contains("ZRUN_SHELL"));

        assert!(config
            .apply_env_from(vars(&[("ZRUN_TIMEOUT_MS", "later")]))
            .is_err());
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.execution.env.insert("KEEP".into(), "1".into());
        let args = Args {
            shell: Some(ShellKind::Bash),
            timeout_ms: Some(-1),
            cwd: Some(PathBuf::from("/tmp")),
            env: vec![("ADDED".into(), "2".into())],
            strip_ansi: true,
            log_level: Some("trace".into()),
            ..Args::default()
        };

        config.apply_args(&args);

        assert_eq!(config.execution.shell, ShellKind::Bash);
        assert_eq!(config.execution.timeout_ms, -1);
        assert_eq!(config.execution.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(config.execution.env.len(), 2);
        assert!(config.execution.strip_ansi);
        assert_eq!(config.log_filter(), "trace");
    }

    #[test]
    fn test_args_beat_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{ "execution": { "timeout_ms": 1000, "shell": "cmd" } }"#)
            .unwrap();

        let args = Args {
            config: Some(file.path().to_path_buf()),
            shell: Some(ShellKind::Bash),
            ..Args::default()
        };
        let mut config = Config::from_file(file.path()).unwrap();
        config.apply_args(&args);

        assert_eq!(config.execution.shell, ShellKind::Bash);
        assert_eq!(config.execution.timeout_ms, 1000);
    }

    #[test]
    fn test_engine_config() {
        let mut config = Config::default();
        config.process.poll_interval_ms = 0;
        config.execution.inherit_env = false;

        let engine = config.engine_config();
        assert_eq!(engine.grace_period, Duration::from_secs(2));
        assert_eq!(engine.drain_timeout, Duration::from_secs(1));
        assert_eq!(engine.poll_interval, Duration::from_millis(1));
        assert!(!engine.inherit_env);
    }

    #[test]
    fn test_invocation_defaults() {
        let mut config = Config::default();
        config.execution.shell = ShellKind::Bash;
        config.execution.timeout_ms = 0;

        let invocation = config.invocation("ls");
        assert_eq!(invocation.shell, ShellKind::Bash);
        assert!(invocation.timeout.is_none());

        config.execution.timeout_ms = 1500;
        assert_eq!(
            config.invocation("ls").timeout,
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"timeout_ms\""));
        assert!(json.contains("\"grace_period_ms\""));
    }
}
