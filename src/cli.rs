//! Command-line interface for zrun.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::execution::{ExecutionResult, Outcome};
use crate::shell::ShellKind;

/// Exit status when the deadline elapsed (same as coreutils `timeout`).
pub const EXIT_TIMED_OUT: u8 = 124;
/// Exit status when the command could not be started.
pub const EXIT_LAUNCH_FAILED: u8 = 127;
/// Exit status when the command was terminated on request.
pub const EXIT_TERMINATED: u8 = 137;
/// Exit status for invalid arguments or configuration.
pub const EXIT_USAGE: u8 = 2;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Interpreter to run the command under.
    pub shell: Option<ShellKind>,
    /// Deadline in milliseconds (`<= 0` disables it).
    pub timeout_ms: Option<i64>,
    /// Working directory for the command.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables, in the order given.
    pub env: Vec<(String, String)>,
    /// Relay output live as it arrives instead of after exit.
    pub stream: bool,
    /// Print the result as JSON.
    pub json: bool,
    /// Strip ANSI escapes from captured output.
    pub strip_ansi: bool,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
    /// Command words. Everything after the first positional argument (or
    /// after `--`) belongs to the command.
    pub command: Vec<String>,
}

impl Args {
    /// The command words joined into one command line.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('s') | Long("shell") => {
                let value: String = parser.value()?.parse()?;
                result.shell = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("shell", value))?,
                );
            }
            Short('t') | Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                result.timeout_ms = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("timeout", value))?,
                );
            }
            Short('C') | Long("cwd") => {
                result.cwd = Some(parser.value()?.parse()?);
            }
            Short('e') | Long("env") => {
                let value: String = parser.value()?.parse()?;
                match value.split_once('=') {
                    Some((key, val)) if !key.is_empty() => {
                        result.env.push((key.to_string(), val.to_string()));
                    }
                    _ => return Err(ArgsError::InvalidValue("env", value)),
                }
            }
            Long("stream") => {
                result.stream = true;
            }
            Long("json") => {
                result.json = true;
            }
            Long("strip-ansi") => {
                result.strip_ansi = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                result.command.push(lossy(val));
                // Options after the command belong to the command
                result.command.extend(parser.raw_args()?.map(lossy));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Process exit status that mirrors a result.
///
/// Codes outside `0..=255` (possible on Windows) map to 1.
pub fn exit_status_for(result: &ExecutionResult) -> u8 {
    match result.outcome {
        Outcome::Completed => u8::try_from(result.exit_code).unwrap_or(1),
        Outcome::TimedOut => EXIT_TIMED_OUT,
        Outcome::Cancelled => EXIT_TERMINATED,
        Outcome::LaunchFailed => EXIT_LAUNCH_FAILED,
    }
}

fn lossy(value: OsString) -> String {
    value.to_string_lossy().into_owned()
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"zrun {version}
Run a command line under cmd, PowerShell or bash with a deadline

USAGE:
    zrun [OPTIONS] [--] <COMMAND>...

OPTIONS:
    -s, --shell <SHELL>     cmd, powershell or bash [default: powershell on Windows, bash elsewhere]
    -t, --timeout <MS>      Deadline in milliseconds, 0 for none [default: 30000]
    -C, --cwd <DIR>         Working directory
    -e, --env <KEY=VALUE>   Set an environment variable (repeatable)
        --stream            Relay output as it arrives
        --json              Print the result as JSON (no live output)
        --strip-ansi        Strip ANSI escape sequences from output
    -c, --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

EXIT STATUS:
    The command's own exit code, or
    124  deadline elapsed
    137  terminated
    127  interpreter could not be started
    2    invalid arguments

ENVIRONMENT VARIABLES:
    ZRUN_SHELL              Default shell (overrides config)
    ZRUN_TIMEOUT_MS         Default deadline (overrides config)
    ZRUN_WORKING_DIR        Default working directory (overrides config)
    ZRUN_LOG_LEVEL          Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Run with the platform default shell
    zrun echo hello

    # Bash with a 5 second deadline
    zrun -s bash -t 5000 -- 'sleep 1; echo done'

    # Stream a long build and strip colors
    zrun --stream --strip-ansi cargo build
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("zrun {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
