//! Interpreter process spawning.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ChildStderr, ChildStdout, Command, Stdio};
use std::sync::Arc;

use tracing::debug;

use super::{PlatformTerminator, ProcessControl};
use crate::error::ZrunError;
use crate::shell::ResolvedShell;
use crate::Result;

/// Process-level launch settings.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Working directory for the interpreter.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
    /// Start from the parent's environment (`true`) or an empty one.
    pub inherit_env: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            working_dir: None,
            env: HashMap::new(),
            inherit_env: true,
        }
    }
}

/// A freshly launched interpreter with its two output streams.
#[derive(Debug)]
pub struct LaunchedProcess {
    /// Shared reap/kill handle.
    pub control: Arc<ProcessControl>,
    /// Standard output pipe.
    pub stdout: ChildStdout,
    /// Standard error pipe.
    pub stderr: ChildStderr,
}

/// Starts interpreter processes.
pub struct ProcessLauncher;

impl ProcessLauncher {
    /// Build the OS command for a resolved shell.
    pub fn command(shell: &ResolvedShell, options: &LaunchOptions) -> Command {
        let mut cmd = Command::new(&shell.program);
        cmd.args(&shell.args);
        push_command_text(&mut cmd, shell);

        if !options.inherit_env {
            cmd.env_clear();
        }
        cmd.envs(&options.env);
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        PlatformTerminator::prepare(&mut cmd);
        cmd
    }

    /// Spawn the interpreter.
    ///
    /// Any failure maps to [`ZrunError::LaunchFailure`]; nothing is retried.
    pub fn launch(shell: &ResolvedShell, options: &LaunchOptions) -> Result<LaunchedProcess> {
        let failure = |reason: String| ZrunError::LaunchFailure {
            program: shell.program.clone(),
            reason,
        };

        let mut cmd = Self::command(shell, options);
        let mut child = cmd.spawn().map_err(|e| failure(e.to_string()))?;

        let terminator = match PlatformTerminator::attach(&child) {
            Ok(t) => t,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(failure(format!("process tree setup failed: {e}")));
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let control = Arc::new(ProcessControl::new(child, Box::new(terminator)));

        // Dropping the control on the error path kills the child
        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            return Err(failure("output pipes unavailable".into()));
        };

        debug!(
            pid = control.pid(),
            program = %shell.program,
            shell = %shell.kind,
            "interpreter launched"
        );

        Ok(LaunchedProcess {
            control,
            stdout,
            stderr,
        })
    }
}

#[cfg(windows)]
fn push_command_text(cmd: &mut Command, shell: &ResolvedShell) {
    use std::os::windows::process::CommandExt;

    if shell.verbatim {
        // cmd.exe /S strips exactly one pair of surrounding quotes
        cmd.raw_arg(format!("\"{}\"", shell.command));
    } else {
        cmd.arg(&shell.command);
    }
}

#[cfg(not(windows))]
fn push_command_text(cmd: &mut Command, shell: &ResolvedShell) {
    cmd.arg(&shell.command);
}
