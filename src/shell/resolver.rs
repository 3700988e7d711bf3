//! Interpreter launch arguments per shell kind.

use super::ShellKind;

/// PowerShell execution policy used when none is configured.
pub const DEFAULT_EXECUTION_POLICY: &str = "Bypass";

/// Interpreter program plus the arguments preceding the command text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedShell {
    /// Which kind this was resolved from.
    pub kind: ShellKind,
    /// Interpreter executable name or path.
    pub program: String,
    /// Arguments placed before the command text.
    pub args: Vec<String>,
    /// The command text, passed as one final argument.
    pub command: String,
    /// Pass `command` to the OS untouched instead of applying the platform's
    /// argv quoting. Only `cmd.exe` needs this: it does its own parsing of
    /// the raw command line.
    pub verbatim: bool,
}

/// Maps shell kinds to interpreter invocations.
#[derive(Debug, Clone)]
pub struct ShellResolver {
    execution_policy: String,
}

impl ShellResolver {
    /// Create a resolver with the default PowerShell execution policy.
    pub fn new() -> Self {
        Self {
            execution_policy: DEFAULT_EXECUTION_POLICY.to_string(),
        }
    }

    /// Set the PowerShell execution policy (Windows only).
    pub fn with_execution_policy(mut self, policy: impl Into<String>) -> Self {
        let policy = policy.into();
        if !policy.trim().is_empty() {
            self.execution_policy = policy;
        }
        self
    }

    /// The configured PowerShell execution policy.
    pub fn execution_policy(&self) -> &str {
        &self.execution_policy
    }

    /// Resolve `kind` into a launchable interpreter invocation for `command`.
    ///
    /// The command text is not escaped; quoting inside it is the caller's
    /// business.
    pub fn resolve(&self, kind: ShellKind, command: &str) -> ResolvedShell {
        let (program, args, verbatim) = match kind {
            ShellKind::Cmd => (
                "cmd.exe".to_string(),
                vec!["/D".to_string(), "/S".to_string(), "/C".to_string()],
                cfg!(windows),
            ),
            ShellKind::PowerShell => {
                let mut args = vec![
                    "-NoLogo".to_string(),
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                ];
                if cfg!(windows) {
                    args.push("-ExecutionPolicy".to_string());
                    args.push(self.execution_policy.clone());
                }
                args.push("-Command".to_string());
                (powershell_program().to_string(), args, false)
            }
            ShellKind::Bash => ("bash".to_string(), vec!["-c".to_string()], false),
        };

        ResolvedShell {
            kind,
            program,
            args,
            command: command.to_string(),
            verbatim,
        }
    }

    /// Resolve from a raw numeric shell discriminant, rejecting unknown values.
    pub fn resolve_raw(&self, kind: i32, command: &str) -> crate::Result<ResolvedShell> {
        Ok(self.resolve(ShellKind::from_raw(kind)?, command))
    }
}

impl Default for ShellResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn powershell_program() -> &'static str {
    if cfg!(windows) {
        "powershell.exe"
    } else {
        "pwsh"
    }
}
