//! Shell interpreter selection.
//!
//! Maps a [`ShellKind`] onto the interpreter program and the argument list
//! that makes it run exactly one command string non-interactively.
//!
//! # Example
//!
//! ```
//! use zrun::shell::{ShellKind, ShellResolver};
//!
//! let resolved = ShellResolver::new().resolve(ShellKind::Bash, "echo hello");
//! assert_eq!(resolved.program, "bash");
//! assert_eq!(resolved.args, vec!["-c".to_string()]);
//! assert_eq!(resolved.command, "echo hello");
//! ```

mod kind;
mod resolver;

pub use kind::ShellKind;
pub use resolver::{ResolvedShell, ShellResolver, DEFAULT_EXECUTION_POLICY};
