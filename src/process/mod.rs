//! Child process lifecycle.
//!
//! This module owns everything that touches the OS process table:
//! - [`ProcessLauncher`] spawns the interpreter with piped, separate
//!   stdout/stderr and an inert stdin
//! - [`ProcessControl`] serializes reaping and forced termination so the two
//!   can never race
//! - [`TreeTerminator`] is the platform strategy for killing a process and
//!   its descendants (process groups on Unix, job objects on Windows)

mod control;
mod launcher;
mod terminate;

pub use control::{ProcessControl, StopCause};
pub use launcher::{LaunchOptions, LaunchedProcess, ProcessLauncher};
pub use terminate::{PlatformTerminator, TreeTerminator};
