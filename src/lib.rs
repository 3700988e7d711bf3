//! # zrun
//!
//! Run a single command line under cmd, PowerShell or bash and get back one
//! structured result.
//!
//! The interpreter runs as a child process with standard output and standard
//! error captured separately. Both streams are drained concurrently, a
//! deadline kills the whole process tree, and every process an engine starts
//! is terminated when the engine goes away.
//!
//! ## Features
//!
//! - **Three shells**: cmd, PowerShell and bash behind one [`ShellKind`]
//! - **Sync and async**: block for the result, or stream [`ExecEvent`]s over a
//!   tokio channel
//! - **Tree termination**: Unix process groups and Windows job objects
//! - **Cancellation**: by invocation id, or all at once on engine drop
//!
//! ## Quick Start
//!
//! ```no_run
//! use zrun::{ExecEvent, ExecutionEngine, Invocation, ShellKind};
//!
//! #[tokio::main]
//! async fn main() -> zrun::Result<()> {
//!     zrun::logging::try_init().ok();
//!
//!     let engine = ExecutionEngine::new();
//!
//!     // Blocking
//!     let result = engine.execute_sync("echo hello", ShellKind::Bash, 5_000)?;
//!     assert_eq!(result.stdout, "hello\n");
//!
//!     // Streaming
//!     let mut running = engine.execute_async(Invocation::new("ls -l").shell(ShellKind::Bash))?;
//!     while let Some(event) = running.next_event().await {
//!         match event {
//!             ExecEvent::Output(chunk) => print!("{}", chunk.text),
//!             ExecEvent::Finished(result) => println!("exit {}", result.exit_code),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod output;
pub mod process;
pub mod session;
pub mod shell;

// Re-export commonly used types
pub use error::{Result, ZrunError};
pub use execution::{
    AsyncExecution, EngineConfig, ExecEvent, ExecutionEngine, ExecutionResult, Invocation,
    OutputChunk, OutputStream, Outcome, EXIT_CODE_LAUNCH_FAILED, EXIT_CODE_TERMINATED,
};
pub use output::OutputSanitizer;
pub use session::{AsyncState, InvocationId};
pub use shell::{ShellKind, ShellResolver};
