//! Command execution engine.
//!
//! This module provides command execution capabilities:
//! - Synchronous execution on the calling thread
//! - Asynchronous execution with streamed output events
//! - Deadlines that kill the whole process tree
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use zrun::execution::{ExecutionEngine, Invocation};
//! use zrun::ShellKind;
//!
//! let engine = ExecutionEngine::new();
//! let result = engine
//!     .execute(&Invocation::new("echo hello").shell(ShellKind::Bash))
//!     .unwrap();
//! println!("Output: {}", result.stdout);
//!
//! let invocation = Invocation::new("cargo build")
//!     .timeout(Duration::from_secs(60))
//!     .strip_ansi(true);
//! let running = engine.execute_async(invocation).unwrap();
//! println!("started {}", running.id);
//! ```

mod engine;
mod guard;
mod invocation;
mod pump;
mod result;

pub use engine::{
    execute_simple, execute_with_timeout, execute_with_timeout_ms, AsyncExecution, EngineConfig,
    ExecutionEngine, DEFAULT_DRAIN_TIMEOUT, DEFAULT_GRACE_PERIOD, DEFAULT_POLL_INTERVAL,
};
pub use guard::TimeoutGuard;
pub use invocation::{timeout_from_ms, Invocation, DEFAULT_TIMEOUT};
pub use pump::{PumpHandle, PumpOutput, StreamPump, READ_BUFFER_SIZE};
pub use result::{
    ExecEvent, ExecutionResult, OutputChunk, OutputStream, Outcome, EXIT_CODE_LAUNCH_FAILED,
    EXIT_CODE_TERMINATED,
};
