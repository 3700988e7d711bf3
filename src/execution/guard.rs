//! Deadline enforcement for a running process.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::process::{ProcessControl, StopCause};
use crate::Result;

/// Kills a process tree once its deadline passes.
///
/// A guard armed without a deadline spawns nothing and never fires.
pub struct TimeoutGuard {
    disarm: Option<Sender<()>>,
    thread: Option<JoinHandle<bool>>,
}

impl TimeoutGuard {
    /// Start watching `control`.
    ///
    /// When `timeout` elapses before [`disarm`](Self::disarm), the tree is
    /// terminated with [`StopCause::Timeout`]: asked to exit, given `grace`
    /// to comply, then killed.
    pub fn arm(
        control: Arc<ProcessControl>,
        timeout: Option<Duration>,
        grace: Duration,
        poll: Duration,
    ) -> Result<Self> {
        let Some(timeout) = timeout else {
            return Ok(Self {
                disarm: None,
                thread: None,
            });
        };

        let (tx, rx) = mpsc::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("zrun-timeout".into())
            .spawn(move || match rx.recv_timeout(timeout) {
                // Disarmed, or the guard was dropped
                Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
                Err(RecvTimeoutError::Timeout) => {
                    info!(
                        pid = control.pid(),
                        timeout_ms = timeout.as_millis() as u64,
                        "deadline elapsed, terminating process tree"
                    );
                    match control.terminate(StopCause::Timeout, grace, poll) {
                        Ok(fired) => fired,
                        Err(e) => {
                            warn!(pid = control.pid(), error = %e, "timeout termination failed");
                            false
                        }
                    }
                }
            })?;

        Ok(Self {
            disarm: Some(tx),
            thread: Some(thread),
        })
    }

    /// Whether this guard has a deadline at all.
    pub fn is_armed(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop watching. Returns `true` if the deadline had already fired and
    /// the guard terminated the process.
    ///
    /// If termination is in progress this blocks until it completes.
    pub fn disarm(mut self) -> bool {
        self.shutdown()
    }

    fn shutdown(&mut self) -> bool {
        if let Some(tx) = self.disarm.take() {
            let _ = tx.send(());
        }
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or_else(|_| {
                debug!("timeout guard thread panicked");
                false
            }),
            None => false,
        }
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}
