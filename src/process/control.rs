//! Shared handle for reaping and terminating one child process.

use std::process::{Child, ExitStatus};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::TreeTerminator;
use crate::error::ZrunError;
use crate::Result;

/// Why a process was forcibly stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// The configured deadline elapsed.
    Timeout,
    /// A caller cancelled the invocation (or the engine shut down).
    Cancelled,
}

/// Owns a live child process.
///
/// Reaping (`try_wait`) and termination both go through one lock, so a stop
/// request is only recorded if it is issued before the exit status becomes
/// observable. Once the exit status is known, stop requests are no-ops.
pub struct ProcessControl {
    pid: u32,
    inner: Mutex<ControlInner>,
}

struct ControlInner {
    child: Child,
    terminator: Box<dyn TreeTerminator>,
    exit: Option<ExitStatus>,
    cause: Option<StopCause>,
}

impl ControlInner {
    fn poll_exit(&mut self) -> std::io::Result<Option<ExitStatus>> {
        if self.exit.is_none() {
            self.exit = self.child.try_wait()?;
        }
        Ok(self.exit)
    }

    fn kill_tree(&mut self) {
        if let Err(e) = self.terminator.force_kill(&mut self.child) {
            warn!(pid = self.child.id(), error = %e, "tree kill failed");
        }
    }
}

impl ProcessControl {
    /// Take ownership of a spawned child and its termination strategy.
    pub fn new(child: Child, terminator: Box<dyn TreeTerminator>) -> Self {
        Self {
            pid: child.id(),
            inner: Mutex::new(ControlInner {
                child,
                terminator,
                exit: None,
                cause: None,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ControlInner>> {
        self.inner.lock().map_err(|_| ZrunError::LockPoisoned)
    }

    /// OS process id of the interpreter.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking exit check. Caches the status once observed.
    pub fn try_wait(&self) -> Result<Option<ExitStatus>> {
        Ok(self.lock()?.poll_exit()?)
    }

    /// Exit status if it has already been observed.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.lock().ok().and_then(|inner| inner.exit)
    }

    /// The recorded stop cause, if termination won the race with exit.
    pub fn stop_cause(&self) -> Option<StopCause> {
        self.lock().ok().and_then(|inner| inner.cause)
    }

    /// Whether the exit status has been observed.
    pub fn has_exited(&self) -> bool {
        self.exit_status().is_some()
    }

    /// Ask the process tree to exit.
    ///
    /// Returns `true` if the process was still running and a stop was
    /// requested, `false` if it had already exited. The first cause recorded
    /// wins; repeated requests re-send the exit request.
    pub fn request_stop(&self, cause: StopCause) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.poll_exit()?.is_some() {
            return Ok(false);
        }

        if inner.cause.is_none() {
            inner.cause = Some(cause);
        }
        debug!(pid = self.pid, ?cause, "requesting process tree exit");

        let ControlInner {
            child, terminator, ..
        } = &mut *inner;
        if let Err(e) = terminator.request_exit(child) {
            warn!(pid = self.pid, error = %e, "exit request failed");
        }
        Ok(true)
    }

    /// Kill the process tree unconditionally.
    ///
    /// Only acts on invocations that were asked to stop, so a tree that
    /// finished on its own is never signalled after the fact.
    pub fn force_kill(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.cause.is_none() {
            return Ok(());
        }

        inner.kill_tree();
        inner.poll_exit()?;
        Ok(())
    }

    /// Kill descendants left behind after the interpreter exited on its own.
    ///
    /// Records no stop cause, so the interpreter's own exit status still
    /// stands. Harmless when nothing is left.
    pub fn sweep(&self) -> Result<()> {
        let mut inner = self.lock()?;
        debug!(pid = self.pid, "sweeping leftover descendants");
        inner.kill_tree();
        Ok(())
    }

    /// Stop the tree with escalation: request exit, give it `grace` to
    /// comply, then kill whatever is left.
    ///
    /// Returns `true` if this call found the process running. Calling it on an
    /// exited process is a no-op.
    pub fn terminate(&self, cause: StopCause, grace: Duration, poll: Duration) -> Result<bool> {
        if !self.request_stop(cause)? {
            return Ok(false);
        }

        if self.wait_timeout(grace, poll)?.is_none() {
            warn!(pid = self.pid, grace_ms = grace.as_millis() as u64, "process ignored exit request, killing");
        }
        // Sweep descendants even if the leader already complied
        self.force_kill()?;
        Ok(true)
    }

    /// Poll for exit until `limit` elapses.
    pub fn wait_timeout(&self, limit: Duration, poll: Duration) -> Result<Option<ExitStatus>> {
        // Too far out to represent means no deadline
        let deadline = Instant::now().checked_add(limit);
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
            std::thread::sleep(poll);
        }
    }
}

impl std::fmt::Debug for ProcessControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessControl")
            .field("pid", &self.pid)
            .field("exit", &self.exit_status())
            .field("cause", &self.stop_cause())
            .finish()
    }
}

impl Drop for ControlInner {
    fn drop(&mut self) {
        // Nothing in the tree outlives its handle, exited leader or not
        let _ = self.terminator.force_kill(&mut self.child);
        if self.exit.is_none() {
            let _ = self.child.wait();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::PlatformTerminator;
    use std::process::{Command, Stdio};

    const POLL: Duration = Duration::from_millis(10);

    fn spawn(script: &str) -> ProcessControl {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        PlatformTerminator::prepare(&mut cmd);
        let child = cmd.spawn().unwrap();
        let terminator = PlatformTerminator::attach(&child).unwrap();
        ProcessControl::new(child, Box::new(terminator))
    }

    #[test]
    fn test_natural_exit() {
        let control = spawn("exit 3");
        let status = control
            .wait_timeout(Duration::from_secs(5), POLL)
            .unwrap()
            .unwrap();
        assert_eq!(status.code(), Some(3));
        assert!(control.has_exited());
        assert!(control.stop_cause().is_none());
    }

    #[test]
    fn test_stop_after_exit_is_noop() {
        let control = spawn("true");
        control.wait_timeout(Duration::from_secs(5), POLL).unwrap();

        assert!(!control.request_stop(StopCause::Timeout).unwrap());
        assert!(!control
            .terminate(StopCause::Cancelled, Duration::from_millis(50), POLL)
            .unwrap());
        assert!(control.stop_cause().is_none());
    }

    #[test]
    fn test_terminate_running() {
        let control = spawn("sleep 30");
        assert!(control
            .terminate(StopCause::Timeout, Duration::from_secs(2), POLL)
            .unwrap());

        assert_eq!(control.stop_cause(), Some(StopCause::Timeout));
        let status = control.wait_timeout(Duration::from_secs(5), POLL).unwrap();
        assert!(status.is_some());
    }

    #[test]
    fn test_terminate_escalates() {
        let control = spawn("trap '' TERM; sleep 30");
        let start = Instant::now();
        assert!(control
            .terminate(StopCause::Cancelled, Duration::from_millis(200), POLL)
            .unwrap());

        assert!(start.elapsed() >= Duration::from_millis(200));
        let status = control.wait_timeout(Duration::from_secs(5), POLL).unwrap();
        assert!(status.is_some());
    }

    #[test]
    fn test_first_cause_wins() {
        let control = spawn("sleep 30");
        control.request_stop(StopCause::Cancelled).unwrap();
        control.request_stop(StopCause::Timeout).unwrap();
        assert_eq!(control.stop_cause(), Some(StopCause::Cancelled));
        control.force_kill().unwrap();
    }

    #[test]
    fn test_sweep_kills_leftover_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("bg.pid");
        let control = spawn(&format!("sleep 30 & echo $! > {}", pid_file.display()));

        let status = control
            .wait_timeout(Duration::from_secs(5), POLL)
            .unwrap()
            .unwrap();
        assert!(status.success());
        let bg: libc::pid_t = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        control.sweep().unwrap();
        assert!(control.stop_cause().is_none());
        assert!(descendant_gone(bg));
    }

    #[test]
    fn test_drop_kills_leftover_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("bg.pid");
        let control = spawn(&format!("sleep 30 & echo $! > {}", pid_file.display()));
        control.wait_timeout(Duration::from_secs(5), POLL).unwrap();
        let bg: libc::pid_t = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        drop(control);
        assert!(descendant_gone(bg));
    }

    #[test]
    fn test_wait_timeout_unrepresentable_limit() {
        let control = spawn("exit 0");
        let status = control.wait_timeout(Duration::MAX, POLL).unwrap();
        assert!(status.unwrap().success());
    }

    /// The orphaned descendant is reparented, so it may linger as a zombie
    /// until its new parent reaps it.
    fn descendant_gone(pid: libc::pid_t) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let zombie = std::fs::read_to_string(format!("/proc/{pid}/stat"))
                .map(|stat| {
                    stat.rsplit_once(')')
                        .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z'))
                })
                .unwrap_or(false);
            // SAFETY: signal 0 only checks for existence.
            if zombie || unsafe { libc::kill(pid, 0) } != 0 {
                return true;
            }
            std::thread::sleep(POLL);
        }
        false
    }

    #[test]
    fn test_force_kill_without_request_is_noop() {
        let control = spawn("sleep 0.2");
        control.force_kill().unwrap();
        let status = control
            .wait_timeout(Duration::from_secs(5), POLL)
            .unwrap()
            .unwrap();
        assert!(status.success());
    }
}
