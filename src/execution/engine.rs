//! Execution engine: drives invocations from launch to result.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ChildStderr, ChildStdout, ExitStatus};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use super::guard::TimeoutGuard;
use super::invocation::{timeout_from_ms, Invocation};
use super::pump::{PumpHandle, StreamPump};
use super::result::{
    ExecEvent, ExecutionResult, OutputChunk, OutputStream, Outcome, EXIT_CODE_TERMINATED,
};
use crate::error::ZrunError;
use crate::output::OutputSanitizer;
use crate::process::{LaunchOptions, LaunchedProcess, ProcessControl, ProcessLauncher, StopCause};
use crate::session::{AsyncSession, AsyncState, InstanceRegistry, InvocationId};
use crate::shell::{ResolvedShell, ShellKind, ShellResolver, DEFAULT_EXECUTION_POLICY};
use crate::Result;

/// Default time a process tree gets to honor an exit request before it is
/// killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Default time to wait for output pipes to close after the interpreter
/// exits.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default exit polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Engine-wide settings applied to every invocation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between the exit request and the forced kill.
    pub grace_period: Duration,
    /// How long to keep reading output after the interpreter exits. Any
    /// descendant still holding the pipes after this is killed.
    pub drain_timeout: Duration,
    /// Exit polling interval.
    pub poll_interval: Duration,
    /// PowerShell execution policy.
    pub execution_policy: String,
    /// Default working directory.
    pub working_dir: Option<PathBuf>,
    /// Environment variables for every invocation.
    pub env: HashMap<String, String>,
    /// Start from the parent's environment.
    pub inherit_env: bool,
    /// Strip ANSI escapes from every result.
    pub strip_ansi: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            execution_policy: DEFAULT_EXECUTION_POLICY.to_string(),
            working_dir: None,
            env: HashMap::new(),
            inherit_env: true,
            strip_ansi: false,
        }
    }
}

/// Everything one run needs, resolved up front.
#[derive(Debug, Clone)]
struct RunPlan {
    shell: ResolvedShell,
    launch: LaunchOptions,
    timeout: Option<Duration>,
    strip_ansi: bool,
    grace: Duration,
    drain: Duration,
    poll: Duration,
}

impl RunPlan {
    fn build(config: &EngineConfig, invocation: &Invocation) -> Self {
        let shell = ShellResolver::new()
            .with_execution_policy(config.execution_policy.clone())
            .resolve(invocation.shell, &invocation.command);

        let mut env = config.env.clone();
        env.extend(invocation.env.clone());

        Self {
            shell,
            launch: LaunchOptions {
                working_dir: invocation
                    .working_dir
                    .clone()
                    .or_else(|| config.working_dir.clone()),
                env,
                inherit_env: config.inherit_env,
            },
            timeout: invocation.timeout,
            strip_ansi: invocation.strip_ansi || config.strip_ansi,
            grace: config.grace_period,
            drain: config.drain_timeout,
            poll: config.poll_interval.max(Duration::from_millis(1)),
        }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        if self.strip_ansi {
            OutputSanitizer::strip_ansi(bytes)
        } else {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Handle to an asynchronous invocation.
///
/// `events` yields zero or more [`ExecEvent::Output`] followed by exactly one
/// [`ExecEvent::Finished`].
#[derive(Debug)]
pub struct AsyncExecution {
    /// Identifier for status, wait and cancel.
    pub id: InvocationId,
    /// Event queue fed by the invocation's worker.
    pub events: UnboundedReceiver<ExecEvent>,
}

impl AsyncExecution {
    /// Receive the next event, or `None` once the queue is exhausted.
    pub async fn next_event(&mut self) -> Option<ExecEvent> {
        self.events.recv().await
    }

    /// Skip output and wait for the terminal result.
    pub async fn finished(mut self) -> Result<ExecutionResult> {
        while let Some(event) = self.events.recv().await {
            if let ExecEvent::Finished(result) = event {
                return Ok(result);
            }
        }
        Err(ZrunError::ChannelClosed)
    }

    /// Block the current thread until the invocation finishes, returning every
    /// chunk in arrival order plus the result.
    ///
    /// Must not be called from inside an async runtime.
    pub fn collect_blocking(mut self) -> Result<(Vec<OutputChunk>, ExecutionResult)> {
        let mut chunks = Vec::new();
        while let Some(event) = self.events.blocking_recv() {
            match event {
                ExecEvent::Output(chunk) => chunks.push(chunk),
                ExecEvent::Finished(result) => return Ok((chunks, result)),
            }
        }
        Err(ZrunError::ChannelClosed)
    }
}

/// Runs shell commands and owns every process it starts.
///
/// Dropping the engine (or calling [`destroy`](Self::destroy)) terminates all
/// in-flight asynchronous invocations and waits for their workers.
pub struct ExecutionEngine {
    config: RwLock<EngineConfig>,
    registry: Arc<InstanceRegistry>,
}

impl ExecutionEngine {
    /// Create an engine with default settings.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with the given settings.
    pub fn with_config(config: EngineConfig) -> Self {
        debug!(?config, "execution engine created");
        Self {
            config: RwLock::new(config),
            registry: Arc::new(InstanceRegistry::new()),
        }
    }

    /// Snapshot of the current settings.
    pub fn config(&self) -> Result<EngineConfig> {
        let config = self.config.read().map_err(|_| ZrunError::LockPoisoned)?;
        Ok(config.clone())
    }

    fn update_config(&self, f: impl FnOnce(&mut EngineConfig)) -> Result<()> {
        let mut config = self.config.write().map_err(|_| ZrunError::LockPoisoned)?;
        f(&mut config);
        Ok(())
    }

    /// Default working directory for subsequent invocations.
    pub fn set_working_directory(&self, dir: impl Into<PathBuf>) -> Result<()> {
        let dir = dir.into();
        self.update_config(|c| c.working_dir = Some(dir))
    }

    /// Set one environment variable for subsequent invocations.
    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        self.update_config(|c| {
            c.env.insert(key, value);
        })
    }

    /// Set several environment variables for subsequent invocations.
    pub fn set_envs<I, K, V>(&self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: Vec<(String, String)> =
            vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.update_config(|c| c.env.extend(vars))
    }

    /// Drop all engine-level environment overrides.
    pub fn clear_env(&self) -> Result<()> {
        self.update_config(|c| c.env.clear())
    }

    /// PowerShell execution policy for subsequent invocations.
    pub fn set_execution_policy(&self, policy: impl Into<String>) -> Result<()> {
        let policy = policy.into();
        self.update_config(|c| c.execution_policy = policy)
    }

    fn plan(&self, invocation: &Invocation) -> Result<RunPlan> {
        invocation.validate()?;
        let config = self.config.read().map_err(|_| ZrunError::LockPoisoned)?;
        Ok(RunPlan::build(&config, invocation))
    }

    /// Run an invocation on the calling thread and block until it finishes.
    ///
    /// Only pre-launch validation fails with `Err`. Launch failures, timeouts
    /// and non-zero exits are all reported through the result.
    pub fn execute(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        let plan = self.plan(invocation)?;
        Ok(Self::run(&plan, None, None))
    }

    /// Run `command` under `shell` and block until it finishes.
    ///
    /// `timeout_ms` of zero or less disables the deadline.
    pub fn execute_sync(
        &self,
        command: &str,
        shell: ShellKind,
        timeout_ms: i64,
    ) -> Result<ExecutionResult> {
        let invocation = Invocation::new(command).shell(shell).timeout_ms(timeout_ms);
        self.execute(&invocation)
    }

    /// Like [`execute_sync`](Self::execute_sync) with the shell given as its
    /// numeric kind (0 = cmd, 1 = PowerShell, 2 = Bash).
    pub fn execute_raw(&self, command: &str, shell: i32, timeout_ms: i64) -> Result<ExecutionResult> {
        self.execute_sync(command, ShellKind::from_raw(shell)?, timeout_ms)
    }

    /// Start an invocation on its own worker thread and return immediately.
    ///
    /// Validation errors are returned before anything is registered or
    /// launched.
    pub fn execute_async(&self, invocation: Invocation) -> Result<AsyncExecution> {
        let plan = self.plan(&invocation)?;
        let session = self.registry.create()?;
        let id = session.id();
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = std::thread::Builder::new().name(format!("zrun-{id}")).spawn({
            let registry = Arc::clone(&self.registry);
            let session = Arc::clone(&session);
            move || {
                let result = Self::run(&plan, Some(&tx), Some(&session));
                debug!(%id, outcome = ?result.outcome, exit_code = result.exit_code, "invocation finished");
                let _ = session.complete(result.clone());
                let _ = tx.send(ExecEvent::Finished(result));
                // Already gone if it was cancelled
                let _ = registry.remove(id);
            }
        });

        match worker {
            Ok(handle) => session.set_worker(handle),
            Err(e) => {
                let _ = self.registry.remove(id);
                return Err(e.into());
            }
        }

        debug!(%id, command = %invocation.command, "invocation started");
        Ok(AsyncExecution { id, events: rx })
    }

    /// Start an invocation and deliver its events to `sink`.
    ///
    /// The sink runs on a dedicated dispatcher thread, never on a pump, and is
    /// called for each chunk and finally for the [`ExecEvent::Finished`]
    /// event. Any caller context travels inside the closure.
    pub fn execute_with_sink<F>(&self, invocation: Invocation, mut sink: F) -> Result<InvocationId>
    where
        F: FnMut(ExecEvent) + Send + 'static,
    {
        let AsyncExecution { id, mut events } = self.execute_async(invocation)?;

        let dispatcher = std::thread::Builder::new()
            .name(format!("zrun-sink-{id}"))
            .spawn(move || {
                while let Some(event) = events.blocking_recv() {
                    let terminal = event.is_terminal();
                    sink(event);
                    if terminal {
                        break;
                    }
                }
            });

        if let Err(e) = dispatcher {
            let _ = self.cancel(id);
            return Err(e.into());
        }
        Ok(id)
    }

    /// State of a registered asynchronous invocation.
    ///
    /// The session leaves the registry right after its terminal event, so a
    /// finished invocation usually reports `UnknownInvocationId`. Use
    /// [`AsyncExecution::finished`] to observe the outcome reliably.
    pub fn status(&self, id: InvocationId) -> Result<AsyncState> {
        self.registry.lookup(id)?.state()
    }

    /// Block until a registered asynchronous invocation finishes.
    ///
    /// Only reliable while the invocation is known to be running; once it
    /// may have completed, read the result from [`AsyncExecution::finished`]
    /// or the terminal event instead.
    pub fn wait(&self, id: InvocationId) -> Result<ExecutionResult> {
        self.registry.lookup(id)?.wait()
    }

    /// Forcibly terminate an asynchronous invocation.
    ///
    /// The session is removed immediately; its terminal event still arrives
    /// and reports [`Outcome::Cancelled`] unless the process had already
    /// exited.
    pub fn cancel(&self, id: InvocationId) -> Result<()> {
        let session = self.registry.remove(id)?;
        info!(%id, "cancelling invocation");

        if let Some(control) = session.mark_cancelled()? {
            let config = self.config()?;
            control.terminate(
                StopCause::Cancelled,
                config.grace_period,
                config.poll_interval,
            )?;
        }
        Ok(())
    }

    /// Number of in-flight asynchronous invocations.
    pub fn active_count(&self) -> usize {
        self.registry.count()
    }

    /// Identifiers of in-flight asynchronous invocations.
    pub fn active_ids(&self) -> Result<Vec<InvocationId>> {
        self.registry.ids()
    }

    /// Terminate every in-flight invocation and wait for its worker.
    ///
    /// All trees are asked to exit at once, share one grace period, then
    /// anything still alive is killed.
    pub fn shutdown(&self) {
        let sessions = match self.registry.drain() {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "could not drain invocation registry");
                return;
            }
        };
        if sessions.is_empty() {
            return;
        }

        let (grace, poll) = self
            .config()
            .map(|c| (c.grace_period, c.poll_interval))
            .unwrap_or((DEFAULT_GRACE_PERIOD, DEFAULT_POLL_INTERVAL));
        info!(count = sessions.len(), "terminating in-flight invocations");

        let controls: Vec<Arc<ProcessControl>> = sessions
            .iter()
            .filter_map(|s| s.mark_cancelled().ok().flatten())
            .collect();
        for control in &controls {
            let _ = control.request_stop(StopCause::Cancelled);
        }

        let deadline = Instant::now().checked_add(grace);
        while deadline.map_or(true, |d| Instant::now() < d)
            && controls
                .iter()
                .any(|c| matches!(c.try_wait(), Ok(None)))
        {
            std::thread::sleep(poll);
        }
        for control in &controls {
            if let Err(e) = control.force_kill() {
                warn!(pid = control.pid(), error = %e, "force kill failed during shutdown");
            }
        }

        // Workers launching right now see the cancel flag on attach
        for session in &sessions {
            if let Some(worker) = session.take_worker() {
                let _ = worker.join();
            }
        }
    }

    /// Terminate all in-flight invocations and release the engine.
    pub fn destroy(self) {
        // Drop does the work
    }

    /// Drive one invocation from launch to result.
    fn run(
        plan: &RunPlan,
        events: Option<&UnboundedSender<ExecEvent>>,
        session: Option<&AsyncSession>,
    ) -> ExecutionResult {
        let started = Instant::now();

        if session.is_some_and(AsyncSession::is_cancelled) {
            return ExecutionResult {
                exit_code: EXIT_CODE_TERMINATED,
                elapsed: started.elapsed(),
                outcome: Outcome::Cancelled,
                ..ExecutionResult::default()
            };
        }

        let launched = match ProcessLauncher::launch(&plan.shell, &plan.launch) {
            Ok(launched) => launched,
            Err(e) => {
                warn!(program = %plan.shell.program, error = %e, "launch failed");
                return ExecutionResult::launch_failed(e.to_string(), started.elapsed());
            }
        };

        let LaunchedProcess {
            control,
            stdout,
            stderr,
        } = launched;
        let pid = control.pid();

        if let Some(session) = session {
            if matches!(session.attach_process(Arc::clone(&control)), Ok(true)) {
                debug!(pid, "cancelled during launch");
                if let Err(e) = control.terminate(StopCause::Cancelled, plan.grace, plan.poll) {
                    warn!(pid, error = %e, "termination after cancel failed");
                }
            }
        }

        match Self::drive(plan, &control, stdout, stderr, events, started) {
            Ok(result) => result,
            Err(e) => {
                warn!(pid, error = %e, "execution failed after launch");
                let _ = control.terminate(StopCause::Cancelled, plan.grace, plan.poll);
                ExecutionResult {
                    exit_code: EXIT_CODE_TERMINATED,
                    stderr: e.to_string(),
                    elapsed: started.elapsed(),
                    outcome: Outcome::Cancelled,
                    pid: Some(pid),
                    ..ExecutionResult::default()
                }
            }
        }
    }

    fn drive(
        plan: &RunPlan,
        control: &Arc<ProcessControl>,
        stdout: ChildStdout,
        stderr: ChildStderr,
        events: Option<&UnboundedSender<ExecEvent>>,
        started: Instant,
    ) -> Result<ExecutionResult> {
        let stdout_pump = Self::pump(OutputStream::Stdout, events).spawn(stdout)?;
        let stderr_pump = Self::pump(OutputStream::Stderr, events).spawn(stderr)?;
        let guard = TimeoutGuard::arm(Arc::clone(control), plan.timeout, plan.grace, plan.poll)?;

        let status = loop {
            if let Some(status) = control.try_wait()? {
                break status;
            }
            std::thread::sleep(plan.poll);
        };
        guard.disarm();

        // Both pumps share one drain window
        let drain_started = Instant::now();
        let mut drained = stdout_pump.wait_eof(plan.drain)?;
        drained &= stderr_pump.wait_eof(plan.drain.saturating_sub(drain_started.elapsed()))?;
        if !drained {
            warn!(
                pid = control.pid(),
                "output pipe still open after exit, killing leftover descendants"
            );
            control.sweep()?;
        }

        let stdout = Self::drain(stdout_pump, plan.drain)?;
        let stderr = Self::drain(stderr_pump, plan.drain)?;

        let (outcome, exit_code) = match control.stop_cause() {
            Some(StopCause::Timeout) => (Outcome::TimedOut, EXIT_CODE_TERMINATED),
            Some(StopCause::Cancelled) => (Outcome::Cancelled, EXIT_CODE_TERMINATED),
            None => (Outcome::Completed, exit_code(status)),
        };

        Ok(ExecutionResult {
            exit_code,
            stdout: plan.decode(&stdout),
            stderr: plan.decode(&stderr),
            elapsed: started.elapsed(),
            outcome,
            pid: Some(control.pid()),
        })
    }

    fn pump(stream: OutputStream, events: Option<&UnboundedSender<ExecEvent>>) -> StreamPump {
        let pump = StreamPump::new(stream);
        match events {
            Some(tx) => pump.forward_to(tx.clone()),
            None => pump,
        }
    }

    fn drain(pump: PumpHandle, limit: Duration) -> Result<Vec<u8>> {
        let stream = pump.stream();
        let output = pump.finish(Some(limit))?;
        if !output.complete {
            // Only a process outside the tree can still hold it
            warn!(stream = stream.name(), "output pipe held outside the process tree, detaching");
        }
        Ok(output.bytes)
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExecutionEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Exit code of a naturally exited process. Death by signal maps to
/// `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    EXIT_CODE_TERMINATED
}

/// Simple one-shot command execution with the default shell and timeout.
pub fn execute_simple(command: &str) -> Result<ExecutionResult> {
    ExecutionEngine::new().execute(&Invocation::new(command))
}

/// One-shot execution with an explicit timeout.
pub fn execute_with_timeout(command: &str, timeout: Duration) -> Result<ExecutionResult> {
    ExecutionEngine::new().execute(&Invocation::new(command).timeout(timeout))
}

/// One-shot execution with the timeout in milliseconds (`<= 0` means none).
pub fn execute_with_timeout_ms(command: &str, timeout_ms: i64) -> Result<ExecutionResult> {
    let invocation = Invocation::new(command);
    let invocation = match timeout_from_ms(timeout_ms) {
        Some(timeout) => invocation.timeout(timeout),
        None => invocation.no_timeout(),
    };
    ExecutionEngine::new().execute(&invocation)
}
