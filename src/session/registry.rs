//! In-flight asynchronous invocations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{AsyncState, InvocationId};
use crate::error::ZrunError;
use crate::execution::ExecutionResult;
use crate::process::ProcessControl;
use crate::Result;

/// One asynchronous invocation while it runs.
///
/// The driving worker attaches the process once launched and publishes the
/// final result; callers can cancel it or block until it finishes.
pub struct AsyncSession {
    id: InvocationId,
    process: Mutex<ProcessSlot>,
    status: Mutex<StatusSlot>,
    finished: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct ProcessSlot {
    control: Option<Arc<ProcessControl>>,
    cancelled: bool,
}

#[derive(Default)]
struct StatusSlot {
    state: AsyncState,
    result: Option<ExecutionResult>,
}

impl AsyncSession {
    /// Create a running session.
    pub fn new(id: InvocationId) -> Self {
        Self {
            id,
            process: Mutex::new(ProcessSlot::default()),
            status: Mutex::new(StatusSlot::default()),
            finished: Condvar::new(),
            worker: Mutex::new(None),
        }
    }

    /// Invocation identifier.
    pub fn id(&self) -> InvocationId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> Result<AsyncState> {
        let status = self.status.lock().map_err(|_| ZrunError::LockPoisoned)?;
        Ok(status.state)
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.process.lock().map(|p| p.cancelled).unwrap_or(true)
    }

    /// Record the launched process.
    ///
    /// Returns `true` if the session was cancelled before the process
    /// existed; the caller must then terminate it.
    pub fn attach_process(&self, control: Arc<ProcessControl>) -> Result<bool> {
        let mut slot = self.process.lock().map_err(|_| ZrunError::LockPoisoned)?;
        slot.control = Some(control);
        Ok(slot.cancelled)
    }

    /// Flag the session as cancelled and hand back its process for
    /// termination. A session whose process has not launched yet will be
    /// terminated by its worker on attach.
    pub fn mark_cancelled(&self) -> Result<Option<Arc<ProcessControl>>> {
        let mut slot = self.process.lock().map_err(|_| ZrunError::LockPoisoned)?;
        slot.cancelled = true;
        Ok(slot.control.clone())
    }

    /// Publish the final result and wake waiters. Only the first call counts.
    pub fn complete(&self, result: ExecutionResult) -> Result<()> {
        let mut status = self.status.lock().map_err(|_| ZrunError::LockPoisoned)?;
        let target = AsyncState::from_result(&result);
        if status.state.can_transition_to(target) {
            status.state = target;
            status.result = Some(result);
        }
        self.finished.notify_all();
        Ok(())
    }

    /// Block until the session finishes.
    pub fn wait(&self) -> Result<ExecutionResult> {
        let status = self.status.lock().map_err(|_| ZrunError::LockPoisoned)?;
        let status = self
            .finished
            .wait_while(status, |s| s.result.is_none())
            .map_err(|_| ZrunError::LockPoisoned)?;
        status.result.clone().ok_or(ZrunError::ChannelClosed)
    }

    /// Block until the session finishes or `limit` elapses.
    pub fn wait_timeout(&self, limit: Duration) -> Result<Option<ExecutionResult>> {
        let status = self.status.lock().map_err(|_| ZrunError::LockPoisoned)?;
        let (status, _) = self
            .finished
            .wait_timeout_while(status, limit, |s| s.result.is_none())
            .map_err(|_| ZrunError::LockPoisoned)?;
        Ok(status.result.clone())
    }

    /// Store the worker thread driving this session.
    pub fn set_worker(&self, handle: JoinHandle<()>) {
        if let Ok(mut worker) = self.worker.lock() {
            *worker = Some(handle);
        }
    }

    /// Take the worker thread handle for joining.
    pub fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker.lock().ok().and_then(|mut w| w.take())
    }
}

impl std::fmt::Debug for AsyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSession")
            .field("id", &self.id)
            .field("state", &self.state().ok())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Thread-safe map of in-flight sessions.
pub struct InstanceRegistry {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<InvocationId, Arc<AsyncSession>>>,
}

impl InstanceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a fresh identifier.
    pub fn allocate_id(&self) -> InvocationId {
        InvocationId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate an identifier and register a new session under it.
    pub fn create(&self) -> Result<Arc<AsyncSession>> {
        let session = Arc::new(AsyncSession::new(self.allocate_id()));
        self.register(Arc::clone(&session))?;
        Ok(session)
    }

    /// Register a session under its own identifier.
    pub fn register(&self, session: Arc<AsyncSession>) -> Result<InvocationId> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| ZrunError::LockPoisoned)?;

        let id = session.id();
        if sessions.contains_key(&id) {
            return Err(ZrunError::InvocationExists(id));
        }
        sessions.insert(id, session);
        Ok(id)
    }

    /// Find a registered session.
    pub fn lookup(&self, id: InvocationId) -> Result<Arc<AsyncSession>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| ZrunError::LockPoisoned)?;
        sessions
            .get(&id)
            .cloned()
            .ok_or(ZrunError::UnknownInvocationId(id))
    }

    /// Remove a session, returning it.
    pub fn remove(&self, id: InvocationId) -> Result<Arc<AsyncSession>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| ZrunError::LockPoisoned)?;
        sessions
            .remove(&id)
            .ok_or(ZrunError::UnknownInvocationId(id))
    }

    /// Check if a session is registered.
    pub fn contains(&self, id: InvocationId) -> bool {
        self.sessions
            .read()
            .map(|s| s.contains_key(&id))
            .unwrap_or(false)
    }

    /// Number of registered sessions.
    pub fn count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Identifiers of all registered sessions, sorted.
    pub fn ids(&self) -> Result<Vec<InvocationId>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| ZrunError::LockPoisoned)?;
        let mut ids: Vec<_> = sessions.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    /// Remove and return every session.
    pub fn drain(&self) -> Result<Vec<Arc<AsyncSession>>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| ZrunError::LockPoisoned)?;
        Ok(sessions.drain().map(|(_, s)| s).collect())
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
