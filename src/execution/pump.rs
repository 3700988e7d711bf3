//! Concurrent draining of one output stream.
//!
//! Each stream gets its own thread so a child writing heavily to one pipe
//! can never stall because nobody is reading the other.

use std::io::Read;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, trace};

use super::result::{ExecEvent, OutputChunk, OutputStream};
use crate::error::ZrunError;
use crate::output::Utf8ChunkDecoder;
use crate::Result;

/// Default read buffer size.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Spawns reader threads for output pipes.
pub struct StreamPump {
    stream: OutputStream,
    buffer_size: usize,
    events: Option<UnboundedSender<ExecEvent>>,
}

/// Everything a pump captured.
#[derive(Debug, Default)]
pub struct PumpOutput {
    /// Raw bytes read from the pipe.
    pub bytes: Vec<u8>,
    /// Whether the pump reached end of stream. `false` means it was detached
    /// while something still held the pipe open.
    pub complete: bool,
}

impl PumpOutput {
    /// Captured bytes as text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Default)]
struct PumpState {
    bytes: Vec<u8>,
    finished: bool,
    detached: bool,
    // Released on detach so receivers see the channel close
    events: Option<UnboundedSender<ExecEvent>>,
}

struct PumpShared {
    state: Mutex<PumpState>,
    done: Condvar,
}

/// Handle to a running pump thread.
pub struct PumpHandle {
    stream: OutputStream,
    shared: Arc<PumpShared>,
    thread: Option<JoinHandle<()>>,
}

impl StreamPump {
    /// Create a pump for `stream`.
    pub fn new(stream: OutputStream) -> Self {
        Self {
            stream,
            buffer_size: READ_BUFFER_SIZE,
            events: None,
        }
    }

    /// Forward each chunk to `events` as it arrives.
    pub fn forward_to(mut self, events: UnboundedSender<ExecEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Create with custom buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Start draining `reader` on a dedicated thread.
    pub fn spawn<R: Read + Send + 'static>(mut self, reader: R) -> Result<PumpHandle> {
        let shared = Arc::new(PumpShared {
            state: Mutex::new(PumpState {
                events: self.events.take(),
                ..PumpState::default()
            }),
            done: Condvar::new(),
        });

        let stream = self.stream;
        let thread = std::thread::Builder::new()
            .name(format!("zrun-{}", stream.name()))
            .spawn({
                let shared = Arc::clone(&shared);
                move || self.run(reader, &shared)
            })?;

        Ok(PumpHandle {
            stream,
            shared,
            thread: Some(thread),
        })
    }

    fn run<R: Read>(self, mut reader: R, shared: &PumpShared) {
        let mut buf = vec![0u8; self.buffer_size];
        let mut decoder = Utf8ChunkDecoder::new();
        let stream = self.stream.name();

        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!(stream, "pump: EOF");
                    break;
                }
                Ok(n) => {
                    trace!(stream, bytes = n, "pump: read");
                    let Ok(mut state) = shared.state.lock() else {
                        error!(stream, "pump: state lock poisoned");
                        break;
                    };
                    if state.detached {
                        debug!(stream, "pump: detached, stopping");
                        break;
                    }
                    state.bytes.extend_from_slice(&buf[..n]);
                    // Sent under the lock so nothing slips out after detach
                    self.forward(&state, decoder.decode(&buf[..n]));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Pipe torn down underneath us; treat like EOF
                    debug!(stream, error = %e, "pump: read failed");
                    break;
                }
            }
        }

        if let Ok(mut state) = shared.state.lock() {
            if !state.detached {
                let rest = decoder.finish();
                self.forward(&state, rest);
            }
            state.finished = true;
            state.events = None;
        }
        shared.done.notify_all();
    }

    fn forward(&self, state: &PumpState, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(events) = &state.events {
            // A dropped receiver just means nobody is listening; keep draining
            let _ = events.send(ExecEvent::Output(OutputChunk::new(self.stream, text)));
        }
    }
}

impl PumpHandle {
    /// Stream this pump drains.
    pub fn stream(&self) -> OutputStream {
        self.stream
    }

    /// Whether the pump reached end of stream.
    pub fn is_finished(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|s| s.finished)
            .unwrap_or(true)
    }

    /// Wait up to `limit` for end of stream without detaching.
    ///
    /// Returns whether the pump finished.
    pub fn wait_eof(&self, limit: Duration) -> Result<bool> {
        let state = self
            .shared
            .state
            .lock()
            .map_err(|_| ZrunError::LockPoisoned)?;
        let (state, _) = self
            .shared
            .done
            .wait_timeout_while(state, limit, |s| !s.finished)
            .map_err(|_| ZrunError::LockPoisoned)?;
        Ok(state.finished)
    }

    /// Collect the captured output.
    ///
    /// Waits for end of stream, at most `limit` when given. A pump still
    /// blocked after that (a descendant kept the pipe open) is detached: it
    /// forwards nothing further and its thread exits on its next read.
    pub fn finish(mut self, limit: Option<Duration>) -> Result<PumpOutput> {
        let state = self
            .shared
            .state
            .lock()
            .map_err(|_| ZrunError::LockPoisoned)?;
        let mut state = match limit {
            Some(limit) => {
                self.shared
                    .done
                    .wait_timeout_while(state, limit, |s| !s.finished)
                    .map_err(|_| ZrunError::LockPoisoned)?
                    .0
            }
            None => self
                .shared
                .done
                .wait_while(state, |s| !s.finished)
                .map_err(|_| ZrunError::LockPoisoned)?,
        };

        state.detached = true;
        state.events = None;
        let output = PumpOutput {
            bytes: std::mem::take(&mut state.bytes),
            complete: state.finished,
        };
        drop(state);

        if output.complete {
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        } else {
            debug!(stream = self.stream.name(), "pump detached before EOF");
        }
        Ok(output)
    }
}
