//! PTY-backed session processes.
//!
//! A [`Session`] owns one shell process attached to a pseudo-terminal: the
//! PTY master, the input writer, the child handle, and the output accumulated
//! since the last read. Output capture and exit observation run on a
//! dedicated watcher task per session.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tokio::sync::Mutex;

use super::buffer::OutputBuffer;

/// Unique identifier for a session. Chosen by the caller at creation.
pub type SessionId = String;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A session with this id is already registered.
    #[error("session already exists: {0}")]
    AlreadyExists(SessionId),

    /// No session with this id is registered.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The session exists but its process has exited or been closed.
    #[error("session not active: {0}")]
    NotActive(SessionId),

    /// Session ids must be non-empty.
    #[error("session id must not be empty")]
    EmptyId,

    /// Failed to spawn the PTY.
    #[error("failed to spawn PTY: {0}")]
    SpawnFailed(String),

    /// Failed to write to the PTY.
    #[error("failed to write to PTY: {0}")]
    WriteFailed(String),

    /// Failed to resize the PTY.
    #[error("failed to resize PTY: {0}")]
    ResizeFailed(String),

    /// Failed to kill the session process.
    #[error("failed to kill session: {0}")]
    KillFailed(String),
}

/// Buffer size for reading from the PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// Terminal type advertised to spawned processes.
const TERM_NAME: &str = "xterm-color";

/// A PTY session with a shell process.
///
/// Every mutable field is synchronized individually so sessions can be shared
/// as `Arc<Session>`: callers write and resize while the watcher task appends
/// output and observes exit.
pub struct Session {
    /// Unique session identifier.
    id: SessionId,

    /// The PTY master handle.
    master: Mutex<Box<dyn MasterPty + Send>>,

    /// The writer for the PTY.
    writer: Mutex<Box<dyn Write + Send>>,

    /// The child process.
    child: Mutex<Box<dyn Child + Send + Sync>>,

    /// Output accumulated since the last read.
    output: std::sync::Mutex<OutputBuffer>,

    /// False once the process has exited or the session was closed.
    active: AtomicBool,

    /// Current terminal size.
    cols: AtomicU16,
    rows: AtomicU16,

    /// Process ID of the shell.
    pid: Option<u32>,
}

impl Session {
    /// Spawns a shell attached to a fresh PTY.
    ///
    /// The child inherits the calling process's environment and working
    /// directory unless overridden; `TERM` is always set. The watcher task is
    /// not started here, see [`Session::start_read_loop`].
    pub fn spawn(
        id: SessionId,
        shell: &str,
        cols: u16,
        rows: u16,
        env: &[(String, String)],
        cwd: Option<&Path>,
        max_buffer_bytes: Option<usize>,
    ) -> Result<Self, SessionError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(shell);

        // Set before the caller's env so an explicit TERM override wins.
        cmd.env("TERM", TERM_NAME);

        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }

        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let pid = child.process_id();

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        Ok(Session {
            id,
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
            output: std::sync::Mutex::new(OutputBuffer::new(max_buffer_bytes)),
            active: AtomicBool::new(true),
            cols: AtomicU16::new(cols),
            rows: AtomicU16::new(rows),
            pid,
        })
    }

    /// Returns the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the process ID of the shell, if available.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns the current terminal size as (cols, rows).
    pub fn size(&self) -> (u16, u16) {
        (
            self.cols.load(Ordering::SeqCst),
            self.rows.load(Ordering::SeqCst),
        )
    }

    /// Returns whether the session is still active.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns the number of bytes accumulated and not yet read.
    pub fn buffered_bytes(&self) -> usize {
        self.output.lock().unwrap().len()
    }

    /// Writes data to the PTY (stdin of the shell).
    ///
    /// Input is forwarded verbatim and flushed; no acknowledgment from the
    /// process is awaited.
    pub async fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::NotActive(self.id.clone()));
        }

        let mut writer = self.writer.lock().await;
        writer
            .write_all(data)
            .map_err(|e| SessionError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| SessionError::WriteFailed(e.to_string()))?;

        Ok(())
    }

    /// Drains everything accumulated since the last read.
    ///
    /// Non-blocking: returns an empty vec when no output has arrived. Bytes
    /// appended after the drain are deferred to the next read, not lost.
    pub fn take_output(&self) -> Result<Vec<u8>, SessionError> {
        if !self.is_active() {
            return Err(SessionError::NotActive(self.id.clone()));
        }

        let mut output = self.output.lock().unwrap();
        let dropped = output.dropped_since_take();
        let data = output.take();
        drop(output);

        if dropped > 0 {
            tracing::debug!(
                session_id = %self.id,
                dropped_bytes = dropped,
                "Buffer cap dropped oldest output since last read"
            );
        }

        Ok(data)
    }

    /// Appends a chunk captured by the watcher task.
    fn append_output(&self, chunk: &[u8]) {
        let mut output = self.output.lock().unwrap();
        let already_dropping = output.dropped_since_take() > 0;
        let dropped = output.append(chunk);
        let buffered = output.len();
        drop(output);

        // Warn once per accounting window, not once per chunk.
        if dropped > 0 && !already_dropping {
            tracing::warn!(
                session_id = %self.id,
                buffered_bytes = buffered,
                "Output buffer reached its cap, dropping oldest bytes"
            );
        }
    }

    /// Resizes the PTY to the given dimensions.
    ///
    /// Leaves the output buffer and the active flag untouched.
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::NotActive(self.id.clone()));
        }

        let master = self.master.lock().await;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::ResizeFailed(e.to_string()))?;
        drop(master);

        self.cols.store(cols, Ordering::SeqCst);
        self.rows.store(rows, Ordering::SeqCst);

        tracing::debug!(
            session_id = %self.id,
            cols = cols,
            rows = rows,
            "Resized PTY"
        );

        Ok(())
    }

    /// Marks the session inactive and kills the process.
    ///
    /// Reaping is left to the watcher task, which observes the resulting EOF.
    /// Killing a process that already exited reports `KillFailed`; callers on
    /// the close path treat that as expected.
    pub async fn terminate(&self) -> Result<(), SessionError> {
        self.active.store(false, Ordering::SeqCst);

        let mut child = self.child.lock().await;
        child
            .kill()
            .map_err(|e| SessionError::KillFailed(e.to_string()))
    }

    /// Starts the watcher task that captures output and observes exit.
    ///
    /// The task reads the PTY in blocking chunks and appends them to the
    /// output buffer. EOF or a read error means the process side is gone: the
    /// session is marked inactive, the child reaped, the exit code logged,
    /// and `on_exit` invoked exactly once.
    pub fn start_read_loop(self: Arc<Self>, on_exit: impl FnOnce() + Send + 'static) {
        let session = self;

        tokio::spawn(async move {
            let reader = {
                let master = session.master.lock().await;
                match master.try_clone_reader() {
                    Ok(reader) => Some(reader),
                    Err(e) => {
                        tracing::error!(
                            session_id = %session.id,
                            error = %e,
                            "Failed to get PTY reader"
                        );
                        None
                    }
                }
            };

            if let Some(reader) = reader {
                // Handed to blocking tasks one chunk at a time.
                let reader = Arc::new(std::sync::Mutex::new(reader));

                loop {
                    if !session.is_active() {
                        tracing::debug!(
                            session_id = %session.id,
                            "Read loop stopping: session no longer active"
                        );
                        break;
                    }

                    let reader_clone = Arc::clone(&reader);
                    let result = tokio::task::spawn_blocking(move || {
                        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
                        let mut reader = reader_clone.lock().unwrap();
                        match reader.read(&mut buffer) {
                            Ok(0) => Ok(None), // EOF
                            Ok(n) => {
                                buffer.truncate(n);
                                Ok(Some(buffer))
                            }
                            Err(e) => Err(e),
                        }
                    })
                    .await;

                    match result {
                        Ok(Ok(Some(chunk))) => session.append_output(&chunk),
                        Ok(Ok(None)) => {
                            tracing::debug!(session_id = %session.id, "PTY EOF");
                            break;
                        }
                        Ok(Err(e)) => {
                            // Linux reports EIO on the master once the child
                            // side is gone; either way the process is over.
                            tracing::debug!(
                                session_id = %session.id,
                                error = %e,
                                "PTY read ended"
                            );
                            break;
                        }
                        Err(e) => {
                            tracing::error!(
                                session_id = %session.id,
                                error = %e,
                                "Read task panicked"
                            );
                            break;
                        }
                    }
                }
            }

            session.active.store(false, Ordering::SeqCst);

            let exit_code = {
                let mut child = session.child.lock().await;
                // The child is normally dead already; the kill covers the
                // pathological path where no reader could be obtained and
                // keeps the wait below from blocking on a live process.
                let _ = child.kill();
                match child.wait() {
                    Ok(status) => Some(status.exit_code()),
                    Err(e) => {
                        tracing::debug!(
                            session_id = %session.id,
                            error = %e,
                            "Could not collect exit status"
                        );
                        None
                    }
                }
            };

            tracing::info!(
                session_id = %session.id,
                exit_code = ?exit_code,
                "Session process exited"
            );

            on_exit();
        });
    }
}
