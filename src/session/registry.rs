//! Session registry: named, independently addressable PTY sessions.
//!
//! The registry maps caller-chosen ids to live [`Session`]s. Removal happens
//! from two directions, an explicit close and the watcher task observing the
//! process exit on its own. Both removals are checked against the session
//! identity they resolved, so whichever runs second finds nothing to do and
//! a watcher can never evict a successor created under a reused id.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::Serialize;

use super::keys;
use super::pty::{Session, SessionError, SessionId};
use crate::config::Config;

/// Per-session overrides applied at creation.
///
/// Unset fields fall back to the registry's [`Config`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Shell to spawn instead of the configured default.
    pub shell: Option<String>,

    /// Initial terminal width in columns.
    pub cols: Option<u16>,

    /// Initial terminal height in rows.
    pub rows: Option<u16>,

    /// Working directory for the shell. Inherited when unset.
    pub cwd: Option<PathBuf>,

    /// Extra environment variables, applied on top of the inherited ones.
    pub env: Vec<(String, String)>,
}

/// Point-in-time snapshot of a session's state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Session identifier.
    pub id: SessionId,

    /// Process ID of the shell, if available.
    pub pid: Option<u32>,

    /// Terminal width in columns.
    pub cols: u16,

    /// Terminal height in rows.
    pub rows: u16,

    /// Whether the process is still running.
    pub active: bool,

    /// Bytes of output accumulated and not yet read.
    pub buffered_bytes: usize,
}

/// Manages the registry of PTY sessions.
#[allow(async_fn_in_trait)]
pub trait SessionRegistry: Send + Sync {
    /// Creates a new session under the given id and starts its watcher.
    async fn create(&self, session_id: &str, options: SessionOptions)
        -> Result<(), SessionError>;

    /// Writes raw bytes to a session's PTY.
    async fn write(&self, session_id: &str, input: &[u8]) -> Result<(), SessionError>;

    /// Sends a named key to a session, falling back to the literal text for
    /// unrecognized names.
    async fn send_key(&self, session_id: &str, key: &str) -> Result<(), SessionError>;

    /// Drains and returns all output accumulated since the last read.
    fn read(&self, session_id: &str) -> Result<Vec<u8>, SessionError>;

    /// Resizes a session's PTY.
    async fn resize(&self, session_id: &str, cols: u16, rows: u16)
        -> Result<(), SessionError>;

    /// Returns the ids of all registered sessions.
    fn list(&self) -> Vec<SessionId>;

    /// Kills a session's process and removes it from the registry.
    async fn close(&self, session_id: &str) -> Result<(), SessionError>;

    /// Closes every registered session.
    async fn close_all(&self);

    /// Returns a snapshot of a session's state, or `None` if unknown.
    fn get(&self, session_id: &str) -> Option<SessionInfo>;

    /// Returns the number of registered sessions.
    fn count(&self) -> usize;
}

/// Default implementation of [`SessionRegistry`].
///
/// Cheap to construct; independent instances manage disjoint session sets.
pub struct SessionRegistryImpl {
    /// Active sessions by id. Shared weakly with each watcher task.
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,

    /// Defaults applied when [`SessionOptions`] leaves a field unset.
    config: Config,
}

impl SessionRegistryImpl {
    /// Creates a registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a registry with the given configuration.
    pub fn with_config(config: Config) -> Self {
        SessionRegistryImpl {
            sessions: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Returns the registry's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn lookup(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }
}

impl Default for SessionRegistryImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry for SessionRegistryImpl {
    async fn create(
        &self,
        session_id: &str,
        options: SessionOptions,
    ) -> Result<(), SessionError> {
        if session_id.is_empty() {
            return Err(SessionError::EmptyId);
        }

        if self.sessions.contains_key(session_id) {
            return Err(SessionError::AlreadyExists(session_id.to_string()));
        }

        let shell = options
            .shell
            .unwrap_or_else(|| self.config.session.default_shell.clone());
        let cols = options.cols.unwrap_or(self.config.session.default_cols);
        let rows = options.rows.unwrap_or(self.config.session.default_rows);
        // A cap wider than the address space is effectively unbounded.
        let max_buffer = self
            .config
            .buffer
            .max_bytes
            .map(|bytes| usize::try_from(bytes).unwrap_or(usize::MAX));

        let session = Arc::new(Session::spawn(
            session_id.to_string(),
            &shell,
            cols,
            rows,
            &options.env,
            options.cwd.as_deref(),
            max_buffer,
        )?);
        let pid = session.pid();

        // Insert before the watcher starts so the exit observer can never
        // run against an unregistered session.
        self.sessions
            .insert(session_id.to_string(), Arc::clone(&session));

        let sessions = Arc::downgrade(&self.sessions);
        let watched = Arc::clone(&session);
        let exit_id = session_id.to_string();
        session.start_read_loop(move || {
            remove_watched(&sessions, &watched, &exit_id);
        });

        tracing::info!(
            session_id = %session_id,
            pid = ?pid,
            shell = %shell,
            cols = cols,
            rows = rows,
            "Created new session"
        );

        Ok(())
    }

    async fn write(&self, session_id: &str, input: &[u8]) -> Result<(), SessionError> {
        let session = self.lookup(session_id)?;
        session.write(input).await
    }

    async fn send_key(&self, session_id: &str, key: &str) -> Result<(), SessionError> {
        let session = self.lookup(session_id)?;

        match keys::key_sequence(key) {
            Some(seq) => session.write(seq.as_bytes()).await,
            // Not a named key: forward the text as-is.
            None => session.write(key.as_bytes()).await,
        }
    }

    fn read(&self, session_id: &str) -> Result<Vec<u8>, SessionError> {
        let session = self.lookup(session_id)?;
        session.take_output()
    }

    async fn resize(
        &self,
        session_id: &str,
        cols: u16,
        rows: u16,
    ) -> Result<(), SessionError> {
        let session = self.lookup(session_id)?;
        session.resize(cols, rows).await
    }

    fn list(&self) -> Vec<SessionId> {
        self.sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    async fn close(&self, session_id: &str) -> Result<(), SessionError> {
        let session = self.lookup(session_id)?;

        // Kill failures are expected when the process exited on its own
        // moments ago; removal proceeds regardless.
        if let Err(e) = session.terminate().await {
            tracing::debug!(
                session_id = %session_id,
                error = %e,
                "Kill during close failed"
            );
        }

        // Remove only the session this close resolved. If the exit observer
        // got there first and the id was instantly reused, the newcomer's
        // entry stays.
        if self
            .sessions
            .remove_if(session_id, |_, current| Arc::ptr_eq(current, &session))
            .is_some()
        {
            tracing::info!(session_id = %session_id, "Session closed and removed");
        }

        Ok(())
    }

    async fn close_all(&self) {
        let ids: Vec<SessionId> = self.list();

        tracing::info!(count = ids.len(), "Closing all sessions");

        for id in ids {
            match self.close(&id).await {
                Ok(()) => {}
                // Already removed by its exit observer; not a failure.
                Err(SessionError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "Failed to close session");
                }
            }
        }
    }

    fn get(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.get(session_id).map(|entry| {
            let session = entry.value();
            let (cols, rows) = session.size();
            SessionInfo {
                id: session.id().clone(),
                pid: session.pid(),
                cols,
                rows,
                active: session.is_active(),
                buffered_bytes: session.buffered_bytes(),
            }
        })
    }

    fn count(&self) -> usize {
        self.sessions.len()
    }
}

/// Removes a session's map entry only while the id still points at it.
///
/// Called by watcher tasks after the process exits. Ids can be reused the
/// moment an entry is removed, so removal is identity-checked: a watcher
/// evicts the session it watched, never a successor under the same id. The
/// weak reference keeps a lingering watcher from prolonging the life of a
/// dropped registry.
fn remove_watched(
    sessions: &Weak<DashMap<SessionId, Arc<Session>>>,
    watched: &Arc<Session>,
    session_id: &str,
) {
    if let Some(sessions) = sessions.upgrade() {
        if sessions
            .remove_if(session_id, |_, current| Arc::ptr_eq(current, watched))
            .is_some()
        {
            tracing::info!(session_id = %session_id, "Session removed after process exit");
        }
    }
}
