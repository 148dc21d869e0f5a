//! Session management module.
//!
//! Spawning, addressing, and tearing down PTY-backed shell sessions, plus the
//! output buffering and key translation they rely on.

pub mod buffer;
pub mod keys;
pub mod pty;
pub mod registry;

pub use buffer::OutputBuffer;
pub use keys::key_sequence;
pub use pty::{Session, SessionError, SessionId};
pub use registry::{SessionInfo, SessionOptions, SessionRegistry, SessionRegistryImpl};
