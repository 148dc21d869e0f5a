//! # PtyHive
//!
//! This crate provides a registry of independently addressable pseudo-terminal
//! sessions, each running a shell whose output is captured and buffered until
//! read.
//!
//! ## Overview
//!
//! A [`SessionRegistryImpl`] manages any number of named sessions. It provides:
//!
//! - **Lifecycle**: Spawn a shell on a fresh PTY under a caller-chosen id,
//!   close it on demand, and reap it automatically when the process exits
//! - **Buffered I/O**: Forward raw input or named key sequences to a session,
//!   and drain everything it has printed since the last read
//! - **Introspection**: List sessions, count them, and snapshot per-session
//!   state (pid, size, activity, pending output)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 SessionRegistryImpl                 │
//! ├─────────────────────────────────────────────────────┤
//! │                                                     │
//! │   DashMap<SessionId, Arc<Session>>                  │
//! │        │                                            │
//! │        ├── Session "build"  ◄── watcher task        │
//! │        │     shell + PTY + output buffer            │
//! │        │                                            │
//! │        └── Session "logs"   ◄── watcher task        │
//! │              shell + PTY + output buffer            │
//! │                                                     │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Each session owns one watcher task that drains the PTY into the session's
//! output buffer and removes the session from the registry when the process
//! exits on its own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ptyhive::{SessionOptions, SessionRegistry, SessionRegistryImpl};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = SessionRegistryImpl::new();
//!
//!     // Spawn a shell under a caller-chosen id
//!     registry.create("build", SessionOptions::default()).await?;
//!
//!     // Type a command and submit it
//!     registry.write("build", b"cargo build").await?;
//!     registry.send_key("build", "enter").await?;
//!
//!     // Drain whatever has been printed so far
//!     let output = registry.read("build")?;
//!     println!("{}", String::from_utf8_lossy(&output));
//!
//!     registry.close("build").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: PTY sessions, the registry, key translation, output buffering

pub mod config;
pub mod session;

// Re-export config types for convenience
pub use config::{BufferConfig, Config, ConfigError, RegistryConfig, SessionConfig};

// Re-export session types for convenience
pub use session::{
    key_sequence, OutputBuffer, Session, SessionError, SessionId, SessionInfo, SessionOptions,
    SessionRegistry, SessionRegistryImpl,
};
