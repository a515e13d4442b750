//! Overlap - streaming chat client library
//!
//! This library provides the pieces behind the `overlap` CLI: a streaming
//! client for an event-stream conversation endpoint and a durable,
//! file-backed conversation history.
//!
//! # Architecture
//!
//! - `stream`: incremental decoding of event-stream bodies, the cancellable
//!   HTTP client and the current-stream slot
//! - `storage`: conversation history persisted as one JSON document
//! - `chat`: one user turn, from storing the message to storing the reply
//! - `identity`: user identity attached to requests
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`, `commands`, `logging`: the command-line surface
//!
//! # Example
//!
//! ```no_run
//! use overlap::storage::{ConversationStore, Role};
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = ConversationStore::open("/tmp/overlap-history.json")?;
//!     store.add_message("conv-1", Role::User, "Hello")?;
//!     for summary in store.list() {
//!         println!("{} {}", summary.id, summary.title);
//!     }
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod storage;
pub mod stream;

// Re-export commonly used types
pub use chat::{ChatSession, TurnOutcome};
pub use config::Config;
pub use error::{OverlapError, Result};
pub use identity::Identity;
pub use storage::ConversationStore;
pub use stream::StreamingClient;

#[cfg(test)]
pub mod test_utils;
