//! Streaming conversation client
//!
//! - `decoder`: byte chunks to text fragments (UTF-8 reassembly, event
//!   framing, challenge-page detection)
//! - `session`: per-request state that accumulates delivered text
//! - `client`: HTTP dispatch and the cancellable read loop
//! - `slot`: which stream a chat view is currently rendering
//! - `payload`: the JSON body posted for a turn

pub mod client;
pub mod decoder;
pub mod payload;
pub mod session;
pub mod slot;

pub use client::{consume_event_stream, StreamingClient};
pub use decoder::{EventDecoder, Fragment, FragmentKind};
pub use payload::{extract_fragment, ChatOptions, ConversationRequest};
pub use session::StreamSession;
pub use slot::{StreamHandle, StreamSlot};
