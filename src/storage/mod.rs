//! Durable conversation history
//!
//! [`ConversationStore`] keeps every conversation in one JSON document keyed
//! by conversation id. Each call loads the document, applies one change and
//! writes it back while holding the store lock, so concurrent callers see
//! either the state before or after a call and never a mix.
//!
//! Reads never fail: a document that cannot be decoded is logged and treated
//! as an empty store. Writes refuse to run over a document that could not be
//! read at all, so a transient I/O error never replaces intact history.

use crate::error::{OverlapError, Result};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

pub mod backend;
pub mod types;

pub use backend::{JsonFileBackend, MemoryBackend, StateBackend, HISTORY_FILE_ENV};
pub use types::{Conversation, ConversationSummary, Message, Role};

use types::{char_prefix, next_timestamp, now_millis};

/// Title given to conversations created without one
pub const DEFAULT_TITLE: &str = "New Chat";

/// Characters of the first user message kept in the automatic title
pub const AUTO_TITLE_MAX_CHARS: usize = 40;

/// Characters of the content used when a message creates its conversation
pub const IMPLICIT_TITLE_MAX_CHARS: usize = 30;

const ELLIPSIS: &str = "...";

/// Whole persisted document
type ConversationMap = BTreeMap<String, Conversation>;

/// Generate a fresh conversation identifier
pub fn new_conversation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Persistent mapping from conversation id to its ordered messages
pub struct ConversationStore {
    backend: Box<dyn StateBackend>,
    lock: Mutex<()>,
}

impl ConversationStore {
    /// Create a store over any backend
    pub fn new(backend: impl StateBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            lock: Mutex::new(()),
        }
    }

    /// Store backed by the default history file (see [`JsonFileBackend::new`])
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(JsonFileBackend::new()?))
    }

    /// Store backed by the history file at `path`
    pub fn open<P: Into<std::path::PathBuf>>(path: P) -> Result<Self> {
        Ok(Self::new(JsonFileBackend::new_with_path(path)?))
    }

    /// Store that lives only in this process
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// All conversations, most recently active first
    ///
    /// Conversations with equal `updated_at` are ordered by id.
    pub fn list(&self) -> Vec<ConversationSummary> {
        let _guard = self.guard();
        let map = self.load_map();

        let mut summaries: Vec<ConversationSummary> =
            map.values().map(ConversationSummary::from).collect();
        summaries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        summaries
    }

    /// Look up a conversation by id
    pub fn get(&self, id: &str) -> Option<Conversation> {
        let _guard = self.guard();
        self.load_map().remove(id)
    }

    /// Resolve a full id or a unique id prefix to a stored id
    ///
    /// An exact match wins. Otherwise `id_or_prefix` must be the prefix of
    /// exactly one id, as shown by `history list`. Returns `None` when
    /// nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `OverlapError::Storage` when the prefix matches more than one
    /// conversation.
    pub fn resolve_id(&self, id_or_prefix: &str) -> Result<Option<String>> {
        let _guard = self.guard();
        let map = self.load_map();

        if map.contains_key(id_or_prefix) {
            return Ok(Some(id_or_prefix.to_string()));
        }
        if id_or_prefix.is_empty() {
            return Ok(None);
        }

        let mut matches = map.keys().filter(|id| id.starts_with(id_or_prefix));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(Some(id.clone())),
            (None, _) => Ok(None),
            (Some(_), Some(_)) => Err(OverlapError::Storage(format!(
                "Ambiguous conversation id prefix: {}",
                id_or_prefix
            ))
            .into()),
        }
    }

    /// Create a conversation, or retitle an existing one
    ///
    /// A new conversation starts with no messages and `created_at ==
    /// updated_at`. For an existing conversation only a non-empty `title`
    /// replaces the current one; messages and timestamps are left alone.
    pub fn add_conversation(&self, id: &str, title: &str) -> Result<Conversation> {
        let _guard = self.guard();
        let mut map = self.load_for_update()?;

        match map.get_mut(id) {
            Some(existing) => {
                if !title.is_empty() {
                    existing.title = title.to_string();
                }
            }
            None => {
                let title = if title.is_empty() { DEFAULT_TITLE } else { title };
                map.insert(id.to_string(), empty_conversation(id, title));
                tracing::debug!(conversation_id = %id, "Created conversation");
            }
        }

        let conversation = map[id].clone();
        self.save_map(&map)?;
        Ok(conversation)
    }

    /// Append a message, creating the conversation if needed
    ///
    /// The first message of a conversation, when written by the user, also
    /// becomes its title (cut to [`AUTO_TITLE_MAX_CHARS`] characters with a
    /// trailing `...` when longer).
    pub fn add_message(&self, id: &str, role: Role, content: &str) -> Result<Conversation> {
        let _guard = self.guard();
        let mut map = self.load_for_update()?;

        let conversation = map.entry(id.to_string()).or_insert_with(|| {
            let (prefix, _) = char_prefix(content, IMPLICIT_TITLE_MAX_CHARS);
            let title = if prefix.is_empty() { DEFAULT_TITLE } else { prefix };
            tracing::debug!(conversation_id = %id, "Created conversation on first message");
            empty_conversation(id, title)
        });

        let now = next_timestamp(conversation.updated_at);
        conversation.messages.push(Message {
            role,
            content: content.to_string(),
            timestamp: now,
        });
        conversation.updated_at = now;

        if role == Role::User && conversation.messages.len() == 1 {
            conversation.title = auto_title(content);
        }

        let conversation = conversation.clone();
        self.save_map(&map)?;
        Ok(conversation)
    }

    /// Replace the title of an existing conversation
    ///
    /// Advances `updated_at`. Returns `false` when the id is unknown.
    pub fn rename_conversation(&self, id: &str, title: &str) -> Result<bool> {
        let _guard = self.guard();
        let mut map = self.load_for_update()?;

        let Some(conversation) = map.get_mut(id) else {
            return Ok(false);
        };
        conversation.title = title.to_string();
        conversation.updated_at = next_timestamp(conversation.updated_at);

        self.save_map(&map)?;
        Ok(true)
    }

    /// Remove a conversation and its messages
    ///
    /// Returns `false` (and writes nothing) when the id is unknown.
    pub fn delete_conversation(&self, id: &str) -> Result<bool> {
        let _guard = self.guard();
        let mut map = self.load_for_update()?;

        if map.remove(id).is_none() {
            return Ok(false);
        }

        self.save_map(&map)?;
        tracing::debug!(conversation_id = %id, "Deleted conversation");
        Ok(true)
    }

    /// Remove every conversation
    pub fn clear_all(&self) -> Result<()> {
        let _guard = self.guard();
        self.backend.remove()?;
        tracing::info!("Cleared all conversations");
        Ok(())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load_map(&self) -> ConversationMap {
        match self.backend.load() {
            Ok(document) => decode_or_empty(document),
            Err(e) => {
                tracing::warn!("Conversation history unreadable, treating as empty: {:#}", e);
                ConversationMap::new()
            }
        }
    }

    /// Load before a write; an unreadable document aborts the write
    fn load_for_update(&self) -> Result<ConversationMap> {
        let document = self.backend.load().map_err(|e| {
            tracing::error!("Refusing to write over unreadable history: {:#}", e);
            e
        })?;
        Ok(decode_or_empty(document))
    }

    fn save_map(&self, map: &ConversationMap) -> Result<()> {
        let document = serde_json::to_string(map)?;
        self.backend.save(&document)
    }
}

fn decode_or_empty(document: Option<String>) -> ConversationMap {
    let Some(document) = document else {
        return ConversationMap::new();
    };
    match decode_document(&document) {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!("{}; treating history as empty", e);
            ConversationMap::new()
        }
    }
}

fn decode_document(document: &str) -> std::result::Result<ConversationMap, OverlapError> {
    if document.trim().is_empty() {
        return Ok(ConversationMap::new());
    }
    serde_json::from_str(document).map_err(|e| OverlapError::CorruptState(e.to_string()))
}

fn empty_conversation(id: &str, title: &str) -> Conversation {
    let now = now_millis();
    Conversation {
        id: id.to_string(),
        title: title.to_string(),
        messages: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

fn auto_title(content: &str) -> String {
    match char_prefix(content, AUTO_TITLE_MAX_CHARS) {
        (prefix, true) => format!("{}{}", prefix, ELLIPSIS),
        (prefix, false) => prefix.to_string(),
    }
}
