//! One chat turn, end to end
//!
//! [`ChatSession::send_turn`] records the user message, streams the reply
//! through the current-stream slot and stores the reply only when the stream
//! finished. Cancellation and failures leave the stored conversation with
//! the user message alone and hand the partial text back to the caller.

use std::sync::Arc;

use crate::config::Config;
use crate::error::{OverlapError, Result};
use crate::identity::Identity;
use crate::storage::{Conversation, ConversationStore, Role};
use crate::stream::{ChatOptions, ConversationRequest, StreamSlot, StreamingClient};

/// Characters of the first message used as the provisional title
pub const PROVISIONAL_TITLE_MAX_CHARS: usize = 48;

/// How a turn ended
#[derive(Debug)]
pub enum TurnOutcome {
    /// The reply streamed to the end and was stored
    Completed {
        conversation: Conversation,
        reply: String,
    },
    /// The stream was cancelled; `partial` is what had been shown
    Stopped { partial: String },
    /// The request or the stream failed
    Failed {
        partial: String,
        error: anyhow::Error,
    },
}

impl TurnOutcome {
    /// Text shown to the user for this turn, including the status marker
    pub fn rendered(&self) -> String {
        match self {
            TurnOutcome::Completed { reply, .. } => reply.clone(),
            TurnOutcome::Stopped { partial } => format!("{} [aborted]", partial),
            TurnOutcome::Failed { partial, .. } => format!("{} [error]", partial),
        }
    }
}

enum Responder {
    Remote {
        client: StreamingClient,
        identity: Identity,
    },
    Mock,
}

/// Sends turns for one user and keeps their history
pub struct ChatSession {
    store: Arc<ConversationStore>,
    responder: Responder,
    options: ChatOptions,
    slot: StreamSlot,
}

impl ChatSession {
    /// Session that talks to the backend as `identity`
    pub fn remote(
        store: Arc<ConversationStore>,
        client: StreamingClient,
        identity: Identity,
        options: ChatOptions,
    ) -> Self {
        let client = client.with_identity(identity.clone());
        Self {
            store,
            responder: Responder::Remote { client, identity },
            options,
            slot: StreamSlot::new(),
        }
    }

    /// Session that answers locally without any network access
    pub fn mock(store: Arc<ConversationStore>) -> Self {
        Self {
            store,
            responder: Responder::Mock,
            options: ChatOptions::default(),
            slot: StreamSlot::new(),
        }
    }

    /// Build a session from configuration
    ///
    /// # Errors
    ///
    /// Returns `OverlapError::MissingIdentity` when not in mock mode and no
    /// user id is configured, or `OverlapError::Config` for a bad endpoint.
    pub fn from_config(config: &Config, store: Arc<ConversationStore>) -> Result<Self> {
        if config.chat.mock {
            tracing::info!("Mock mode enabled, replies are generated locally");
            return Ok(Self::mock(store));
        }

        let identity = Identity::from_config(&config.identity)?;
        let client = StreamingClient::from_config(&config.server)?;
        let options = ChatOptions {
            model: config.chat.model.clone(),
            jailbreak: config.chat.jailbreak.clone(),
            internet_access: config.chat.internet_access,
            api_key: config.chat.api_key.clone().filter(|k| !k.is_empty()),
        };

        Ok(Self::remote(store, client, identity, options))
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Slot holding the stream currently being rendered
    ///
    /// Cancelling it ("stop generating") ends the running turn with
    /// [`TurnOutcome::Stopped`].
    pub fn slot(&self) -> &StreamSlot {
        &self.slot
    }

    pub fn is_mock(&self) -> bool {
        matches!(self.responder, Responder::Mock)
    }

    /// Send `text` as a user turn in `conversation_id`
    ///
    /// Any turn already streaming in this session is cancelled first.
    ///
    /// # Errors
    ///
    /// Only storage failures are returned as errors; stream problems are
    /// reported through [`TurnOutcome`].
    pub async fn send_turn<F>(
        &self,
        conversation_id: &str,
        text: &str,
        mut on_fragment: F,
    ) -> Result<TurnOutcome>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(anyhow::anyhow!(OverlapError::Config(
                "cannot send an empty message".to_string()
            )));
        }

        // Existing conversations keep their title.
        let history = match self.store.get(conversation_id) {
            Some(existing) => existing.messages,
            None => {
                let title = provisional_title(text);
                self.store.add_conversation(conversation_id, &title)?;
                Vec::new()
            }
        };
        self.store.add_message(conversation_id, Role::User, text)?;

        let (client, identity) = match &self.responder {
            Responder::Mock => {
                let reply = mock_reply(text);
                if let Err(e) = on_fragment(&reply) {
                    tracing::warn!("Fragment callback failed: {:#}", e);
                }
                let conversation =
                    self.store
                        .add_message(conversation_id, Role::Assistant, &reply)?;
                return Ok(TurnOutcome::Completed {
                    conversation,
                    reply,
                });
            }
            Responder::Remote { client, identity } => (client, identity),
        };

        let request =
            ConversationRequest::for_turn(conversation_id, &self.options, identity, history, text);

        let handle = self.slot.begin();
        tracing::debug!(
            conversation_id = %conversation_id,
            stream_id = handle.id(),
            "Starting turn"
        );

        let mut partial = String::new();
        let result = client
            .send(
                &request,
                |fragment| {
                    partial.push_str(fragment);
                    on_fragment(fragment)
                },
                handle.token(),
            )
            .await;
        handle.finish();

        match result {
            Ok(reply) => {
                let conversation =
                    self.store
                        .add_message(conversation_id, Role::Assistant, &reply)?;
                tracing::info!(
                    conversation_id = %conversation_id,
                    messages = conversation.messages.len(),
                    "Turn completed"
                );
                Ok(TurnOutcome::Completed {
                    conversation,
                    reply,
                })
            }
            Err(e) if OverlapError::is_cancellation(&e) => {
                tracing::info!(conversation_id = %conversation_id, "Turn stopped by user");
                Ok(TurnOutcome::Stopped { partial })
            }
            Err(error) => {
                tracing::error!(conversation_id = %conversation_id, "Turn failed: {:#}", error);
                Ok(TurnOutcome::Failed { partial, error })
            }
        }
    }
}

/// Title used when a turn creates its conversation
fn provisional_title(text: &str) -> String {
    text.chars()
        .take(PROVISIONAL_TITLE_MAX_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Reply produced in mock mode
pub fn mock_reply(text: &str) -> String {
    format!("Echo: {}\n\n(Local simulated response.)", text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use crate::test_utils::{assert_error_contains, sse_body};
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store() -> Arc<ConversationStore> {
        Arc::new(ConversationStore::new(MemoryBackend::new()))
    }

    async fn remote_session(server: &MockServer, store: Arc<ConversationStore>) -> ChatSession {
        let endpoint = format!("{}/backend-api/v2/conversation", server.uri());
        let client = StreamingClient::new(endpoint.parse().unwrap()).unwrap();
        ChatSession::remote(
            store,
            client,
            Identity::new("user_1").with_team("team_1"),
            ChatOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_mock_turn_echoes_and_persists() {
        let store = store();
        let session = ChatSession::mock(Arc::clone(&store));
        let mut shown = String::new();

        let outcome = session
            .send_turn("c1", "  Hello  ", |f| {
                shown.push_str(f);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(shown, "Echo: Hello\n\n(Local simulated response.)");
        let TurnOutcome::Completed { conversation, .. } = outcome else {
            panic!("expected completed turn");
        };
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[0].content, "Hello");
        assert_eq!(conversation.messages[1].role, Role::Assistant);
        assert_eq!(conversation.title, "Hello");
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let store = store();
        let session = ChatSession::mock(Arc::clone(&store));
        assert_error_contains(
            session.send_turn("c1", "   ", |_| Ok(())).await,
            "empty message",
        );
        assert!(store.list().is_empty());
    }

    #[tokio::test]
    async fn test_remote_turn_stores_reply_and_sends_prior_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/backend-api/v2/conversation"))
            .and(header("x-user-id", "user_1"))
            .and(header("accept", "text/event-stream"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body(&["He", "llo"]), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let store = store();
        store.add_message("c1", Role::User, "earlier").unwrap();
        store.add_message("c1", Role::Assistant, "reply").unwrap();
        let session = remote_session(&server, Arc::clone(&store)).await;

        let outcome = session.send_turn("c1", "Hi", |_| Ok(())).await.unwrap();
        match outcome {
            TurnOutcome::Completed { reply, conversation } => {
                assert_eq!(reply, "Hello");
                assert_eq!(conversation.messages.len(), 4);
                assert_eq!(conversation.messages[3].content, "Hello");
                assert_eq!(conversation.title, "earlier");
            }
            other => panic!("expected completed turn, got {:?}", other),
        }

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["conversation_id"], "c1");
        assert_eq!(body["action"], "_ask");
        assert_eq!(body["meta"]["user"]["team_id"], "team_1");
        assert_eq!(body["meta"]["content"]["conversation"].as_array().unwrap().len(), 2);
        assert_eq!(body["meta"]["content"]["parts"][0]["content"], "Hi");
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_only_user_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let store = store();
        let session = remote_session(&server, Arc::clone(&store)).await;
        let outcome = session.send_turn("c9", "Hello", |_| Ok(())).await.unwrap();

        match &outcome {
            TurnOutcome::Failed { partial, error } => {
                assert!(partial.is_empty());
                assert!(matches!(
                    error.downcast_ref::<OverlapError>(),
                    Some(OverlapError::HttpStatus { status: 500, .. })
                ));
            }
            other => panic!("expected failed turn, got {:?}", other),
        }
        assert_eq!(outcome.rendered(), " [error]");

        let stored = store.get("c9").unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_cancelled_turn_is_stopped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(b"data: late\n\n".to_vec(), "text/event-stream")
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let store = store();
        let session = Arc::new(remote_session(&server, Arc::clone(&store)).await);

        let canceller = Arc::clone(&session);
        let stop = tokio::spawn(async move {
            for _ in 0..200 {
                if canceller.slot().cancel_current() {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            false
        });

        let outcome = session.send_turn("c2", "Hello", |_| Ok(())).await.unwrap();
        assert!(stop.await.unwrap());
        assert!(matches!(outcome, TurnOutcome::Stopped { .. }));
        assert_eq!(outcome.rendered(), " [aborted]");
        assert_eq!(store.get("c2").unwrap().messages.len(), 1);
        assert!(!session.slot().is_busy());
    }

    #[test]
    fn test_from_config_requires_identity_outside_mock_mode() {
        let config = Config::default();
        let err = ChatSession::from_config(&config, store()).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<OverlapError>(),
            Some(OverlapError::MissingIdentity(_))
        ));

        let mut config = Config::default();
        config.chat.mock = true;
        assert!(ChatSession::from_config(&config, store()).unwrap().is_mock());
    }

    #[test]
    fn test_provisional_title() {
        let long = "x".repeat(60);
        assert_eq!(provisional_title(&long).chars().count(), 48);
        assert_eq!(provisional_title("short "), "short");
    }
}
