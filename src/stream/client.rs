//! HTTP client for the streaming conversation endpoint

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::session::StreamSession;
use crate::config::ServerConfig;
use crate::error::{OverlapError, Result};
use crate::identity::Identity;

/// Media type requested for the response body
pub const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Default cap on how much of an error body is read
pub const DEFAULT_MAX_ERROR_BODY_BYTES: usize = 8 * 1024;

/// Sends one conversation turn and streams the reply back as fragments
///
/// # Examples
///
/// ```no_run
/// use overlap::stream::StreamingClient;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let client = StreamingClient::new("http://localhost:1338/backend-api/v2/conversation".parse()?)?;
/// let cancel = CancellationToken::new();
/// let text = client
///     .send(
///         &serde_json::json!({"text": "Hi"}),
///         |fragment| {
///             print!("{}", fragment);
///             Ok(())
///         },
///         &cancel,
///     )
///     .await?;
/// println!("\n{} chars", text.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StreamingClient {
    http: reqwest::Client,
    endpoint: Url,
    identity: Option<Identity>,
    max_error_body_bytes: usize,
}

impl StreamingClient {
    /// Client posting to `endpoint` with default settings
    pub fn new(endpoint: Url) -> Result<Self> {
        Self::build(endpoint, None, DEFAULT_MAX_ERROR_BODY_BYTES)
    }

    /// Client configured from the `server` section
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        Self::build(
            endpoint,
            Some(Duration::from_secs(config.connect_timeout_seconds)),
            config.max_error_body_bytes,
        )
    }

    fn build(
        endpoint: Url,
        connect_timeout: Option<Duration>,
        max_error_body_bytes: usize,
    ) -> Result<Self> {
        // No overall request timeout: the body is an unbounded stream.
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            endpoint,
            identity: None,
            max_error_body_bytes,
        })
    }

    /// Attach `X-User-*` headers for this identity to every request
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Target of every POST
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST `payload` and stream the reply
    ///
    /// `on_fragment` receives every fragment in arrival order; an error it
    /// returns is logged and the stream continues. The result is the
    /// concatenation of all delivered fragments.
    ///
    /// # Errors
    ///
    /// - `OverlapError::Cancelled` once `cancel` fires
    /// - `OverlapError::HttpStatus` for a non-success status
    /// - `OverlapError::EmptyBody` for a success without a body
    /// - `OverlapError::Transport` when the request or a read fails
    pub async fn send<P, F>(
        &self,
        payload: &P,
        on_fragment: F,
        cancel: &CancellationToken,
    ) -> Result<String>
    where
        P: Serialize + ?Sized,
        F: FnMut(&str) -> Result<()>,
    {
        if cancel.is_cancelled() {
            return Err(OverlapError::Cancelled.into());
        }

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, EVENT_STREAM_MIME)
            .json(payload);

        if let Some(identity) = &self.identity {
            request = request
                .header("X-User-ID", identity.user_id.as_str())
                .header("X-User-Email", identity.email());
            if let Some(team_id) = &identity.team_id {
                request = request.header("X-Team-ID", team_id.as_str());
            }
        }

        tracing::debug!(endpoint = %self.endpoint, "Dispatching conversation request");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Cancelled before the response arrived");
                return Err(OverlapError::Cancelled.into());
            }
            result = request.send() => result
                .map_err(|e| OverlapError::Transport(format!("request failed: {}", e)))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = read_bounded_body(response, self.max_error_body_bytes, cancel).await?;
            tracing::warn!(status = status.as_u16(), "Conversation request rejected");
            return Err(OverlapError::HttpStatus {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Err(OverlapError::EmptyBody.into());
        }

        consume_event_stream(response.bytes_stream(), on_fragment, cancel).await
    }
}

/// Read an event-stream body to the end, delivering fragments as they decode
///
/// The body is owned here and dropped on every exit path, which releases
/// the underlying connection whether the stream finished, failed or was
/// cancelled. Cancellation abandons the pending read immediately.
pub async fn consume_event_stream<S, E, F>(
    body: S,
    mut on_fragment: F,
    cancel: &CancellationToken,
) -> Result<String>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
    F: FnMut(&str) -> Result<()>,
{
    let mut session = StreamSession::new(cancel.clone());
    tokio::pin!(body);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(
                    delivered = session.delivered(),
                    "Stream cancelled while waiting for data"
                );
                return Err(OverlapError::Cancelled.into());
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(chunk)) => session.feed(&chunk, &mut on_fragment)?,
            Some(Err(e)) => {
                return Err(OverlapError::Transport(format!("read failed: {}", e)).into());
            }
            None => break,
        }
    }

    session.finish(&mut on_fragment)?;
    tracing::debug!(
        fragments = session.delivered(),
        chars = session.text().chars().count(),
        "Stream complete"
    );
    Ok(session.into_text())
}

/// Best-effort read of at most `limit` bytes of an error body
///
/// Read failures end the body early. Cancellation abandons the pending read.
async fn read_bounded_body(
    response: reqwest::Response,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<String> {
    let mut collected: Vec<u8> = Vec::new();
    let stream = response.bytes_stream();
    tokio::pin!(stream);

    while collected.len() < limit {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Cancelled while reading error body");
                return Err(OverlapError::Cancelled.into());
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                let take = chunk.len().min(limit - collected.len());
                collected.extend_from_slice(&chunk[..take]);
            }
            Some(Err(e)) => {
                tracing::debug!("Stopped reading error body: {}", e);
                break;
            }
            None => break,
        }
    }

    Ok(String::from_utf8_lossy(&collected).trim().to_string())
}
