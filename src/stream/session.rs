//! Per-request streaming state

use tokio_util::sync::CancellationToken;

use super::decoder::{EventDecoder, Fragment, FragmentKind};
use crate::error::{OverlapError, Result};

/// In-flight state of one streaming exchange
///
/// Owns the decode buffer, the text accumulated so far and the caller's
/// cancellation token. Dropped when the request completes, fails or is
/// cancelled.
#[derive(Debug)]
pub struct StreamSession {
    decoder: EventDecoder,
    accumulated: String,
    cancel: CancellationToken,
    delivered: usize,
}

impl StreamSession {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            decoder: EventDecoder::new(),
            accumulated: String::new(),
            cancel,
            delivered: 0,
        }
    }

    /// Decode one body chunk and hand its fragments to `on_fragment`
    pub fn feed<F>(&mut self, chunk: &[u8], on_fragment: &mut F) -> Result<()>
    where
        F: FnMut(&str) -> Result<()>,
    {
        for fragment in self.decoder.push(chunk) {
            self.deliver(fragment, on_fragment)?;
        }
        Ok(())
    }

    /// Flush the decoder at end of body
    pub fn finish<F>(&mut self, on_fragment: &mut F) -> Result<()>
    where
        F: FnMut(&str) -> Result<()>,
    {
        for fragment in self.decoder.finish() {
            self.deliver(fragment, on_fragment)?;
        }
        Ok(())
    }

    /// Text delivered so far
    pub fn text(&self) -> &str {
        &self.accumulated
    }

    /// Number of fragments delivered so far
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn into_text(self) -> String {
        self.accumulated
    }

    /// Hand one fragment to the caller.
    ///
    /// Once the token is cancelled nothing more is delivered, even for
    /// fragments decoded from a chunk that was already read. A callback
    /// error is logged and decoding carries on.
    fn deliver<F>(&mut self, fragment: Fragment, on_fragment: &mut F) -> Result<()>
    where
        F: FnMut(&str) -> Result<()>,
    {
        if self.cancel.is_cancelled() {
            return Err(OverlapError::Cancelled.into());
        }

        if fragment.kind == FragmentKind::Challenge {
            tracing::debug!("Delivering challenge notice as fragment");
        }

        self.accumulated.push_str(&fragment.text);
        self.delivered += 1;

        if let Err(e) = on_fragment(&fragment.text) {
            tracing::warn!(
                fragment_index = self.delivered,
                "Fragment callback failed, continuing stream: {:#}",
                e
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_accumulates_and_counts() {
        let mut session = StreamSession::new(CancellationToken::new());
        let mut seen = Vec::new();
        let mut cb = |t: &str| -> Result<()> {
            seen.push(t.to_string());
            Ok(())
        };
        session.feed(b"data: {\"text\":\"He\"}\n\ndata: {\"text\":\"llo\"}\n\n", &mut cb).unwrap();
        session.finish(&mut cb).unwrap();

        assert_eq!(session.text(), "Hello");
        assert_eq!(session.delivered(), 2);
        assert_eq!(seen, vec!["He", "llo"]);
    }

    #[test]
    fn test_callback_error_does_not_stop_delivery() {
        let mut session = StreamSession::new(CancellationToken::new());
        let mut calls = 0;
        let mut cb = |_: &str| -> Result<()> {
            calls += 1;
            anyhow::bail!("renderer gone")
        };
        session.feed(b"data: a\n\ndata: b\n\n", &mut cb).unwrap();
        assert_eq!(calls, 2);
        assert_eq!(session.into_text(), "ab");
    }

    #[test]
    fn test_no_delivery_after_cancellation() {
        let token = CancellationToken::new();
        let mut session = StreamSession::new(token.clone());
        let mut seen = Vec::new();
        let mut cb = |t: &str| -> Result<()> {
            seen.push(t.to_string());
            token.cancel();
            Ok(())
        };

        let err = session
            .feed(b"data: a\n\ndata: b\n\ndata: c\n\n", &mut cb)
            .unwrap_err();
        assert!(OverlapError::is_cancellation(&err));
        assert_eq!(seen, vec!["a"]);
        assert_eq!(session.text(), "a");
    }
}
