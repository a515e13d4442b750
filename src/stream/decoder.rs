//! Incremental decoder for `text/event-stream` response bodies
//!
//! Bytes arrive in arbitrary pieces. [`EventDecoder::push`] turns each piece
//! into zero or more [`Fragment`]s and keeps whatever cannot be interpreted
//! yet (a partial UTF-8 sequence, an event without its closing blank line)
//! for the next call. The fragments produced never depend on where the
//! body was split, except for the per-chunk challenge check.
//!
//! Framing rules:
//!
//! - an event ends at `\n\n`
//! - every `data:` line of an event adds its remainder, leading whitespace
//!   trimmed, to the event payload, in line order and without separators
//! - an event without a non-empty payload produces nothing
//! - a payload becomes a fragment via [`extract_fragment`]
//!
//! A chunk that looks like an edge/CDN HTML challenge page is replaced by a
//! single diagnostic fragment and not framed.

use bytes::BytesMut;

use super::payload::extract_fragment;

/// Event terminator
const EVENT_DELIMITER: &str = "\n\n";

const DATA_PREFIX: &str = "data:";

/// Substrings identifying an edge/CDN interstitial page
pub const CHALLENGE_MARKERS: [&str; 2] = [
    "<form id=\"challenge-form\"",
    "<title>Attention Required</title>",
];

/// Text delivered in place of a challenge page
pub const CHALLENGE_NOTICE: &str =
    "Error: edge/CDN returned an HTML challenge. Refresh or check the server.";

/// Where a fragment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// A complete, delimited event
    Event,
    /// Text left over when the body ended without a final delimiter
    Trailing,
    /// Diagnostic synthesized for a challenge page
    Challenge,
}

/// One piece of text ready for the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub kind: FragmentKind,
}

impl Fragment {
    fn new(text: String, kind: FragmentKind) -> Self {
        Self { text, kind }
    }
}

/// Streaming UTF-8 decoder
///
/// A code point split across two reads is held back until its remaining
/// bytes arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: BytesMut,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next piece of input
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let input = self.pending.split();

        let mut out = String::with_capacity(input.len());
        let mut rest: &[u8] = &input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.pending.extend_from_slice(after);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of input; an incomplete sequence becomes U+FFFD
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    /// Number of bytes waiting for the rest of their code point
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Incremental event-stream decoder
#[derive(Debug, Default)]
pub struct EventDecoder {
    utf8: Utf8Decoder,
    buffer: String,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the body
    ///
    /// # Examples
    ///
    /// ```
    /// use overlap::stream::EventDecoder;
    ///
    /// let mut decoder = EventDecoder::new();
    /// assert!(decoder.push(b"data: {\"text\":\"He\"}").is_empty());
    /// let fragments = decoder.push(b"\n\ndata: llo\n\n");
    /// let texts: Vec<_> = fragments.iter().map(|f| f.text.as_str()).collect();
    /// assert_eq!(texts, vec!["He", "llo"]);
    /// ```
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Fragment> {
        let text = self.utf8.decode(bytes);
        if text.is_empty() {
            return Vec::new();
        }

        if is_challenge_page(&text) {
            tracing::warn!(
                chunk_len = text.len(),
                "Edge/CDN challenge page detected in response stream"
            );
            return vec![Fragment::new(
                CHALLENGE_NOTICE.to_string(),
                FragmentKind::Challenge,
            )];
        }

        self.buffer.push_str(&text);
        self.drain_events()
    }

    /// Signal end of body and collect whatever is left
    ///
    /// A final event that never received its closing blank line is still
    /// delivered. When the leftover text has `data:` lines their payload is
    /// used; otherwise the leftover text itself is the payload.
    pub fn finish(&mut self) -> Vec<Fragment> {
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);

        let mut fragments = self.drain_events();
        let rest = std::mem::take(&mut self.buffer);
        if let Some(payload) = trailing_payload(&rest) {
            tracing::debug!(len = payload.len(), "Delivering unterminated final event");
            fragments.push(Fragment::new(
                extract_fragment(&payload),
                FragmentKind::Trailing,
            ));
        }
        fragments
    }

    /// Decoded text not yet terminated by a blank line
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    fn drain_events(&mut self) -> Vec<Fragment> {
        let mut fragments = Vec::new();
        let mut consumed = 0;

        while let Some(pos) = self.buffer[consumed..].find(EVENT_DELIMITER) {
            let event = &self.buffer[consumed..consumed + pos];
            consumed += pos + EVENT_DELIMITER.len();

            match event_payload(event) {
                Some(payload) => fragments.push(Fragment::new(
                    extract_fragment(&payload),
                    FragmentKind::Event,
                )),
                None => tracing::trace!("Skipping event without data"),
            }
        }

        self.buffer.drain(..consumed);
        fragments
    }
}

/// True when a decoded chunk carries a challenge page marker
pub fn is_challenge_page(chunk: &str) -> bool {
    CHALLENGE_MARKERS.iter().any(|marker| chunk.contains(marker))
}

/// Concatenated `data:` payload of one event, if any
fn event_payload(event: &str) -> Option<String> {
    let payload: String = event
        .lines()
        .filter_map(|line| line.trim_end_matches('\r').strip_prefix(DATA_PREFIX))
        .map(str::trim_start)
        .collect();

    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

fn trailing_payload(rest: &str) -> Option<String> {
    if rest.trim().is_empty() {
        return None;
    }

    let has_data_line = rest
        .lines()
        .any(|line| line.trim_end_matches('\r').starts_with(DATA_PREFIX));
    if has_data_line {
        event_payload(rest)
    } else {
        Some(rest.to_string())
    }
}
