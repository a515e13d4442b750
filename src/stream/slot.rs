//! Tracks which stream is the "current" one for a chat view
//!
//! Starting a new stream cancels the previous current one. An older stream
//! may still be draining after that, but [`StreamHandle::is_current`] tells
//! its owner that the output should no longer be rendered.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct SlotState {
    generation: u64,
    current: Option<(u64, CancellationToken)>,
}

/// Holder of the single current stream
#[derive(Debug, Clone, Default)]
pub struct StreamSlot {
    state: Arc<Mutex<SlotState>>,
}

impl StreamSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the current stream, if any, and register a new one
    pub fn begin(&self) -> StreamHandle {
        let mut state = self.lock();

        if let Some((previous, token)) = state.current.take() {
            tracing::debug!(stream_id = previous, "Cancelling previous stream");
            token.cancel();
        }

        state.generation += 1;
        let generation = state.generation;
        let token = CancellationToken::new();
        state.current = Some((generation, token.clone()));

        StreamHandle {
            generation,
            token,
            slot: self.clone(),
        }
    }

    /// Stop the current stream ("stop generating")
    ///
    /// Returns whether anything was running.
    pub fn cancel_current(&self) -> bool {
        match self.lock().current.take() {
            Some((generation, token)) => {
                tracing::debug!(stream_id = generation, "Stream cancelled by user");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a stream is currently registered
    pub fn is_busy(&self) -> bool {
        self.lock().current.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Registration of one stream in a [`StreamSlot`]
///
/// Dropping the handle unregisters it if it is still current.
#[derive(Debug)]
pub struct StreamHandle {
    generation: u64,
    token: CancellationToken,
    slot: StreamSlot,
}

impl StreamHandle {
    /// Sequence number of this stream within its slot
    pub fn id(&self) -> u64 {
        self.generation
    }

    /// Token to pass to the streaming client
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True while this stream is still the one being rendered
    pub fn is_current(&self) -> bool {
        !self.token.is_cancelled()
            && matches!(self.slot.lock().current, Some((g, _)) if g == self.generation)
    }

    /// Release the slot if this stream is still current
    pub fn finish(self) {
        // Unregistering happens in `Drop`.
        drop(self);
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let mut state = self.slot.lock();
        if matches!(state.current, Some((g, _)) if g == self.generation) {
            state.current = None;
        }
    }
}
