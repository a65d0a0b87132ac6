//! Audio output unlock bookkeeping
//!
//! Some platforms only let audio autoplay after the page (or app) has
//! produced sound from inside a user gesture. The flag here records that the
//! priming happened; it is set once and never cleared.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::engine::{AudioSink, LocalSynthesizer, Utterance};

/// Shared, monotonic "audio may autoplay" flag
///
/// Cloning shares the flag. Owned by the composition root and handed to the
/// output controller, so tests can construct it already unlocked.
#[derive(Debug, Clone, Default)]
pub struct AudioUnlockState {
    unlocked: Arc<AtomicBool>,
}

impl AudioUnlockState {
    /// Create a locked state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state that is already unlocked
    #[must_use]
    pub fn unlocked() -> Self {
        let state = Self::new();
        state.mark_unlocked();
        state
    }

    /// Whether remote playback may be attempted
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::Acquire)
    }

    /// Record the unlock without priming anything
    pub fn mark_unlocked(&self) {
        self.unlocked.store(true, Ordering::Release);
    }

    /// Prime audio output and mark the state unlocked
    ///
    /// Must run synchronously inside a user input handler. The flag is set
    /// even when priming reports failure.
    pub fn unlock(&self, sink: &dyn AudioSink, local: &dyn LocalSynthesizer) {
        if self.is_unlocked() {
            return;
        }

        if let Err(e) = sink.prime() {
            tracing::debug!(error = %e, "audio sink priming failed");
        }

        let silent = Utterance {
            text: " ".to_string(),
            rate: 1.0,
            pitch: 1.0,
            volume: 0.0,
            voice: None,
        };
        if let Err(e) = local.speak(silent) {
            tracing::debug!(error = %e, "local engine priming failed");
        }

        self.mark_unlocked();
        tracing::info!("audio output unlocked");
    }
}
