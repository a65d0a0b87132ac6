//! Platform engine seams
//!
//! The controllers never talk to audio hardware or HTTP directly. They drive
//! these traits, which the `platform` module implements for real devices and
//! tests implement with in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::provider::SpeechRequest;
use crate::Result;

/// Event emitted by a recognition engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Audio capture actually began
    Start,
    /// Final transcript for the current activation
    Result(String),
    /// Engine error code (see `RecognitionErrorKind::from_code`)
    Error(String),
    /// Activation finished; sent exactly once per successful `start`
    End,
}

/// Recognition event tagged with the activation that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationEvent {
    /// Id passed to `RecognitionEngine::start`
    pub activation: u64,
    pub event: RecognitionEvent,
}

/// Speech-to-text engine
///
/// Every successful `start` must eventually be followed by exactly one
/// `End` carrying the same activation id, including after `stop`, `abort`
/// or an `Error`. Events from different activations may interleave.
pub trait RecognitionEngine: Send + Sync {
    /// Event stream for all activations. Called once, at controller construction.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ActivationEvent>;

    /// Begin a single-utterance activation tagged `activation`
    ///
    /// A `start` while an older activation is still winding down supersedes
    /// it; the older one still ends with its own `End`.
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot start capturing
    fn start(&self, activation: u64) -> Result<()>;

    /// Finish the current activation, delivering a transcript if one is pending
    fn stop(&self);

    /// Cancel the current activation; the engine reports `Error("aborted")`
    /// then `End`
    fn abort(&self);
}

/// Event emitted for one playback on the reusable audio handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Playback reached the end of the audio
    Ended,
    /// Playback failed after it had started
    Failed(String),
}

/// Reusable audio output handle
///
/// One instance lives for the controller's lifetime; platforms that grant
/// autoplay permission per handle keep that permission across utterances.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Load encoded audio and start playing it
    ///
    /// Resolves once playback has actually begun. A closed receiver counts as
    /// `Ended`.
    ///
    /// # Errors
    ///
    /// Returns error if the audio can't be decoded or the platform rejects
    /// playback
    async fn play(&self, audio: Bytes) -> Result<mpsc::UnboundedReceiver<PlaybackEvent>>;

    /// Stop playback, rewind and release the loaded audio
    fn reset(&self);

    /// Bring up the output path and play a near-silent sound through it
    ///
    /// Covers both opening the low-level audio context and priming the
    /// reusable playback handle.
    ///
    /// # Errors
    ///
    /// Returns error if the priming sound couldn't be started
    fn prime(&self) -> Result<()>;
}

/// A voice installed in the local synthesis engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVoice {
    /// Display name, also the key for exact-match preferences
    pub name: String,
    /// BCP 47 language tag
    pub lang: String,
    /// Whether the engine marks this as its default voice
    pub is_default: bool,
}

/// One request to the local synthesis engine
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Sanitized, non-empty text
    pub text: String,
    /// Speaking rate, 1.0 is normal
    pub rate: f32,
    /// Pitch, 1.0 is normal
    pub pitch: f32,
    /// Volume in `[0.0, 1.0]`
    pub volume: f32,
    /// Resolved voice, `None` for the engine default
    pub voice: Option<LocalVoice>,
}

/// Local engine error classification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisErrorKind {
    /// A newer utterance or an explicit cancel cut this one off
    #[error("interrupted")]
    Interrupted,
    /// The utterance was removed from the queue before it played
    #[error("canceled")]
    Canceled,
    /// Real synthesis failure
    #[error("{0}")]
    Failed(String),
}

impl SynthesisErrorKind {
    /// Map an engine error code
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "interrupted" => Self::Interrupted,
            "canceled" => Self::Canceled,
            other => Self::Failed(other.to_string()),
        }
    }

    /// Interruptions are how barge-in looks from the engine side
    #[must_use]
    pub const fn is_interruption(&self) -> bool {
        matches!(self, Self::Interrupted | Self::Canceled)
    }
}

/// Event emitted for one local utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtteranceEvent {
    /// Audio started
    Started,
    /// Utterance finished normally
    Ended,
    /// Utterance stopped with an error
    Failed(SynthesisErrorKind),
}

/// Always-available on-device synthesis engine
pub trait LocalSynthesizer: Send + Sync {
    /// Installed voices
    fn voices(&self) -> Vec<LocalVoice>;

    /// Queue an utterance; the receiver carries its events
    ///
    /// # Errors
    ///
    /// Returns error if the engine refuses the utterance outright
    fn speak(&self, utterance: Utterance) -> Result<mpsc::UnboundedReceiver<UtteranceEvent>>;

    /// Stop the current utterance and drop anything queued
    fn cancel(&self);

    /// Whether the engine reports itself paused
    fn is_paused(&self) -> bool;

    /// Resume a paused engine
    fn resume(&self);
}

/// Network synthesis service
#[async_trait]
pub trait RemoteSynthesizer: Send + Sync {
    /// Synthesize `request` into encoded audio
    ///
    /// # Errors
    ///
    /// Returns error on network failure or a non-success response
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Bytes>;
}
