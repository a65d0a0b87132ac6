//! Shared voice session state and outbound notifications

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::VoiceError;

/// Who currently owns the microphone/speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing active
    #[default]
    Idle,
    /// Recognition running
    Listening,
    /// Output running (including waiting on remote synthesis)
    Speaking,
    /// Recognition reported an error and hasn't ended yet
    Erroring,
}

/// Mutable state shared by the capture and output controllers
#[derive(Debug, Default)]
pub struct VoiceSession {
    /// Current phase; Listening and Speaking are mutually exclusive
    pub phase: Phase,
    /// Re-enter Listening after each turn
    pub continuous: bool,
    /// Bumped on every `speak` and `stop_speaking`
    pub epoch: u64,
    /// `on_speaking_start` has fired for the current epoch
    pub speaking_announced: bool,
}

/// Outbound notifications to the application controller
///
/// Called from the controller's tasks, never while internal locks are held.
#[allow(unused_variables)]
pub trait VoiceEvents: Send + Sync {
    /// Recognition actually started capturing
    fn on_listening_start(&self) {}
    /// Recognition activation ended, for whatever reason
    fn on_listening_end(&self) {}
    /// Final transcript
    fn on_speech_result(&self, text: &str) {}
    /// Audio actually started playing
    fn on_speaking_start(&self) {}
    /// Audio finished or was abandoned
    fn on_speaking_end(&self) {}
    /// Classified condition for the caller to present
    fn on_error(&self, error: &VoiceError) {}
    /// Remote synthesis failed and local synthesis is taking over
    fn on_fallback(&self, reason: &VoiceError) {}
}

/// Notification as a value, for channel-based consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    ListeningStart,
    ListeningEnd,
    SpeechResult(String),
    SpeakingStart,
    SpeakingEnd,
    Error(VoiceError),
    Fallback(VoiceError),
}

impl VoiceEvents for mpsc::UnboundedSender<VoiceEvent> {
    fn on_listening_start(&self) {
        let _ = self.send(VoiceEvent::ListeningStart);
    }

    fn on_listening_end(&self) {
        let _ = self.send(VoiceEvent::ListeningEnd);
    }

    fn on_speech_result(&self, text: &str) {
        let _ = self.send(VoiceEvent::SpeechResult(text.to_string()));
    }

    fn on_speaking_start(&self) {
        let _ = self.send(VoiceEvent::SpeakingStart);
    }

    fn on_speaking_end(&self) {
        let _ = self.send(VoiceEvent::SpeakingEnd);
    }

    fn on_error(&self, error: &VoiceError) {
        let _ = self.send(VoiceEvent::Error(error.clone()));
    }

    fn on_fallback(&self, reason: &VoiceError) {
        let _ = self.send(VoiceEvent::Fallback(reason.clone()));
    }
}

/// Events are dropped
#[derive(Debug, Default)]
pub struct NoopEvents;

impl VoiceEvents for NoopEvents {}

/// Delays used by the controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceTimings {
    /// Settle delay before continuous mode restarts recognition
    pub restart_delay: Duration,
    /// Settle delay between speech ending and listening again
    pub relisten_delay: Duration,
    /// How often a local utterance checks for a stalled engine
    pub keepalive_interval: Duration,
    /// When the proactive resume fires, just under the engine's stall point
    pub stall_nudge_after: Duration,
    /// How long remote playback may take to start before it counts as rejected
    pub playback_start_timeout: Duration,
}

impl Default for VoiceTimings {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_millis(1000),
            relisten_delay: Duration::from_millis(500),
            keepalive_interval: Duration::from_secs(1),
            stall_nudge_after: Duration::from_secs(14),
            playback_start_timeout: Duration::from_secs(5),
        }
    }
}

/// State and sinks both controllers hold on to
pub(crate) struct Shared {
    pub session: Mutex<VoiceSession>,
    pub events: Arc<dyn VoiceEvents>,
    pub timings: VoiceTimings,
}

impl Shared {
    pub fn new(events: Arc<dyn VoiceEvents>, timings: VoiceTimings) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(VoiceSession::default()),
            events,
            timings,
        })
    }

    pub fn phase(&self) -> Phase {
        self.session.lock().phase
    }

    pub fn is_continuous(&self) -> bool {
        self.session.lock().continuous
    }
}
