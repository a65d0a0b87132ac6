//! Speech capture controller
//!
//! Wraps a [`RecognitionEngine`] and turns its event stream into one
//! transcript per activation, classified errors, and continuous-mode restarts.
//! Every activation gets a fresh id; events tagged with any other id, or
//! arriving after the activation's `End`, are dropped.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::engine::{ActivationEvent, RecognitionEngine, RecognitionEvent};
use super::session::{Phase, Shared};
use crate::{RecognitionErrorKind, VoiceError};

/// Why an activation was asked to end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    /// `stop_listening` from the application
    User,
    /// Output took over the microphone
    Suppressed,
}

/// Bookkeeping for the current activation
#[derive(Debug, Default)]
struct Activation {
    /// Id handed to the engine; 0 before the first start
    id: u64,
    /// `End` already handled
    ended: bool,
    got_result: bool,
    error: Option<RecognitionErrorKind>,
    stop: Option<StopReason>,
}

impl Activation {
    fn is_live(&self, id: u64) -> bool {
        self.id == id && !self.ended
    }
}

// Lock order: `activation` before `shared.session`
struct CaptureInner {
    engine: Option<Arc<dyn RecognitionEngine>>,
    shared: Arc<Shared>,
    activation: Mutex<Activation>,
}

/// Controls the recognition engine
#[derive(Clone)]
pub struct SpeechCapture {
    inner: Arc<CaptureInner>,
}

impl SpeechCapture {
    /// Create the controller and subscribe to the engine's events
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn new(engine: Option<Arc<dyn RecognitionEngine>>, shared: Arc<Shared>) -> Self {
        let inner = Arc::new(CaptureInner {
            engine,
            shared,
            activation: Mutex::new(Activation::default()),
        });

        if let Some(engine) = &inner.engine {
            let events = engine.subscribe();
            tokio::spawn(pump(Arc::downgrade(&inner), events));
        }

        Self { inner }
    }

    /// Whether a recognition engine exists
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.inner.engine.is_some()
    }

    /// Begin a single-utterance activation
    ///
    /// No-op while listening or speaking. Problems are reported through
    /// `on_error`.
    pub fn start_listening(&self) {
        let inner = &self.inner;
        let Some(engine) = &inner.engine else {
            tracing::warn!("speech recognition not available");
            inner
                .shared
                .events
                .on_error(&VoiceError::CapabilityUnavailable);
            return;
        };

        let id = {
            let mut activation = inner.activation.lock();
            let mut session = inner.shared.session.lock();
            match session.phase {
                Phase::Listening | Phase::Erroring => {
                    tracing::debug!("already listening");
                    return;
                }
                Phase::Speaking => {
                    tracing::debug!("speech output active, not listening");
                    return;
                }
                Phase::Idle => session.phase = Phase::Listening,
            }

            let id = activation.id + 1;
            *activation = Activation {
                id,
                ..Activation::default()
            };
            id
        };

        if let Err(e) = engine.start(id) {
            {
                let mut activation = inner.activation.lock();
                let mut session = inner.shared.session.lock();
                if activation.is_live(id) {
                    activation.ended = true;
                    if session.phase == Phase::Listening {
                        session.phase = Phase::Idle;
                    }
                }
            }
            tracing::warn!(error = %e, "recognition failed to start");
            inner
                .shared
                .events
                .on_error(&VoiceError::StartFailed(e.to_string()));
            return;
        }

        tracing::debug!(activation = id, "recognition started");
    }

    /// Ask the engine to finish; the phase changes when it reports `End`
    pub fn stop_listening(&self) {
        let Some(engine) = &self.inner.engine else {
            return;
        };

        {
            let mut activation = self.inner.activation.lock();
            if activation.ended || !self.is_listening() {
                return;
            }
            activation.stop = Some(StopReason::User);
        }

        tracing::debug!("stopping recognition");
        engine.stop();
    }

    /// Whether an activation is in progress
    #[must_use]
    pub fn is_listening(&self) -> bool {
        matches!(
            self.inner.shared.phase(),
            Phase::Listening | Phase::Erroring
        )
    }

    /// Abort recognition so output can take the speaker
    ///
    /// Leaves the phase `Idle`; the caller moves it to `Speaking`.
    pub(crate) fn suppress(&self) {
        let Some(engine) = &self.inner.engine else {
            return;
        };

        {
            let mut activation = self.inner.activation.lock();
            let mut session = self.inner.shared.session.lock();
            if !matches!(session.phase, Phase::Listening | Phase::Erroring) {
                return;
            }
            session.phase = Phase::Idle;
            activation.stop = Some(StopReason::Suppressed);
        }

        tracing::debug!("aborting recognition for speech output");
        engine.abort();
    }

    fn handle(&self, message: ActivationEvent) {
        let inner = &self.inner;
        let events = &inner.shared.events;
        let ActivationEvent {
            activation: id,
            event,
        } = message;

        match event {
            RecognitionEvent::Start => {
                if !inner.activation.lock().is_live(id) {
                    tracing::debug!(
                        activation = id,
                        "dropping start of a finished activation"
                    );
                    return;
                }
                tracing::debug!(activation = id, "listening");
                events.on_listening_start();
            }
            RecognitionEvent::Result(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return;
                }

                {
                    let mut activation = inner.activation.lock();
                    if !activation.is_live(id) {
                        tracing::debug!(
                            activation = id,
                            "dropping result of a finished activation"
                        );
                        return;
                    }
                    if activation.stop == Some(StopReason::Suppressed) {
                        tracing::debug!("ignoring result that arrived after output took over");
                        return;
                    }
                    if std::mem::replace(&mut activation.got_result, true) {
                        tracing::debug!("ignoring extra result for activation");
                        return;
                    }
                }

                tracing::info!(transcript = text, "speech recognized");
                events.on_speech_result(text);
            }
            RecognitionEvent::Error(code) => {
                let kind = RecognitionErrorKind::from_code(&code);

                {
                    let mut activation = inner.activation.lock();
                    if !activation.is_live(id) {
                        tracing::debug!(
                            activation = id,
                            code = %code,
                            "dropping error of a finished activation"
                        );
                        return;
                    }
                    activation.error = Some(kind);

                    if kind == RecognitionErrorKind::Aborted {
                        tracing::debug!(activation = id, "recognition aborted");
                        return;
                    }

                    let mut session = inner.shared.session.lock();
                    if session.phase == Phase::Listening {
                        session.phase = Phase::Erroring;
                    }
                }

                tracing::warn!(code = %code, ?kind, "recognition error");
                events.on_error(&VoiceError::Recognition(kind));
            }
            RecognitionEvent::End => {
                let activation = {
                    let mut current = inner.activation.lock();
                    if !current.is_live(id) {
                        tracing::debug!(activation = id, "dropping end of a finished activation");
                        return;
                    }
                    let finished = std::mem::replace(
                        &mut *current,
                        Activation {
                            id,
                            ended: true,
                            ..Activation::default()
                        },
                    );

                    let mut session = inner.shared.session.lock();
                    if matches!(session.phase, Phase::Listening | Phase::Erroring) {
                        session.phase = Phase::Idle;
                    }
                    finished
                };

                tracing::debug!(
                    activation = id,
                    got_result = activation.got_result,
                    error = ?activation.error,
                    stop = ?activation.stop,
                    "recognition ended"
                );
                events.on_listening_end();

                if !activation.got_result && activation.error.is_none() && activation.stop.is_none()
                {
                    events.on_error(&VoiceError::NoSpeechDetected);
                }

                let fatal = activation.error.is_some_and(RecognitionErrorKind::is_fatal);
                if activation.stop.is_none() && !fatal {
                    self.schedule_restart();
                }
            }
        }
    }

    /// Continuous mode: listen again after the settle delay unless output
    /// has taken over by then
    fn schedule_restart(&self) {
        let shared = &self.inner.shared;
        if !shared.is_continuous() || shared.phase() == Phase::Speaking {
            return;
        }

        let capture = self.clone();
        let delay = shared.timings.restart_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let session = capture.inner.shared.session.lock();
                if !session.continuous || session.phase != Phase::Idle {
                    tracing::debug!(phase = ?session.phase, "skipping recognition restart");
                    return;
                }
            }

            capture.start_listening();
        });
    }
}

/// Forward engine events to the controller for as long as it exists
async fn pump(inner: Weak<CaptureInner>, mut events: mpsc::UnboundedReceiver<ActivationEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        SpeechCapture { inner }.handle(event);
    }
}
