//! Speech output controller
//!
//! Renders text to audible speech once per `speak` call. Remote synthesis is
//! preferred when configured and unlocked; every remote failure falls back
//! to the local engine with the same text. A newer `speak` (or
//! `stop_speaking`) always wins: each utterance carries an epoch and a
//! cancellation token, and results for a stale epoch are dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use secrecy::SecretString;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::capture::SpeechCapture;
use super::engine::{
    AudioSink, LocalSynthesizer, PlaybackEvent, RemoteSynthesizer, Utterance, UtteranceEvent,
};
use super::provider::{
    LocalVoiceSettings, ProviderConfig, ProviderKind, RemoteVoice, SpeechRequest,
};
use super::sanitize::sanitize_for_speech;
use super::selection::select_voice;
use super::session::{Phase, Shared};
use super::unlock::AudioUnlockState;
use crate::{Result, VoiceError};

/// How an utterance attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Audio played to the end (or the engine ended it normally)
    Finished,
    /// A newer utterance or `stop_speaking` took over
    Superseded,
}

/// Output backends
pub struct OutputBackends {
    /// Reusable playback handle for remote audio
    pub sink: Arc<dyn AudioSink>,
    /// On-device synthesizer
    pub local: Arc<dyn LocalSynthesizer>,
    /// Network synthesizer
    pub remote: Arc<dyn RemoteSynthesizer>,
}

struct OutputInner {
    shared: Arc<Shared>,
    capture: SpeechCapture,
    backends: OutputBackends,
    providers: Mutex<ProviderConfig>,
    unlock: AudioUnlockState,
    current: Mutex<Option<CancellationToken>>,
}

/// Controls speech output
#[derive(Clone)]
pub struct SpeechOutput {
    inner: Arc<OutputInner>,
}

impl SpeechOutput {
    pub(crate) fn new(
        shared: Arc<Shared>,
        capture: SpeechCapture,
        backends: OutputBackends,
        providers: ProviderConfig,
        unlock: AudioUnlockState,
    ) -> Self {
        Self {
            inner: Arc::new(OutputInner {
                shared,
                capture,
                backends,
                providers: Mutex::new(providers),
                unlock,
                current: Mutex::new(None),
            }),
        }
    }

    /// Speak `text`, barging in on anything already playing
    ///
    /// Completes when the audio finished or was superseded by a newer call.
    ///
    /// # Errors
    ///
    /// Returns `VoiceError::SpeechUnavailable` if neither provider could
    /// speak
    pub async fn speak(&self, text: &str) -> Result<()> {
        let text = sanitize_for_speech(text);
        if text.is_empty() {
            tracing::debug!("nothing speakable after sanitizing");
            return Ok(());
        }

        let (epoch, token) = self.begin();
        let request = self.inner.providers.lock().remote_request(&text);

        let outcome = match request {
            Some(request) if self.inner.unlock.is_unlocked() => {
                match self.speak_remote(epoch, &request, &token).await {
                    Ok(outcome) => Ok(outcome),
                    Err(_) if token.is_cancelled() => Ok(Outcome::Superseded),
                    Err(reason) => {
                        tracing::warn!(epoch, error = %reason, "falling back to local synthesis");
                        self.inner.shared.events.on_fallback(&reason);
                        self.speak_local(epoch, &text, &token).await
                    }
                }
            }
            Some(_) => {
                tracing::debug!(epoch, "audio output locked, using local synthesis");
                self.speak_local(epoch, &text, &token).await
            }
            None => self.speak_local(epoch, &text, &token).await,
        };

        match outcome {
            Ok(Outcome::Finished) => {
                self.finish(epoch);
                Ok(())
            }
            Ok(Outcome::Superseded) => {
                tracing::debug!(epoch, "utterance superseded");
                Ok(())
            }
            Err(_) if token.is_cancelled() => Ok(()),
            Err(e) => {
                tracing::error!(epoch, error = %e, "speech output failed");
                self.abandon(epoch);
                Err(e.into())
            }
        }
    }

    /// Stop whatever is playing and invalidate in-flight synthesis
    pub fn stop_speaking(&self) {
        let inner = &self.inner;
        let announced = {
            let mut session = inner.shared.session.lock();
            session.epoch += 1;
            if session.phase == Phase::Speaking {
                session.phase = Phase::Idle;
            }
            std::mem::take(&mut session.speaking_announced)
        };

        if let Some(token) = inner.current.lock().take() {
            token.cancel();
        }
        inner.backends.local.cancel();
        inner.backends.sink.reset();

        if announced {
            inner.shared.events.on_speaking_end();
        }
        tracing::debug!("speech stopped");
    }

    /// Whether an utterance is in progress
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.inner.shared.phase() == Phase::Speaking
    }

    /// Prime audio output from inside a user gesture
    pub fn unlock(&self) {
        let backends = &self.inner.backends;
        self.inner
            .unlock
            .unlock(backends.sink.as_ref(), backends.local.as_ref());
    }

    /// Snapshot of the provider configuration
    #[must_use]
    pub fn provider_config(&self) -> ProviderConfig {
        self.inner.providers.lock().clone()
    }

    /// Choose which provider is tried first
    pub fn set_provider(&self, provider: ProviderKind) {
        self.inner.providers.lock().active = provider;
        tracing::info!(?provider, "speech provider changed");
    }

    /// Set or clear the remote credential
    pub fn set_credential(&self, credential: Option<SecretString>) {
        self.inner.providers.lock().remote.credential = credential;
    }

    /// Set the remote voice and speed
    ///
    /// # Errors
    ///
    /// Returns error if `speed` is outside the accepted range; the previous
    /// settings are kept
    pub fn set_remote_voice(&self, voice_id: &str, speed: f64) -> Result<()> {
        let speed = RemoteVoice::validate_speed(speed)?;
        let mut providers = self.inner.providers.lock();
        providers.remote.voice_id = voice_id.to_string();
        providers.remote.speed = speed;
        Ok(())
    }

    /// Set the exact local voice name to prefer
    pub fn set_preferred_voice(&self, name: Option<String>) {
        self.inner.providers.lock().local.preferred_voice = name;
    }

    /// Replace local rate, pitch, volume and language
    pub fn set_local_voice(&self, settings: LocalVoiceSettings) {
        self.inner.providers.lock().local = settings;
    }

    /// Barge in: claim the speaker for a new epoch
    fn begin(&self) -> (u64, CancellationToken) {
        let inner = &self.inner;
        inner.capture.suppress();

        let token = CancellationToken::new();
        let (epoch, announced) = {
            let mut session = inner.shared.session.lock();
            session.epoch += 1;
            session.phase = Phase::Speaking;
            (session.epoch, std::mem::take(&mut session.speaking_announced))
        };

        if let Some(previous) = inner.current.lock().replace(token.clone()) {
            previous.cancel();
        }
        inner.backends.local.cancel();
        inner.backends.sink.reset();

        if announced {
            inner.shared.events.on_speaking_end();
        }

        tracing::debug!(epoch, "utterance begins");
        (epoch, token)
    }

    async fn speak_remote(
        &self,
        epoch: u64,
        request: &SpeechRequest,
        token: &CancellationToken,
    ) -> std::result::Result<Outcome, VoiceError> {
        let inner = &self.inner;
        tracing::debug!(
            epoch,
            model = %request.model,
            voice = %request.voice,
            speed = request.speed,
            "requesting remote synthesis"
        );

        let audio = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(Outcome::Superseded),
            result = inner.backends.remote.synthesize(request) => {
                result.map_err(|e| VoiceError::RemoteSynthesisFailed(e.to_string()))?
            }
        };

        if !self.is_current(epoch) {
            return Ok(Outcome::Superseded);
        }

        let timeout = inner.shared.timings.playback_start_timeout;
        let start = tokio::time::timeout(timeout, inner.backends.sink.play(audio));
        let mut playback = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(Outcome::Superseded),
            started = start => match started {
                Ok(Ok(events)) => events,
                Ok(Err(e)) => {
                    inner.backends.sink.reset();
                    return Err(VoiceError::RemoteSynthesisFailed(format!(
                        "playback rejected: {e}"
                    )));
                }
                Err(_) => {
                    inner.backends.sink.reset();
                    return Err(VoiceError::RemoteSynthesisFailed(
                        "playback did not start".to_string(),
                    ));
                }
            }
        };

        self.announce_start(epoch);

        tokio::select! {
            biased;
            () = token.cancelled() => Ok(Outcome::Superseded),
            event = playback.recv() => {
                if let Some(PlaybackEvent::Failed(reason)) = event {
                    tracing::warn!(epoch, reason = %reason, "playback failed mid-utterance");
                }
                Ok(Outcome::Finished)
            }
        }
    }

    async fn speak_local(
        &self,
        epoch: u64,
        text: &str,
        token: &CancellationToken,
    ) -> std::result::Result<Outcome, VoiceError> {
        let inner = &self.inner;
        let settings = inner.providers.lock().local.clone();

        let voices = inner.backends.local.voices();
        let voice = select_voice(
            &voices,
            settings.preferred_voice.as_deref(),
            &settings.language,
        )
        .cloned()
        .ok_or_else(|| VoiceError::SpeechUnavailable("no local voices installed".to_string()))?;

        tracing::debug!(epoch, voice = %voice.name, "speaking with local engine");

        let utterance = Utterance {
            text: text.to_string(),
            rate: settings.rate,
            pitch: settings.pitch,
            volume: settings.volume,
            voice: Some(voice),
        };
        let mut events = inner
            .backends
            .local
            .speak(utterance)
            .map_err(|e| VoiceError::SpeechUnavailable(e.to_string()))?;

        // Some engines pause themselves partway through long utterances;
        // both timers die with this loop
        let timings = inner.shared.timings;
        let mut keepalive = tokio::time::interval_at(
            Instant::now() + timings.keepalive_interval,
            timings.keepalive_interval,
        );
        let nudge = tokio::time::sleep(timings.stall_nudge_after);
        tokio::pin!(nudge);
        let mut nudged = false;

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => return Ok(Outcome::Superseded),
                event = events.recv() => match event {
                    Some(UtteranceEvent::Started) => self.announce_start(epoch),
                    Some(UtteranceEvent::Ended) | None => return Ok(Outcome::Finished),
                    Some(UtteranceEvent::Failed(kind)) if kind.is_interruption() => {
                        tracing::debug!(epoch, %kind, "local utterance interrupted");
                        return Ok(Outcome::Finished);
                    }
                    Some(UtteranceEvent::Failed(kind)) => {
                        return Err(VoiceError::SpeechUnavailable(kind.to_string()));
                    }
                },
                _ = keepalive.tick() => {
                    if inner.backends.local.is_paused() {
                        tracing::warn!(epoch, "local engine stalled, resuming");
                        inner.backends.local.resume();
                    }
                }
                () = &mut nudge, if !nudged => {
                    nudged = true;
                    tracing::debug!(epoch, "resuming ahead of engine stall");
                    inner.backends.local.resume();
                }
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.shared.session.lock().epoch == epoch
    }

    fn announce_start(&self, epoch: u64) {
        let first = {
            let mut session = self.inner.shared.session.lock();
            session.epoch == epoch && !std::mem::replace(&mut session.speaking_announced, true)
        };

        if first {
            tracing::debug!(epoch, "speaking");
            self.inner.shared.events.on_speaking_start();
        }
    }

    fn finish(&self, epoch: u64) {
        let announced = {
            let mut session = self.inner.shared.session.lock();
            if session.epoch != epoch {
                return;
            }
            if session.phase == Phase::Speaking {
                session.phase = Phase::Idle;
            }
            std::mem::take(&mut session.speaking_announced)
        };

        let events = &self.inner.shared.events;
        if !announced {
            events.on_speaking_start();
        }
        events.on_speaking_end();
        tracing::debug!(epoch, "utterance finished");

        self.schedule_relisten(epoch);
    }

    fn abandon(&self, epoch: u64) {
        let announced = {
            let mut session = self.inner.shared.session.lock();
            if session.epoch != epoch {
                return;
            }
            if session.phase == Phase::Speaking {
                session.phase = Phase::Idle;
            }
            std::mem::take(&mut session.speaking_announced)
        };

        if announced {
            self.inner.shared.events.on_speaking_end();
        }

        self.schedule_relisten(epoch);
    }

    /// Continuous mode: listen again once the tail of the audio has died
    /// down, unless another utterance started meanwhile
    fn schedule_relisten(&self, epoch: u64) {
        let inner = &self.inner;
        if !inner.shared.is_continuous() || !inner.capture.is_supported() {
            return;
        }

        let capture = inner.capture.clone();
        let shared = Arc::clone(&inner.shared);
        let delay = shared.timings.relisten_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let session = shared.session.lock();
                if !session.continuous || session.phase != Phase::Idle || session.epoch != epoch {
                    tracing::debug!(epoch, phase = ?session.phase, "skipping relisten");
                    return;
                }
            }

            capture.start_listening();
        });
    }
}
