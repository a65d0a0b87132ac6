//! Capture + output controller pair
//!
//! The microphone and the speaker are one exclusive resource. Starting to
//! speak aborts recognition; starting to listen stops speech.

use std::sync::Arc;

use secrecy::SecretString;

use super::capture::SpeechCapture;
use super::engine::RecognitionEngine;
use super::output::{OutputBackends, SpeechOutput};
use super::provider::{LocalVoiceSettings, ProviderConfig, ProviderKind};
use super::session::{Phase, Shared, VoiceEvents, VoiceTimings};
use super::unlock::AudioUnlockState;
use crate::Result;

/// Platform pieces the controller drives
pub struct VoiceBackends {
    /// Recognition engine, `None` where the platform has none
    pub recognizer: Option<Arc<dyn RecognitionEngine>>,
    /// Output backends
    pub output: OutputBackends,
}

/// The voice front-end the application talks to
#[derive(Clone)]
pub struct VoiceController {
    shared: Arc<Shared>,
    capture: SpeechCapture,
    output: SpeechOutput,
}

impl VoiceController {
    /// Build the controller pair
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        backends: VoiceBackends,
        providers: ProviderConfig,
        unlock: AudioUnlockState,
        events: Arc<dyn VoiceEvents>,
        timings: VoiceTimings,
    ) -> Self {
        let shared = Shared::new(events, timings);
        let capture = SpeechCapture::new(backends.recognizer, Arc::clone(&shared));
        let output = SpeechOutput::new(
            Arc::clone(&shared),
            capture.clone(),
            backends.output,
            providers,
            unlock,
        );

        tracing::debug!(
            recognition = capture.is_supported(),
            provider = ?output.provider_config().active,
            "voice controller ready"
        );

        Self {
            shared,
            capture,
            output,
        }
    }

    /// Whether speech recognition exists on this platform
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.capture.is_supported()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    /// Current speech epoch
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.shared.session.lock().epoch
    }

    /// Start listening, cutting off any speech in progress
    pub fn start_listening(&self) {
        if self.output.is_speaking() {
            tracing::debug!("listening requested while speaking, stopping speech");
            self.output.stop_speaking();
        }
        self.capture.start_listening();
    }

    /// Stop listening; `on_listening_end` follows asynchronously
    pub fn stop_listening(&self) {
        self.capture.stop_listening();
    }

    /// Speak `text`
    ///
    /// # Errors
    ///
    /// Returns error only when no provider could speak
    pub async fn speak(&self, text: &str) -> Result<()> {
        self.output.speak(text).await
    }

    /// Stop speech and discard in-flight synthesis
    pub fn stop_speaking(&self) {
        self.output.stop_speaking();
    }

    /// Toggle automatic re-listening after each turn
    pub fn set_continuous_mode(&self, enabled: bool) {
        self.shared.session.lock().continuous = enabled;
        tracing::debug!(enabled, "continuous mode");
    }

    /// Whether continuous mode is on
    #[must_use]
    pub fn is_continuous(&self) -> bool {
        self.shared.is_continuous()
    }

    /// Prime audio output; call from inside a user input handler
    pub fn unlock(&self) {
        self.output.unlock();
    }

    /// Choose which provider is tried first
    pub fn set_provider(&self, provider: ProviderKind) {
        self.output.set_provider(provider);
    }

    /// Set or clear the remote credential
    pub fn set_credential(&self, credential: Option<SecretString>) {
        self.output.set_credential(credential);
    }

    /// Set the remote voice and speed
    ///
    /// # Errors
    ///
    /// Returns error if `speed` is outside `0.25..=4.0`
    pub fn set_remote_voice(&self, voice_id: &str, speed: f64) -> Result<()> {
        self.output.set_remote_voice(voice_id, speed)
    }

    /// Set the exact local voice name to prefer
    pub fn set_preferred_voice(&self, name: Option<String>) {
        self.output.set_preferred_voice(name);
    }

    /// Replace local voice settings
    pub fn set_local_voice(&self, settings: LocalVoiceSettings) {
        self.output.set_local_voice(settings);
    }

    /// Snapshot of the provider configuration
    #[must_use]
    pub fn provider_config(&self) -> ProviderConfig {
        self.output.provider_config()
    }
}
