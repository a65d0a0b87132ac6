//! Voice front-end
//!
//! Capture and output controllers that share one session, the provider
//! configuration, and the HTTP speech clients. Platform backends live in
//! [`crate::platform`].

mod capture;
mod controller;
mod engine;
mod output;
mod provider;
mod sanitize;
mod selection;
mod session;
mod stt;
mod tts;
mod unlock;

pub use capture::SpeechCapture;
pub use controller::{VoiceBackends, VoiceController};
pub use engine::{
    ActivationEvent, AudioSink, LocalSynthesizer, LocalVoice, PlaybackEvent, RecognitionEngine,
    RecognitionEvent, RemoteSynthesizer, SynthesisErrorKind, Utterance, UtteranceEvent,
};
pub use output::{OutputBackends, SpeechOutput};
pub use provider::{
    LocalVoiceSettings, MAX_REMOTE_SPEED, MIN_REMOTE_SPEED, ProviderConfig, ProviderKind,
    RemoteVoice, SpeechRequest,
};
pub use sanitize::sanitize_for_speech;
pub use selection::{PREFERRED_VOICE_NAMES, select_voice};
pub use session::{NoopEvents, Phase, VoiceEvent, VoiceEvents, VoiceSession, VoiceTimings};
pub use stt::{DEEPGRAM_BASE_URL, SpeechToText, SttApi, TranscribeFailure};
pub use tts::{ELEVENLABS_BASE_URL, HttpSpeechSynthesizer, OPENAI_BASE_URL, TtsApi};
pub use unlock::AudioUnlockState;
