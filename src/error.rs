//! Error types for beacon-voice

use thiserror::Error;

/// Result type alias for beacon-voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in beacon-voice
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Classified voice condition
    #[error(transparent)]
    Voice(#[from] VoiceError),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Speech-to-text service answered with a non-success status
    #[error("{service} API error {status}: {body}")]
    SttStatus {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Classified condition reported by the voice controllers
///
/// This is what reaches `VoiceEvents::on_error` and the fallback diagnostic.
/// Turning it into user-facing text is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    /// No recognition engine exists on this platform
    #[error("speech recognition is not available")]
    CapabilityUnavailable,

    /// The recognition engine refused to start
    #[error("speech recognition failed to start: {0}")]
    StartFailed(String),

    /// Listening ended without a transcript
    #[error("no speech detected")]
    NoSpeechDetected,

    /// The recognition engine reported an error
    #[error("speech recognition error: {0}")]
    Recognition(RecognitionErrorKind),

    /// Remote synthesis or playback failed (local fallback follows)
    #[error("remote synthesis failed: {0}")]
    RemoteSynthesisFailed(String),

    /// No provider could speak at all
    #[error("speech output unavailable: {0}")]
    SpeechUnavailable(String),
}

impl VoiceError {
    /// Whether the condition is expected during normal use and needs no
    /// error presentation
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoSpeechDetected
                | Self::RemoteSynthesisFailed(_)
                | Self::Recognition(RecognitionErrorKind::NoSpeech | RecognitionErrorKind::Aborted)
        )
    }
}

/// Closed taxonomy of recognition engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecognitionErrorKind {
    /// Engine heard nothing
    #[error("no speech")]
    NoSpeech,
    /// Microphone missing or busy
    #[error("microphone unavailable")]
    MicUnavailable,
    /// User or platform denied microphone access
    #[error("permission denied")]
    PermissionDenied,
    /// Recognition service unreachable
    #[error("network error")]
    NetworkError,
    /// Recognition was cancelled, e.g. because output started
    #[error("aborted")]
    Aborted,
    /// Recognition service refused the request
    #[error("service blocked")]
    ServiceBlocked,
    /// Anything else
    #[error("unknown error")]
    Unknown,
}

impl RecognitionErrorKind {
    /// Map an engine error code onto the taxonomy
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::MicUnavailable,
            "not-allowed" => Self::PermissionDenied,
            "network" => Self::NetworkError,
            "aborted" => Self::Aborted,
            "service-not-allowed" => Self::ServiceBlocked,
            _ => Self::Unknown,
        }
    }

    /// Engine error code for this kind
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::MicUnavailable => "audio-capture",
            Self::PermissionDenied => "not-allowed",
            Self::NetworkError => "network",
            Self::Aborted => "aborted",
            Self::ServiceBlocked => "service-not-allowed",
            Self::Unknown => "unknown",
        }
    }

    /// Errors after which restarting recognition would only fail again
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::MicUnavailable | Self::PermissionDenied | Self::ServiceBlocked
        )
    }
}
