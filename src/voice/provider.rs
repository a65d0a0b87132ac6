//! Speech provider configuration

use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Slowest speed the remote service accepts
pub const MIN_REMOTE_SPEED: f64 = 0.25;

/// Fastest speed the remote service accepts
pub const MAX_REMOTE_SPEED: f64 = 4.0;

/// Which synthesis provider `speak` tries first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// Network synthesis with local fallback
    Remote,
    /// On-device synthesis only
    #[default]
    Local,
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "remote" | "openai" | "cloud" => Ok(Self::Remote),
            "local" | "system" | "device" => Ok(Self::Local),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Remote voice settings
#[derive(Debug, Clone)]
pub struct RemoteVoice {
    /// Bearer credential; remote synthesis is skipped while unset
    pub credential: Option<SecretString>,
    /// Model identifier (e.g. "tts-1")
    pub model: String,
    /// Voice identifier (e.g. "alloy")
    pub voice_id: String,
    /// Speed multiplier in `[MIN_REMOTE_SPEED, MAX_REMOTE_SPEED]`
    pub speed: f64,
}

impl Default for RemoteVoice {
    fn default() -> Self {
        Self {
            credential: None,
            model: "tts-1".to_string(),
            voice_id: "alloy".to_string(),
            speed: 1.0,
        }
    }
}

impl RemoteVoice {
    /// Reject speeds the service would refuse
    ///
    /// # Errors
    ///
    /// Returns error if `speed` is outside the accepted range
    pub fn validate_speed(speed: f64) -> Result<f64> {
        if (MIN_REMOTE_SPEED..=MAX_REMOTE_SPEED).contains(&speed) {
            Ok(speed)
        } else {
            Err(Error::Config(format!(
                "TTS speed {speed} outside {MIN_REMOTE_SPEED}..={MAX_REMOTE_SPEED}"
            )))
        }
    }

    fn has_credential(&self) -> bool {
        self.credential
            .as_ref()
            .is_some_and(|c| !c.expose_secret().is_empty())
    }
}

/// Local voice settings
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVoiceSettings {
    /// Exact voice name to prefer
    pub preferred_voice: Option<String>,
    /// Language prefix for automatic selection (e.g. "en")
    pub language: String,
    /// Speaking rate, 1.0 is normal
    pub rate: f32,
    /// Pitch, 1.0 is normal
    pub pitch: f32,
    /// Volume in `[0.0, 1.0]`
    pub volume: f32,
}

impl Default for LocalVoiceSettings {
    fn default() -> Self {
        Self {
            preferred_voice: None,
            language: "en".to_string(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// Provider selection plus per-provider settings
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    /// Provider tried first
    pub active: ProviderKind,
    /// Remote settings
    pub remote: RemoteVoice,
    /// Local settings
    pub local: LocalVoiceSettings,
}

impl ProviderConfig {
    /// Build the remote request for `text`, or `None` when the remote
    /// provider isn't active or has no credential
    #[must_use]
    pub fn remote_request(&self, text: &str) -> Option<SpeechRequest> {
        if self.active != ProviderKind::Remote || !self.remote.has_credential() {
            return None;
        }

        Some(SpeechRequest {
            credential: self.remote.credential.clone()?,
            model: self.remote.model.clone(),
            voice: self.remote.voice_id.clone(),
            input: text.to_string(),
            speed: self.remote.speed,
        })
    }
}

/// One remote synthesis request
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    /// Bearer credential
    pub credential: SecretString,
    /// Model identifier
    pub model: String,
    /// Voice identifier
    pub voice: String,
    /// Sanitized text
    pub input: String,
    /// Speed multiplier
    pub speed: f64,
}
