//! Configuration management for the voice front-end

pub mod file;

use secrecy::SecretString;

use crate::voice::{
    ELEVENLABS_BASE_URL, LocalVoiceSettings, OPENAI_BASE_URL, ProviderConfig, ProviderKind,
    RemoteVoice, SttApi, TtsApi,
};
use crate::{Error, Result};

/// Voice front-end configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Base URL of the OpenAI-compatible speech API
    pub speech_base_url: String,

    /// Base URL of the `ElevenLabs` API
    pub elevenlabs_base_url: String,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Provider tried first for speech output
    pub provider: ProviderKind,

    /// Remote TTS API
    pub tts_api: TtsApi,

    /// Remote TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// Remote TTS voice identifier
    pub tts_voice: String,

    /// Remote TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f64,

    /// STT model (e.g. "whisper-1", "deepgram/nova-2")
    pub stt_model: String,

    /// Exact local voice name to prefer
    pub local_voice: Option<String>,

    /// Language prefix for local voice selection
    pub language: String,

    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,

    /// Re-listen after every turn
    pub continuous: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        let remote = RemoteVoice::default();
        let local = LocalVoiceSettings::default();
        Self {
            provider: ProviderKind::default(),
            tts_api: TtsApi::default(),
            tts_model: remote.model,
            tts_voice: remote.voice_id,
            tts_speed: remote.speed,
            stt_model: "whisper-1".to_string(),
            local_voice: local.preferred_voice,
            language: local.language,
            rate: local.rate,
            pitch: local.pitch,
            volume: local.volume,
            continuous: false,
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (for Whisper and TTS)
    pub openai: Option<SecretString>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<SecretString>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Layer `env` over a parsed config file over defaults
    ///
    /// # Errors
    ///
    /// Returns error if the provider name, TTS API or TTS speed is invalid
    pub fn from_sources(
        fc: file::VoiceConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = VoiceConfig::default();
        let secret = |value: Option<String>| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: secret(env("OPENAI_API_KEY").or(fc.api_keys.openai)),
            deepgram: secret(env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram)),
            elevenlabs: secret(env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs)),
        };

        let provider = env("BEACON_TTS_PROVIDER")
            .or(fc.voice.provider)
            .map(|p| p.parse::<ProviderKind>())
            .transpose()?
            .unwrap_or(defaults.provider);

        let tts_api = env("BEACON_TTS_API")
            .or(fc.voice.tts_api)
            .map(|api| api.parse::<TtsApi>())
            .transpose()?
            .unwrap_or(defaults.tts_api);

        let tts_speed = match env("BEACON_TTS_SPEED") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<f64>()
                    .map_err(|e| Error::Config(format!("invalid BEACON_TTS_SPEED {raw:?}: {e}")))?,
            ),
            None => fc.voice.tts_speed,
        }
        .map(RemoteVoice::validate_speed)
        .transpose()?
        .unwrap_or(defaults.tts_speed);

        let voice = VoiceConfig {
            provider,
            tts_api,
            tts_model: env("BEACON_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| tts_api.default_model().to_string()),
            tts_voice: env("BEACON_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| tts_api.default_voice().to_string()),
            tts_speed,
            stt_model: env("BEACON_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or(defaults.stt_model),
            local_voice: env("BEACON_LOCAL_VOICE").or(fc.voice.local_voice),
            language: env("BEACON_VOICE_LANGUAGE")
                .or(fc.voice.language)
                .unwrap_or(defaults.language),
            rate: fc.voice.rate.unwrap_or(defaults.rate),
            pitch: fc.voice.pitch.unwrap_or(defaults.pitch),
            volume: fc
                .voice
                .volume
                .unwrap_or(defaults.volume)
                .clamp(0.0, 1.0),
            continuous: fc.voice.continuous.unwrap_or(defaults.continuous),
        };

        let speech_base_url = env("BEACON_SPEECH_BASE_URL")
            .or(fc.server.speech_base_url)
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
        let elevenlabs_base_url = env("BEACON_ELEVENLABS_BASE_URL")
            .or(fc.server.elevenlabs_base_url)
            .unwrap_or_else(|| ELEVENLABS_BASE_URL.to_string());

        Ok(Self {
            voice,
            api_keys,
            speech_base_url,
            elevenlabs_base_url,
        })
    }

    /// Provider configuration for the output controller
    #[must_use]
    pub fn provider_config(&self) -> ProviderConfig {
        let voice = &self.voice;
        ProviderConfig {
            active: voice.provider,
            remote: RemoteVoice {
                credential: self.tts_key(),
                model: voice.tts_model.clone(),
                voice_id: voice.tts_voice.clone(),
                speed: voice.tts_speed,
            },
            local: LocalVoiceSettings {
                preferred_voice: voice.local_voice.clone(),
                language: voice.language.clone(),
                rate: voice.rate,
                pitch: voice.pitch,
                volume: voice.volume,
            },
        }
    }

    /// Key for the configured TTS API
    #[must_use]
    pub fn tts_key(&self) -> Option<SecretString> {
        match self.voice.tts_api {
            TtsApi::OpenAI => self.api_keys.openai.clone(),
            TtsApi::ElevenLabs => self.api_keys.elevenlabs.clone(),
        }
    }

    /// Base URL for the configured TTS API
    #[must_use]
    pub fn tts_base_url(&self) -> &str {
        match self.voice.tts_api {
            TtsApi::OpenAI => &self.speech_base_url,
            TtsApi::ElevenLabs => &self.elevenlabs_base_url,
        }
    }

    /// Key for the configured STT service
    #[must_use]
    pub fn stt_key(&self) -> Option<SecretString> {
        match SttApi::for_model(&self.voice.stt_model) {
            SttApi::Whisper => self.api_keys.openai.clone(),
            SttApi::Deepgram => self.api_keys.deepgram.clone(),
        }
    }
}
