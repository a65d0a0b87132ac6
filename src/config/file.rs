//! TOML configuration file loading
//!
//! Reads `~/.config/omni/beacon-voice/config.toml`. Every field is optional;
//! the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VoiceConfigFile {
    /// Speech input and output
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Service endpoints
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// `[voice]` table
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// "remote" or "local"
    pub provider: Option<String>,

    /// Remote TTS API: "openai" or "elevenlabs"
    pub tts_api: Option<String>,

    /// Remote TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// Remote TTS voice (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// Remote TTS speed, 0.25 to 4.0
    pub tts_speed: Option<f64>,

    /// STT model (e.g. "whisper-1", "deepgram/nova-2")
    pub stt_model: Option<String>,

    /// Preferred local voice name
    pub local_voice: Option<String>,

    /// Language for local voice selection
    pub language: Option<String>,

    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,

    /// Listen again after every turn
    pub continuous: Option<bool>,
}

/// `[api_keys]` table
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// `[server]` table
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Base URL of the OpenAI-compatible speech API
    pub speech_base_url: Option<String>,

    /// Base URL of the `ElevenLabs` API
    pub elevenlabs_base_url: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `VoiceConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> VoiceConfigFile {
    let Some(path) = config_file_path() else {
        return VoiceConfigFile::default();
    };

    if !path.exists() {
        return VoiceConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            VoiceConfigFile::default()
        }
    }
}

/// Read and parse one config file
///
/// # Errors
///
/// Returns error if the file can't be read or isn't valid TOML
pub fn read_config_file(path: &Path) -> Result<VoiceConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/omni/beacon-voice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-voice")
            .join("config.toml")
    })
}
