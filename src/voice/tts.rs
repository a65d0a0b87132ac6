//! Remote text-to-speech over HTTP

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use secrecy::ExposeSecret;

use super::engine::RemoteSynthesizer;
use super::provider::SpeechRequest;
use crate::{Error, Result};

/// Default `OpenAI` API base URL
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Default `ElevenLabs` API base URL
pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// Remote TTS API flavor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TtsApi {
    /// `OpenAI`-compatible `/v1/audio/speech`
    #[default]
    OpenAI,
    /// `ElevenLabs` `/v1/text-to-speech/{voice}`
    ElevenLabs,
}

impl TtsApi {
    /// Model used when none is configured
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAI => "tts-1",
            Self::ElevenLabs => "eleven_monolingual_v1",
        }
    }

    /// Voice used when none is configured
    #[must_use]
    pub const fn default_voice(self) -> &'static str {
        match self {
            Self::OpenAI => "alloy",
            Self::ElevenLabs => "21m00Tcm4TlvDq8ikWAM",
        }
    }

    /// Base URL used when none is configured
    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAI => OPENAI_BASE_URL,
            Self::ElevenLabs => ELEVENLABS_BASE_URL,
        }
    }
}

impl FromStr for TtsApi {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "elevenlabs" | "eleven_labs" | "11labs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS API: {other}"))),
        }
    }
}

/// Synthesizes speech through a remote HTTP API
#[derive(Debug, Clone)]
pub struct HttpSpeechSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api: TtsApi,
}

impl HttpSpeechSynthesizer {
    /// Create a synthesizer for an `OpenAI`-compatible endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn openai(base_url: &str) -> Result<Self> {
        Self::new(base_url, TtsApi::OpenAI)
    }

    /// Create a synthesizer for `ElevenLabs`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn elevenlabs(base_url: &str) -> Result<Self> {
        Self::new(base_url, TtsApi::ElevenLabs)
    }

    /// Create a synthesizer for `api` at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str, api: TtsApi) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api,
        })
    }

    /// Synthesize using the `OpenAI` speech endpoint
    async fn synthesize_openai(&self, request: &SpeechRequest) -> Result<Bytes> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            voice: &'a str,
            input: &'a str,
            speed: f64,
        }

        let body = TtsRequest {
            model: &request.model,
            voice: &request.voice,
            input: &request.input,
            speed: request.speed,
        };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .bearer_auth(request.credential.expose_secret())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?)
    }

    /// Synthesize using `ElevenLabs`; the voice goes in the path and speed
    /// isn't supported
    async fn synthesize_elevenlabs(&self, request: &SpeechRequest) -> Result<Bytes> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let body = ElevenLabsRequest {
            text: &request.input,
            model_id: &request.model,
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/text-to-speech/{}",
                self.base_url, request.voice
            ))
            .header("xi-api-key", request.credential.expose_secret())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl RemoteSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Bytes> {
        tracing::debug!(
            api = ?self.api,
            chars = request.input.len(),
            "remote synthesis request"
        );

        let audio = match self.api {
            TtsApi::OpenAI => self.synthesize_openai(request).await,
            TtsApi::ElevenLabs => self.synthesize_elevenlabs(request).await,
        }
        .inspect_err(|e| tracing::warn!(error = %e, "remote synthesis failed"))?;

        tracing::debug!(audio_bytes = audio.len(), "remote synthesis complete");
        Ok(audio)
    }
}
