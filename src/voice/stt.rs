//! Speech-to-text over HTTP
//!
//! Used by the microphone recognizer to turn one endpointed utterance into a
//! transcript.

use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Default Deepgram API base URL
pub const DEEPGRAM_BASE_URL: &str = "https://api.deepgram.com";

/// Response from `OpenAI` Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// STT service flavor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SttApi {
    /// `OpenAI` Whisper
    Whisper,
    /// Deepgram
    Deepgram,
}

impl SttApi {
    /// Pick the API from a model name (`deepgram/nova-2` or `nova-2` → Deepgram)
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("deepgram/") || model.starts_with("nova") {
            Self::Deepgram
        } else {
            Self::Whisper
        }
    }
}

/// Transcribes WAV audio to text
#[derive(Debug, Clone)]
pub struct SpeechToText {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    api: SttApi,
}

/// Classified transcription failure, mapped onto recognition error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscribeFailure {
    /// Service unreachable or returned a server error
    Network,
    /// Credential rejected
    NotAllowed,
}

impl TranscribeFailure {
    /// Recognition engine error code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::NotAllowed => "service-not-allowed",
        }
    }
}

impl SpeechToText {
    /// Create a transcriber
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or the client can't be built
    pub fn new(base_url: &str, api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("API key required for STT".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        let api = SttApi::for_model(&model);
        let model = model.trim_start_matches("deepgram/").to_string();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            api,
        })
    }

    /// Transcribe WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response can't be parsed
    pub async fn transcribe(&self, wav: Vec<u8>) -> Result<String> {
        match self.api {
            SttApi::Whisper => self.transcribe_whisper(wav).await,
            SttApi::Deepgram => self.transcribe_deepgram(wav).await,
        }
    }

    /// Classify a transcription error for the recognition taxonomy
    #[must_use]
    pub fn classify(error: &Error) -> TranscribeFailure {
        match error {
            Error::SttStatus { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN =>
            {
                TranscribeFailure::NotAllowed
            }
            _ => TranscribeFailure::Network,
        }
    }

    async fn transcribe_whisper(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::SttStatus {
                service: "Whisper",
                status,
                body,
            });
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }

    async fn transcribe_deepgram(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Deepgram transcription");

        let response = self
            .client
            .post(format!("{}/v1/listen", self.base_url))
            .query(&[("model", self.model.as_str()), ("punctuate", "true")])
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "audio/wav")
            .body(wav)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::SttStatus {
                service: "Deepgram",
                status,
                body,
            });
        }

        let result: DeepgramResponse = response.json().await?;
        Ok(result
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_for_model() {
        assert_eq!(SttApi::for_model("whisper-1"), SttApi::Whisper);
        assert_eq!(SttApi::for_model("deepgram/nova-2"), SttApi::Deepgram);
        assert_eq!(SttApi::for_model("nova-3"), SttApi::Deepgram);
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = SpeechToText::new(
            "https://api.openai.com",
            SecretString::from(String::new()),
            "whisper-1".to_string(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_classify_auth_failures() {
        let status = |status: StatusCode, body: &str| Error::SttStatus {
            service: "Whisper",
            status,
            body: body.to_string(),
        };

        let denied = status(StatusCode::UNAUTHORIZED, "bad key");
        assert_eq!(SpeechToText::classify(&denied), TranscribeFailure::NotAllowed);

        let forbidden = status(StatusCode::FORBIDDEN, "");
        assert_eq!(SpeechToText::classify(&forbidden), TranscribeFailure::NotAllowed);

        // The body never decides the classification
        let down = status(StatusCode::SERVICE_UNAVAILABLE, "upstream returned 401");
        assert_eq!(SpeechToText::classify(&down), TranscribeFailure::Network);

        let message = Error::Stt("error 401".to_string());
        assert_eq!(SpeechToText::classify(&message), TranscribeFailure::Network);
    }
}
