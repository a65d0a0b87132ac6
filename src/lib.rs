//! Beacon Voice - speech front-end for conversational assistants
//!
//! Turns microphone audio into transcripts and assistant text into audible
//! speech, with one exclusive microphone/speaker resource:
//! - Speech capture: single-utterance recognition, classified errors,
//!   continuous re-listening
//! - Speech output: remote synthesis with local fallback, barge-in,
//!   stall recovery for local engines
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Application                       │
//! │        VoiceEvents callbacks  │  speak / listen      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 VoiceController                      │
//! │   SpeechCapture  │  SpeechOutput  │  VoiceSession    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Engine traits                       │
//! │  Recognition │ AudioSink │ Local TTS │ Remote TTS    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod platform;
pub mod voice;

pub use config::Config;
pub use error::{Error, RecognitionErrorKind, Result, VoiceError};
pub use voice::{
    Phase, ProviderConfig, ProviderKind, VoiceBackends, VoiceController, VoiceEvent, VoiceEvents,
    VoiceTimings,
};
