//! Desktop backends for the voice engine traits
//!
//! Microphone capture and speaker playback through `cpal`, local synthesis
//! through `espeak-ng`.

mod endpoint;
mod espeak;
mod microphone;
mod recognizer;
mod speaker;

pub use endpoint::{Endpoint, EndpointDetector, EndpointSettings, EndpointState, calculate_energy};
pub use espeak::{ESPEAK_PROGRAM, EspeakSynthesizer};
pub use microphone::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use recognizer::MicRecognizer;
pub use speaker::{CpalSpeaker, decode_mp3};
