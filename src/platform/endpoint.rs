//! Energy-based utterance endpointing
//!
//! Splits a microphone stream into one utterance: speech followed by enough
//! silence completes it, and a long stretch with no speech at all gives up.

use super::microphone::SAMPLE_RATE;

/// Minimum RMS energy to count a chunk as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum speech before trailing silence can complete an utterance (0.3 s)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that ends an utterance (0.8 s)
const TRAILING_SILENCE_SAMPLES: usize = 12_800;

/// Samples per second at the capture rate
const SAMPLES_PER_SEC: usize = SAMPLE_RATE as usize;

/// Endpointer tuning, in samples at [`SAMPLE_RATE`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointSettings {
    /// RMS energy above which a chunk is speech
    pub energy_threshold: f32,
    /// Speech required before silence can complete an utterance
    pub min_speech: usize,
    /// Silence after speech that completes the utterance
    pub trailing_silence: usize,
    /// Silence before any speech after which the activation gives up
    pub no_speech_timeout: usize,
    /// Hard cap on one utterance
    pub max_utterance: usize,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            energy_threshold: ENERGY_THRESHOLD,
            min_speech: MIN_SPEECH_SAMPLES,
            trailing_silence: TRAILING_SILENCE_SAMPLES,
            no_speech_timeout: 8 * SAMPLES_PER_SEC,
            max_utterance: 30 * SAMPLES_PER_SEC,
        }
    }
}

/// Result of feeding one chunk
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// Keep feeding
    Pending,
    /// A complete utterance, including its lead-in and trailing silence
    Utterance(Vec<f32>),
    /// Nothing was said before the timeout
    NoSpeech,
}

/// Endpointer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// No speech yet
    Waiting,
    /// Speech heard, accumulating until silence
    Speech,
}

/// Finds the end of one spoken utterance in a sample stream
#[derive(Debug)]
pub struct EndpointDetector {
    settings: EndpointSettings,
    state: EndpointState,
    buffer: Vec<f32>,
    speech_samples: usize,
    silence: usize,
    waited: usize,
}

impl Default for EndpointDetector {
    fn default() -> Self {
        Self::new(EndpointSettings::default())
    }
}

impl EndpointDetector {
    /// Create a detector
    #[must_use]
    pub const fn new(settings: EndpointSettings) -> Self {
        Self {
            settings,
            state: EndpointState::Waiting,
            buffer: Vec::new(),
            speech_samples: 0,
            silence: 0,
            waited: 0,
        }
    }

    /// Feed the next chunk of samples
    pub fn feed(&mut self, samples: &[f32]) -> Endpoint {
        if samples.is_empty() {
            return Endpoint::Pending;
        }

        let energy = calculate_energy(samples);
        let is_speech = energy > self.settings.energy_threshold;

        match self.state {
            EndpointState::Waiting => {
                if is_speech {
                    tracing::trace!(energy, "speech onset");
                    self.state = EndpointState::Speech;
                    self.buffer.extend_from_slice(samples);
                    self.speech_samples = samples.len();
                    self.silence = 0;
                    return Endpoint::Pending;
                }

                self.waited += samples.len();
                if self.waited >= self.settings.no_speech_timeout {
                    tracing::debug!(waited = self.waited, "no speech before timeout");
                    self.reset();
                    return Endpoint::NoSpeech;
                }
                Endpoint::Pending
            }
            EndpointState::Speech => {
                self.buffer.extend_from_slice(samples);
                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                let ended = self.silence >= self.settings.trailing_silence;
                if ended && self.speech_samples < self.settings.min_speech {
                    // A click or a cough; keep waiting for real speech
                    tracing::trace!(speech = self.speech_samples, "discarding short burst");
                    self.waited += self.buffer.len();
                    self.state = EndpointState::Waiting;
                    self.buffer.clear();
                    self.speech_samples = 0;
                    self.silence = 0;
                    return Endpoint::Pending;
                }

                if ended || self.buffer.len() >= self.settings.max_utterance {
                    tracing::debug!(
                        samples = self.buffer.len(),
                        speech = self.speech_samples,
                        "utterance complete"
                    );
                    let utterance = std::mem::take(&mut self.buffer);
                    self.reset();
                    return Endpoint::Utterance(utterance);
                }

                Endpoint::Pending
            }
        }
    }

    /// End early, keeping what was said so far if it's long enough
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        let speech = (self.state == EndpointState::Speech
            && self.speech_samples >= self.settings.min_speech)
            .then(|| std::mem::take(&mut self.buffer));
        self.reset();
        speech
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> EndpointState {
        self.state
    }

    /// Forget everything heard so far
    pub fn reset(&mut self) {
        self.state = EndpointState::Waiting;
        self.buffer.clear();
        self.speech_samples = 0;
        self.silence = 0;
        self.waited = 0;
    }
}

/// RMS energy of a chunk
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
