//! Speaker output for synthesized audio

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::voice::{AudioSink, PlaybackEvent};
use crate::{Error, Result};

/// Rate used when the audio doesn't say (common TTS output)
const DEFAULT_SAMPLE_RATE: u32 = 24000;

/// Length of the priming blip
const PRIME_DURATION: Duration = Duration::from_millis(50);

/// Amplitude of the priming blip
const PRIME_LEVEL: f32 = 1.0e-4;

/// Completion poll interval on the playback thread
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Plays MP3 audio on the default output device
///
/// One reusable handle: a new `play` or a `reset` stops whatever the
/// previous call started.
#[derive(Default)]
pub struct CpalSpeaker {
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl CpalSpeaker {
    /// Create the speaker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the host has any output device
    #[must_use]
    pub fn is_available() -> bool {
        cpal::default_host().default_output_device().is_some()
    }

    /// Run `samples` on a dedicated thread
    ///
    /// The first receiver resolves once the stream is running (or failed to
    /// start); the second reports how playback ended.
    fn spawn(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
    ) -> (
        oneshot::Receiver<Result<()>>,
        mpsc::UnboundedReceiver<PlaybackEvent>,
    ) {
        let stop = Arc::new(AtomicBool::new(false));
        if let Some(previous) = self.current.lock().replace(Arc::clone(&stop)) {
            previous.store(true, Ordering::SeqCst);
        }

        let (started_tx, started_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || {
            run_playback(&samples, sample_rate, &stop, started_tx, &events_tx);
        });

        (started_rx, events_rx)
    }
}

#[async_trait]
impl AudioSink for CpalSpeaker {
    async fn play(&self, audio: Bytes) -> Result<mpsc::UnboundedReceiver<PlaybackEvent>> {
        let (samples, sample_rate) = tokio::task::spawn_blocking(move || decode_mp3(&audio))
            .await
            .map_err(|e| Error::Audio(format!("decoder task failed: {e}")))??;

        tracing::debug!(samples = samples.len(), sample_rate, "starting playback");

        let (started, events) = self.spawn(samples, sample_rate);
        started
            .await
            .map_err(|_| Error::Audio("playback thread exited".to_string()))??;

        Ok(events)
    }

    fn reset(&self) {
        if let Some(stop) = self.current.lock().take() {
            stop.store(true, Ordering::SeqCst);
            tracing::debug!("playback reset");
        }
    }

    fn prime(&self) -> Result<()> {
        if !Self::is_available() {
            return Err(Error::Audio("no output device available".to_string()));
        }

        #[allow(clippy::cast_possible_truncation)]
        let count = (PRIME_DURATION.as_millis() as usize) * DEFAULT_SAMPLE_RATE as usize / 1000;
        drop(self.spawn(vec![PRIME_LEVEL; count], DEFAULT_SAMPLE_RATE));
        Ok(())
    }
}

/// Playback thread body
fn run_playback(
    samples: &[f32],
    sample_rate: u32,
    stop: &AtomicBool,
    started: oneshot::Sender<Result<()>>,
    events: &mpsc::UnboundedSender<PlaybackEvent>,
) {
    let position = Arc::new(AtomicUsize::new(0));
    let failure = Arc::new(Mutex::new(None::<String>));

    let stream = match build_stream(samples, sample_rate, &position, &failure) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = started.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = started.send(Err(Error::Audio(e.to_string())));
        return;
    }
    let _ = started.send(Ok(()));

    let duration = Duration::from_millis(samples.len() as u64 * 1000 / u64::from(sample_rate));
    let deadline = Instant::now() + duration + Duration::from_millis(500);

    let event = loop {
        if stop.load(Ordering::SeqCst) {
            tracing::debug!("playback stopped early");
            return;
        }
        if let Some(reason) = failure.lock().take() {
            break PlaybackEvent::Failed(reason);
        }
        if position.load(Ordering::SeqCst) >= samples.len() || Instant::now() > deadline {
            // Let the device drain its last buffer
            std::thread::sleep(Duration::from_millis(100));
            break PlaybackEvent::Ended;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    drop(stream);
    let _ = events.send(event);
}

fn build_stream(
    samples: &[f32],
    sample_rate: u32,
    position: &Arc<AtomicUsize>,
    failure: &Arc<Mutex<Option<String>>>,
) -> Result<Stream> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let config = output_config(&device, sample_rate)?;
    let channels = usize::from(config.channels);

    let samples: Arc<[f32]> = Arc::from(samples);
    let position = Arc::clone(position);
    let failure = Arc::clone(failure);

    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = position.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(pos).copied().unwrap_or(0.0);
                    frame.fill(sample);
                    if pos < samples.len() {
                        pos += 1;
                    }
                }
                position.store(pos, Ordering::SeqCst);
            },
            move |err| {
                tracing::error!(error = %err, "playback stream error");
                *failure.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))
}

/// Mono if the device has it at this rate, otherwise stereo
fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .collect();

    configs
        .iter()
        .find(|c| c.channels() == 1)
        .or_else(|| configs.iter().find(|c| c.channels() == 2))
        .map(|c| c.clone().with_sample_rate(rate).config())
        .ok_or_else(|| Error::Audio(format!("no output config at {sample_rate} Hz")))
}

/// Decode MP3 to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the data isn't MP3 or holds no audio
pub fn decode_mp3(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                #[allow(clippy::cast_sign_loss)]
                sample_rate.get_or_insert(frame.sample_rate as u32);

                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|pair| {
                        let left = f32::from(pair[0]) / 32768.0;
                        let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() {
        return Err(Error::Audio("no audio in response".to_string()));
    }

    Ok((samples, sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)))
}
