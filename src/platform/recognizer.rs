//! Microphone speech recognizer
//!
//! One activation runs on its own thread: capture until the endpointer
//! finds the end of an utterance, encode it as WAV, and transcribe it over
//! HTTP. Events go to the single subscriber. Starting a new activation
//! aborts one that is still winding down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::endpoint::{Endpoint, EndpointDetector, EndpointSettings};
use super::microphone::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use crate::voice::{ActivationEvent, RecognitionEngine, RecognitionEvent, SpeechToText};
use crate::{Error, Result};

/// How often the capture thread drains the microphone
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Flags shared with one activation's thread
#[derive(Debug, Default)]
struct Control {
    stop: AtomicBool,
    abort: CancellationToken,
    finished: AtomicBool,
}

/// How the capture loop ended
enum Captured {
    Speech(Vec<f32>),
    NoSpeech,
    Aborted,
}

/// Sends events tagged with one activation id
struct Emitter {
    activation: u64,
    tx: mpsc::UnboundedSender<ActivationEvent>,
}

impl Emitter {
    fn send(&self, event: RecognitionEvent) {
        let _ = self.tx.send(ActivationEvent {
            activation: self.activation,
            event,
        });
    }

    fn error(&self, code: &str) {
        self.send(RecognitionEvent::Error(code.to_string()));
    }
}

/// Recognition engine built on the default microphone and an STT service
pub struct MicRecognizer {
    stt: Arc<SpeechToText>,
    runtime: Handle,
    settings: EndpointSettings,
    subscriber: Mutex<Option<mpsc::UnboundedSender<ActivationEvent>>>,
    active: Mutex<Option<Arc<Control>>>,
}

impl MicRecognizer {
    /// Create a recognizer that transcribes through `stt`
    #[must_use]
    pub fn new(stt: SpeechToText, runtime: Handle) -> Self {
        Self::with_settings(stt, runtime, EndpointSettings::default())
    }

    /// Create a recognizer with custom endpointing
    #[must_use]
    pub fn with_settings(stt: SpeechToText, runtime: Handle, settings: EndpointSettings) -> Self {
        Self {
            stt: Arc::new(stt),
            runtime,
            settings,
            subscriber: Mutex::new(None),
            active: Mutex::new(None),
        }
    }

    /// Whether this host can record at all
    #[must_use]
    pub fn is_supported() -> bool {
        AudioCapture::is_available()
    }

    /// Install controls for a new activation, aborting one still running
    fn claim(&self) -> Arc<Control> {
        let control = Arc::new(Control::default());
        if let Some(previous) = self.active.lock().replace(Arc::clone(&control)) {
            if !previous.finished.load(Ordering::SeqCst) {
                tracing::debug!("superseding unfinished recognition");
                previous.abort.cancel();
            }
        }
        control
    }
}

impl RecognitionEngine for MicRecognizer {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ActivationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.subscriber.lock() = Some(tx);
        rx
    }

    fn start(&self, activation: u64) -> Result<()> {
        let tx = self
            .subscriber
            .lock()
            .clone()
            .ok_or_else(|| Error::Stt("recognizer has no subscriber".to_string()))?;

        if !AudioCapture::is_available() {
            return Err(Error::Audio("no input device available".to_string()));
        }

        let control = self.claim();
        let emitter = Emitter { activation, tx };
        let stt = Arc::clone(&self.stt);
        let runtime = self.runtime.clone();
        let settings = self.settings;

        std::thread::Builder::new()
            .name("beacon-voice-capture".to_string())
            .spawn(move || {
                run_activation(&stt, &runtime, settings, &control, &emitter);
                control.finished.store(true, Ordering::SeqCst);
                emitter.send(RecognitionEvent::End);
            })
            .map_err(|e| Error::Audio(format!("failed to spawn capture thread: {e}")))?;

        Ok(())
    }

    fn stop(&self) {
        if let Some(control) = self.active.lock().as_ref() {
            control.stop.store(true, Ordering::SeqCst);
        }
    }

    fn abort(&self) {
        if let Some(control) = self.active.lock().as_ref() {
            control.abort.cancel();
        }
    }
}

/// Capture thread body; the caller sends `End`
fn run_activation(
    stt: &SpeechToText,
    runtime: &Handle,
    settings: EndpointSettings,
    control: &Control,
    emitter: &Emitter,
) {
    let mut mic = match AudioCapture::open().and_then(|mut mic| mic.start().map(|()| mic)) {
        Ok(mic) => mic,
        Err(e) => {
            tracing::warn!(error = %e, "microphone unavailable");
            emitter.error("audio-capture");
            return;
        }
    };
    emitter.send(RecognitionEvent::Start);

    let captured = capture_utterance(&mic, settings, control);
    mic.stop();

    let samples = match captured {
        Captured::Speech(samples) => samples,
        Captured::NoSpeech => {
            if !control.stop.load(Ordering::SeqCst) {
                emitter.error("no-speech");
            }
            return;
        }
        Captured::Aborted => {
            emitter.error("aborted");
            return;
        }
    };

    let wav = match samples_to_wav(&samples, SAMPLE_RATE) {
        Ok(wav) => wav,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode utterance");
            emitter.error("audio-capture");
            return;
        }
    };

    match runtime.block_on(transcribe_unless_aborted(stt, wav, &control.abort)) {
        None => emitter.error("aborted"),
        Some(Ok(text)) => emitter.send(RecognitionEvent::Result(text)),
        Some(Err(e)) => {
            let failure = SpeechToText::classify(&e);
            tracing::warn!(error = %e, code = failure.code(), "transcription failed");
            emitter.error(failure.code());
        }
    }
}

/// Transcribe, giving up as soon as `abort` fires
async fn transcribe_unless_aborted(
    stt: &SpeechToText,
    wav: Vec<u8>,
    abort: &CancellationToken,
) -> Option<Result<String>> {
    tokio::select! {
        biased;
        () = abort.cancelled() => None,
        result = stt.transcribe(wav) => Some(result),
    }
}

fn capture_utterance(mic: &AudioCapture, settings: EndpointSettings, control: &Control) -> Captured {
    let mut detector = EndpointDetector::new(settings);

    loop {
        if control.abort.is_cancelled() {
            return Captured::Aborted;
        }

        match detector.feed(&mic.take_buffer()) {
            Endpoint::Pending => {}
            Endpoint::Utterance(samples) => return Captured::Speech(samples),
            Endpoint::NoSpeech => return Captured::NoSpeech,
        }

        if control.stop.load(Ordering::SeqCst) {
            return detector.flush().map_or(Captured::NoSpeech, Captured::Speech);
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stt(base_url: &str) -> SpeechToText {
        SpeechToText::new(
            base_url,
            SecretString::from("sk-test".to_string()),
            "whisper-1".to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_new_activation_aborts_unfinished_one() {
        let recognizer = MicRecognizer::new(stt("http://127.0.0.1:9"), Handle::current());

        let first = recognizer.claim();
        let second = recognizer.claim();
        assert!(first.abort.is_cancelled());
        assert!(!second.abort.is_cancelled());

        // A finished activation is left alone
        second.finished.store(true, Ordering::SeqCst);
        let _third = recognizer.claim();
        assert!(!second.abort.is_cancelled());
    }

    #[tokio::test]
    async fn test_abort_interrupts_slow_transcription() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "text": "too slow" }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let stt = stt(&server.uri());
        let abort = CancellationToken::new();
        let trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            transcribe_unless_aborted(&stt, vec![0; 64], &abort),
        )
        .await
        .expect("abort should end the request promptly");
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_transcription_completes_without_abort() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "hi" })),
            )
            .mount(&server)
            .await;

        let stt = stt(&server.uri());
        let outcome = transcribe_unless_aborted(&stt, vec![0; 64], &CancellationToken::new()).await;
        assert_eq!(outcome.unwrap().unwrap(), "hi");
    }
}
