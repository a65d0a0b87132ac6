//! Shared test utilities: in-memory engines and a controller harness

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use secrecy::SecretString;
use tokio::sync::mpsc;

use beacon_voice::voice::{
    ActivationEvent, AudioSink, AudioUnlockState, LocalSynthesizer, LocalVoice, OutputBackends, PlaybackEvent,
    ProviderConfig, ProviderKind, RecognitionEngine, RecognitionEvent, RemoteSynthesizer,
    SpeechRequest, SynthesisErrorKind, Utterance, UtteranceEvent, VoiceBackends, VoiceController,
    VoiceEvent, VoiceTimings,
};
use beacon_voice::{Error, Result};

/// Let spawned tasks run without firing any controller timer
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Recognition engine driven by the test
#[derive(Default)]
pub struct FakeRecognizer {
    tx: Mutex<Option<mpsc::UnboundedSender<ActivationEvent>>>,
    /// Id of the most recent activation
    pub current: AtomicU64,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub aborts: AtomicUsize,
    pub fail_start: AtomicBool,
}

impl FakeRecognizer {
    /// Push an event for the current activation
    pub fn emit(&self, event: RecognitionEvent) {
        self.emit_for(self.current.load(Ordering::SeqCst), event);
    }

    /// Push an event tagged with any activation id
    pub fn emit_for(&self, activation: u64, event: RecognitionEvent) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(ActivationEvent { activation, event });
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl RecognitionEngine for FakeRecognizer {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ActivationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock() = Some(tx);
        rx
    }

    fn start(&self, activation: u64) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Audio("device busy".to_string()));
        }
        self.current.store(activation, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.emit(RecognitionEvent::End);
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.emit(RecognitionEvent::Error("aborted".to_string()));
        self.emit(RecognitionEvent::End);
    }
}

/// Audio sink that "plays" for a fixed duration
pub struct FakeSink {
    pub plays: Mutex<Vec<Bytes>>,
    pub resets: AtomicUsize,
    pub primes: AtomicUsize,
    pub reject: AtomicBool,
    pub duration: Mutex<Duration>,
}

impl Default for FakeSink {
    fn default() -> Self {
        Self {
            plays: Mutex::new(Vec::new()),
            resets: AtomicUsize::new(0),
            primes: AtomicUsize::new(0),
            reject: AtomicBool::new(false),
            duration: Mutex::new(Duration::from_millis(200)),
        }
    }
}

impl FakeSink {
    pub fn play_count(&self) -> usize {
        self.plays.lock().len()
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&self, audio: Bytes) -> Result<mpsc::UnboundedReceiver<PlaybackEvent>> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(Error::Audio("autoplay blocked".to_string()));
        }
        self.plays.lock().push(audio);

        let (tx, rx) = mpsc::unbounded_channel();
        let duration = *self.duration.lock();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(PlaybackEvent::Ended);
        });
        Ok(rx)
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn prime(&self) -> Result<()> {
        self.primes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Local engine with scripted timing and stalls
pub struct FakeLocal {
    pub voices: Mutex<Vec<LocalVoice>>,
    pub spoken: Mutex<Vec<Utterance>>,
    pub duration: Mutex<Duration>,
    pub cancels: AtomicUsize,
    pub resumes: AtomicUsize,
    pub paused: Arc<AtomicBool>,
    /// Pause right after starting, until resumed
    pub stall: AtomicBool,
    /// Report `Started`
    pub announce: AtomicBool,
    /// Fail every utterance with this code
    pub fail_with: Mutex<Option<String>>,
    current: Mutex<Option<mpsc::UnboundedSender<UtteranceEvent>>>,
}

impl Default for FakeLocal {
    fn default() -> Self {
        Self {
            voices: Mutex::new(vec![
                voice("Fred", "en-US"),
                voice("Samantha", "en-US"),
                voice("Anna", "de-DE"),
            ]),
            spoken: Mutex::new(Vec::new()),
            duration: Mutex::new(Duration::from_millis(300)),
            cancels: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
            paused: Arc::new(AtomicBool::new(false)),
            stall: AtomicBool::new(false),
            announce: AtomicBool::new(true),
            fail_with: Mutex::new(None),
            current: Mutex::new(None),
        }
    }
}

impl FakeLocal {
    /// Texts spoken, excluding the silent priming utterance
    pub fn texts(&self) -> Vec<String> {
        self.spoken
            .lock()
            .iter()
            .filter(|u| u.volume > 0.0)
            .map(|u| u.text.clone())
            .collect()
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }
}

impl LocalSynthesizer for FakeLocal {
    fn voices(&self) -> Vec<LocalVoice> {
        self.voices.lock().clone()
    }

    fn speak(&self, utterance: Utterance) -> Result<mpsc::UnboundedReceiver<UtteranceEvent>> {
        self.spoken.lock().push(utterance);

        let (tx, rx) = mpsc::unbounded_channel();
        *self.current.lock() = Some(tx.clone());

        let duration = *self.duration.lock();
        let stall = self.stall.load(Ordering::SeqCst);
        let announce = self.announce.load(Ordering::SeqCst);
        let failure = self.fail_with.lock().clone();
        let paused = Arc::clone(&self.paused);

        tokio::spawn(async move {
            if let Some(code) = failure {
                let _ = tx.send(UtteranceEvent::Failed(SynthesisErrorKind::from_code(&code)));
                return;
            }
            if announce {
                let _ = tx.send(UtteranceEvent::Started);
            }
            if stall {
                paused.store(true, Ordering::SeqCst);
                while paused.load(Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
            tokio::time::sleep(duration).await;
            let _ = tx.send(UtteranceEvent::Ended);
        });

        Ok(rx)
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.current.lock().take() {
            let _ = tx.send(UtteranceEvent::Failed(SynthesisErrorKind::Interrupted));
        }
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }
}

/// Remote synthesizer that records requests
pub struct FakeRemote {
    pub requests: Mutex<Vec<SpeechRequest>>,
    pub fail: AtomicBool,
    pub delay: Mutex<Duration>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            delay: Mutex::new(Duration::from_millis(100)),
        }
    }
}

impl FakeRemote {
    pub fn inputs(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.input.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteSynthesizer for FakeRemote {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Bytes> {
        self.requests.lock().push(request.clone());
        let delay = *self.delay.lock();
        tokio::time::sleep(delay).await;

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Tts("OpenAI TTS error 500: upstream down".to_string()));
        }
        Ok(Bytes::from_static(b"ID3 fake mp3"))
    }
}

pub fn voice(name: &str, lang: &str) -> LocalVoice {
    LocalVoice {
        name: name.to_string(),
        lang: lang.to_string(),
        is_default: false,
    }
}

/// Providers with the remote provider active and a credential set
pub fn remote_providers() -> ProviderConfig {
    let mut providers = ProviderConfig {
        active: ProviderKind::Remote,
        ..ProviderConfig::default()
    };
    providers.remote.credential = Some(SecretString::from("sk-test".to_string()));
    providers
}

/// Controller wired to fakes
pub struct Harness {
    pub controller: VoiceController,
    pub recognizer: Arc<FakeRecognizer>,
    pub sink: Arc<FakeSink>,
    pub local: Arc<FakeLocal>,
    pub remote: Arc<FakeRemote>,
    pub unlock: AudioUnlockState,
    events: mpsc::UnboundedReceiver<VoiceEvent>,
}

pub struct HarnessBuilder {
    providers: ProviderConfig,
    unlocked: bool,
    recognition: bool,
    remote: Option<Arc<dyn RemoteSynthesizer>>,
}

impl HarnessBuilder {
    pub fn providers(mut self, providers: ProviderConfig) -> Self {
        self.providers = providers;
        self
    }

    pub fn locked(mut self) -> Self {
        self.unlocked = false;
        self
    }

    pub fn without_recognition(mut self) -> Self {
        self.recognition = false;
        self
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteSynthesizer>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Must run inside a tokio runtime
    pub fn build(self) -> Harness {
        let recognizer = Arc::new(FakeRecognizer::default());
        let sink = Arc::new(FakeSink::default());
        let local = Arc::new(FakeLocal::default());
        let remote = Arc::new(FakeRemote::default());

        let unlock = if self.unlocked {
            AudioUnlockState::unlocked()
        } else {
            AudioUnlockState::new()
        };

        let recognizer_backend: Option<Arc<dyn RecognitionEngine>> = if self.recognition {
            Some(recognizer.clone() as Arc<dyn RecognitionEngine>)
        } else {
            None
        };

        let remote_backend: Arc<dyn RemoteSynthesizer> =
            self.remote.unwrap_or_else(|| remote.clone() as Arc<dyn RemoteSynthesizer>);

        let (tx, events) = mpsc::unbounded_channel();
        let controller = VoiceController::new(
            VoiceBackends {
                recognizer: recognizer_backend,
                output: OutputBackends {
                    sink: sink.clone(),
                    local: local.clone(),
                    remote: remote_backend,
                },
            },
            self.providers,
            unlock.clone(),
            Arc::new(tx),
            VoiceTimings::default(),
        );

        Harness {
            controller,
            recognizer,
            sink,
            local,
            remote,
            unlock,
            events,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            providers: ProviderConfig::default(),
            unlocked: true,
            recognition: true,
            remote: None,
        }
    }

    /// Local provider, unlocked, with recognition
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Every event received so far
    pub fn drain(&mut self) -> Vec<VoiceEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}
