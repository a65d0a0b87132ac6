use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use beacon_voice::{Config, VoiceError};
use beacon_voice::platform::{
    AudioCapture, CpalSpeaker, EspeakSynthesizer, MicRecognizer, calculate_energy,
};
use beacon_voice::voice::{
    AudioUnlockState, DEEPGRAM_BASE_URL, HttpSpeechSynthesizer, LocalSynthesizer, OutputBackends,
    ProviderKind, RecognitionEngine, SpeechToText, SttApi, VoiceBackends, VoiceController,
    VoiceEvent, VoiceTimings, sanitize_for_speech, select_voice,
};

/// Beacon Voice - speech in, speech out
#[derive(Parser)]
#[command(name = "beacon-voice", version, about)]
struct Cli {
    /// Use on-device synthesis only
    #[arg(long, env = "BEACON_LOCAL_ONLY")]
    local: bool,

    /// Listen again after every turn
    #[arg(long)]
    continuous: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Speak text aloud
    Say {
        /// Text to speak
        text: String,
    },
    /// Listen for one utterance and print the transcript
    Listen,
    /// Listen and read every transcript back until interrupted
    Converse,
    /// List local voices and show which one would be used
    Voices,
    /// Print text the way it would be spoken
    Sanitize {
        /// Text to clean
        text: String,
    },
    /// Show a live microphone level meter
    MicCheck {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,beacon_voice=info",
        1 => "info,beacon_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Sanitize { text } => {
            println!("{}", sanitize_for_speech(&text));
            Ok(())
        }
        Command::Voices => list_voices().await,
        Command::MicCheck { duration } => mic_check(duration).await,
        Command::Say { text } => {
            let config = Config::load()?;
            let (controller, _events) = build_controller(&config, cli.local, false).await?;
            controller.speak(&text).await?;
            Ok(())
        }
        Command::Listen => {
            let config = Config::load()?;
            let (controller, events) = build_controller(&config, cli.local, true).await?;
            controller.set_continuous_mode(cli.continuous || config.voice.continuous);
            listen_once(&controller, events).await
        }
        Command::Converse => {
            let config = Config::load()?;
            let (controller, events) = build_controller(&config, cli.local, true).await?;
            controller.set_continuous_mode(true);
            converse(&controller, events).await
        }
    }
}

/// Wire the desktop backends into a controller
async fn build_controller(
    config: &Config,
    local_only: bool,
    with_recognizer: bool,
) -> anyhow::Result<(VoiceController, mpsc::UnboundedReceiver<VoiceEvent>)> {
    let local = EspeakSynthesizer::new();
    let count = local.load_voices().await;
    tracing::debug!(count, "local voices ready");

    let output = OutputBackends {
        sink: Arc::new(CpalSpeaker::new()),
        local: Arc::new(local),
        remote: Arc::new(HttpSpeechSynthesizer::new(
            config.tts_base_url(),
            config.voice.tts_api,
        )?),
    };

    let recognizer = if with_recognizer {
        build_recognizer(config)?
    } else {
        None
    };

    let mut providers = config.provider_config();
    if local_only {
        providers.active = ProviderKind::Local;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let controller = VoiceController::new(
        VoiceBackends { recognizer, output },
        providers,
        AudioUnlockState::new(),
        Arc::new(tx),
        VoiceTimings::default(),
    );

    controller.set_continuous_mode(config.voice.continuous);
    // Running the command is the user gesture
    controller.unlock();

    Ok((controller, rx))
}

fn build_recognizer(config: &Config) -> anyhow::Result<Option<Arc<dyn RecognitionEngine>>> {
    if !MicRecognizer::is_supported() {
        tracing::warn!("no microphone found");
        return Ok(None);
    }

    let Some(key) = config.stt_key() else {
        tracing::warn!(model = %config.voice.stt_model, "no API key for speech recognition");
        return Ok(None);
    };

    let base_url = match SttApi::for_model(&config.voice.stt_model) {
        SttApi::Whisper => config.speech_base_url.as_str(),
        SttApi::Deepgram => DEEPGRAM_BASE_URL,
    };
    let stt = SpeechToText::new(base_url, key, config.voice.stt_model.clone())?;

    Ok(Some(Arc::new(MicRecognizer::new(
        stt,
        tokio::runtime::Handle::current(),
    ))))
}

async fn listen_once(
    controller: &VoiceController,
    mut events: mpsc::UnboundedReceiver<VoiceEvent>,
) -> anyhow::Result<()> {
    if !controller.is_supported() {
        anyhow::bail!("speech recognition is not available");
    }

    controller.start_listening();

    while let Some(event) = events.recv().await {
        match event {
            VoiceEvent::ListeningStart => eprintln!("Listening..."),
            VoiceEvent::SpeechResult(text) => println!("{text}"),
            VoiceEvent::Error(e) if e.is_recoverable() => eprintln!("{e}"),
            VoiceEvent::Error(e) => return Err(e.into()),
            VoiceEvent::ListeningEnd if !controller.is_continuous() => break,
            _ => {}
        }
    }

    Ok(())
}

async fn converse(
    controller: &VoiceController,
    mut events: mpsc::UnboundedReceiver<VoiceEvent>,
) -> anyhow::Result<()> {
    if !controller.is_supported() {
        anyhow::bail!("speech recognition is not available");
    }

    controller.start_listening();
    eprintln!("Say something (Ctrl-C to quit)");

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            VoiceEvent::SpeechResult(text) => {
                println!("> {text}");
                let speaker = controller.clone();
                tokio::spawn(async move {
                    if let Err(e) = speaker.speak(&format!("You said: {text}")).await {
                        tracing::error!(error = %e, "could not read transcript back");
                    }
                });
            }
            VoiceEvent::Fallback(reason) => {
                tracing::info!(reason = %reason, "remote voice unavailable, using local voice");
            }
            VoiceEvent::Error(VoiceError::Recognition(kind)) if kind.is_fatal() => {
                return Err(VoiceError::Recognition(kind).into());
            }
            VoiceEvent::Error(e) if e.is_recoverable() => tracing::debug!(error = %e, "voice"),
            VoiceEvent::Error(e) => tracing::warn!(error = %e, "voice"),
            _ => {}
        }
    }

    controller.set_continuous_mode(false);
    controller.stop_listening();
    controller.stop_speaking();
    Ok(())
}

async fn list_voices() -> anyhow::Result<()> {
    let config = Config::load()?;
    let synth = EspeakSynthesizer::new();
    synth.load_voices().await;
    let voices = synth.voices();

    if voices.is_empty() {
        anyhow::bail!("no local voices found (is espeak-ng installed?)");
    }

    let chosen = select_voice(
        &voices,
        config.voice.local_voice.as_deref(),
        &config.voice.language,
    )
    .map(|v| v.name.clone());

    for voice in &voices {
        let marker = if chosen.as_deref() == Some(voice.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<32} {}", voice.name, voice.lang);
    }

    Ok(())
}

/// Print a level meter so the user can see the microphone works
#[allow(clippy::future_not_send)]
async fn mic_check(duration: u64) -> anyhow::Result<()> {
    println!("Checking microphone for {duration} seconds, speak now\n");

    let mut capture = AudioCapture::open()?;
    capture.start()?;

    for second in 1..=duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{second:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]");
    }

    capture.stop();

    println!("\nIf the meter never moved, check the default input device");
    Ok(())
}
