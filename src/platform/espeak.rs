//! On-device synthesis through `espeak-ng`

use std::process::Stdio;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::voice::{LocalSynthesizer, LocalVoice, SynthesisErrorKind, Utterance, UtteranceEvent};
use crate::{Error, Result};

/// Default binary name
pub const ESPEAK_PROGRAM: &str = "espeak-ng";

/// espeak words-per-minute at rate 1.0
const BASE_WPM: f32 = 175.0;

/// espeak pitch at pitch 1.0 (range 0-99)
const BASE_PITCH: f32 = 50.0;

/// espeak amplitude at volume 1.0 (range 0-200)
const BASE_AMPLITUDE: f32 = 100.0;

/// Local synthesizer backed by the `espeak-ng` command
pub struct EspeakSynthesizer {
    program: String,
    voices: OnceLock<Vec<LocalVoice>>,
    current: Mutex<Option<CancellationToken>>,
}

impl Default for EspeakSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl EspeakSynthesizer {
    /// Use `espeak-ng` from `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self::with_program(ESPEAK_PROGRAM)
    }

    /// Use a specific binary
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            voices: OnceLock::new(),
            current: Mutex::new(None),
        }
    }

    /// Whether the binary runs at all
    #[must_use]
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    /// List voices on the blocking pool and cache them
    ///
    /// Call before handing the synthesizer to a controller; `voices()` only
    /// runs the command itself when nothing is cached yet. Returns the count.
    pub async fn load_voices(&self) -> usize {
        if let Some(voices) = self.voices.get() {
            return voices.len();
        }

        let program = self.program.clone();
        let voices = tokio::task::spawn_blocking(move || list_voices(&program))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "voice listing task failed");
                Vec::new()
            });
        self.voices.get_or_init(|| voices).len()
    }
}

impl LocalSynthesizer for EspeakSynthesizer {
    fn voices(&self) -> Vec<LocalVoice> {
        self.voices
            .get_or_init(|| list_voices(&self.program))
            .clone()
    }

    fn speak(&self, utterance: Utterance) -> Result<mpsc::UnboundedReceiver<UtteranceEvent>> {
        let mut child = Command::new(&self.program)
            .args(build_args(&utterance))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Tts(format!("failed to start {}: {e}", self.program)))?;

        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            previous.cancel();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let text = utterance.text;

        tokio::spawn(async move {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    tracing::debug!(error = %e, "failed to write utterance text");
                }
            }
            let _ = tx.send(UtteranceEvent::Started);

            let event = tokio::select! {
                () = token.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::debug!(error = %e, "failed to kill synthesizer");
                    }
                    UtteranceEvent::Failed(SynthesisErrorKind::Interrupted)
                }
                status = child.wait() => match status {
                    Ok(status) if status.success() => UtteranceEvent::Ended,
                    Ok(status) => UtteranceEvent::Failed(SynthesisErrorKind::Failed(
                        format!("synthesizer exited with {status}"),
                    )),
                    Err(e) => UtteranceEvent::Failed(SynthesisErrorKind::Failed(e.to_string())),
                },
            };

            let _ = tx.send(event);
        });

        Ok(rx)
    }

    fn cancel(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }

    // A child process can't pause itself
    fn is_paused(&self) -> bool {
        false
    }

    fn resume(&self) {}
}

fn list_voices(program: &str) -> Vec<LocalVoice> {
    match std::process::Command::new(program).arg("--voices").output() {
        Ok(output) if output.status.success() => {
            let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
            tracing::debug!(count = voices.len(), "local voices listed");
            voices
        }
        Ok(output) => {
            tracing::warn!(status = %output.status, "voice listing failed");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(program, error = %e, "local synthesizer not found");
            Vec::new()
        }
    }
}

/// Command-line arguments for one utterance; the text goes over stdin
fn build_args(utterance: &Utterance) -> Vec<String> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scale = |value: f32, base: f32, min: f32, max: f32| -> u32 {
        (value * base).clamp(min, max).round() as u32
    };

    let mut args = vec![
        "--stdin".to_string(),
        "-s".to_string(),
        scale(utterance.rate, BASE_WPM, 80.0, 450.0).to_string(),
        "-p".to_string(),
        scale(utterance.pitch, BASE_PITCH, 0.0, 99.0).to_string(),
        "-a".to_string(),
        scale(utterance.volume, BASE_AMPLITUDE, 0.0, 200.0).to_string(),
    ];

    if let Some(voice) = &utterance.voice {
        args.push("-v".to_string());
        args.push(voice.lang.clone());
    }

    args
}

/// Parse `espeak-ng --voices` output
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File        Other Languages
///  5  en-us           --/M      English_(America)  gmw/en-US
/// ```
fn parse_voice_list(output: &str) -> Vec<LocalVoice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let (lang, name) = (fields.get(1)?, fields.get(3)?);
            Some(LocalVoice {
                name: name.replace('_', " "),
                lang: (*lang).to_string(),
                is_default: *lang == "en",
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOICES: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en              --/M      English_(Great_Britain) gmw/en      (en 2)
 5  en-us           --/M      English_(America)  gmw/en-US            (en 3)
";

    #[test]
    fn test_parse_voice_list() {
        let voices = parse_voice_list(VOICES);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[1].name, "English (Great Britain)");
        assert_eq!(voices[1].lang, "en");
        assert!(voices[1].is_default);
        assert_eq!(voices[2].lang, "en-us");
        assert!(!voices[2].is_default);
    }

    #[test]
    fn test_parse_ignores_short_lines() {
        assert!(parse_voice_list("header\n\n 5 af\n").is_empty());
    }

    #[test]
    fn test_args_scale_settings() {
        let utterance = Utterance {
            text: "hello".to_string(),
            rate: 1.2,
            pitch: 1.0,
            volume: 0.5,
            voice: Some(LocalVoice {
                name: "English (America)".to_string(),
                lang: "en-us".to_string(),
                is_default: false,
            }),
        };

        let args = build_args(&utterance);
        assert_eq!(
            args,
            vec!["--stdin", "-s", "210", "-p", "50", "-a", "50", "-v", "en-us"]
        );
    }

    #[test]
    fn test_args_silent_priming() {
        let utterance = Utterance {
            text: " ".to_string(),
            rate: 1.0,
            pitch: 1.0,
            volume: 0.0,
            voice: None,
        };

        let args = build_args(&utterance);
        assert_eq!(args[6], "0");
        assert!(!args.contains(&"-v".to_string()));
    }

    #[test]
    fn test_missing_program_has_no_voices() {
        let synth = EspeakSynthesizer::with_program("definitely-not-a-real-espeak-binary");
        assert!(synth.voices().is_empty());
        assert!(!synth.is_available());
    }

    #[tokio::test]
    async fn test_load_voices_caches_off_executor() {
        let synth = EspeakSynthesizer::with_program("definitely-not-a-real-espeak-binary");
        assert!(synth.voices.get().is_none());

        assert_eq!(synth.load_voices().await, 0);
        assert!(synth.voices.get().is_some());
        assert_eq!(synth.load_voices().await, 0);
        assert!(synth.voices().is_empty());
    }
}
