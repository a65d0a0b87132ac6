//! Local voice selection policy

use super::engine::LocalVoice;

/// Device-native voices that sound noticeably better than the platform
/// default, in order of preference
pub const PREFERRED_VOICE_NAMES: &[&str] = &[
    "Samantha",
    "Google US English",
    "Microsoft Aria Online (Natural)",
    "Microsoft Jenny Online (Natural)",
    "Karen",
    "Daniel",
    "Alex",
];

/// Pick the best local voice
///
/// Precedence: exact `preferred` name, then the curated list, then the first
/// voice whose language tag starts with `language`, then the first voice.
/// Returns `None` only when `voices` is empty.
#[must_use]
pub fn select_voice<'a>(
    voices: &'a [LocalVoice],
    preferred: Option<&str>,
    language: &str,
) -> Option<&'a LocalVoice> {
    if let Some(name) = preferred.filter(|n| !n.is_empty()) {
        if let Some(voice) = voices.iter().find(|v| v.name == name) {
            return Some(voice);
        }
        tracing::debug!(preferred = name, "preferred voice not installed");
    }

    PREFERRED_VOICE_NAMES
        .iter()
        .find_map(|curated| voices.iter().find(|v| v.name.contains(curated)))
        .or_else(|| voices.iter().find(|v| language_matches(&v.lang, language)))
        .or_else(|| voices.first())
}

/// Prefix match on BCP 47 tags, ignoring case and `_` vs `-`
fn language_matches(tag: &str, language: &str) -> bool {
    if language.is_empty() {
        return false;
    }

    let tag = tag.to_lowercase().replace('_', "-");
    let language = language.to_lowercase().replace('_', "-");
    tag.starts_with(&language)
}
