//! Speech-safe text cleanup
//!
//! Replies from the assistant are written for a screen. Before they reach a
//! synthesizer, pictographs, links and markup characters are removed so the
//! voice doesn't read them out.

use regex::Regex;
use std::sync::LazyLock;

/// Pictographic and emoji code points, including the joiners and selectors
/// that glue multi-codepoint emoji together
static PICTOGRAPH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"[",
        r"\x{1F000}-\x{1FAFF}",
        r"\x{2300}-\x{23FF}",
        r"\x{2600}-\x{27BF}",
        r"\x{2B00}-\x{2BFF}",
        r"\x{FE00}-\x{FE0F}",
        r"\x{200D}\x{20E3}",
        r"\x{E0020}-\x{E007F}",
        r"]",
    ))
    .expect("valid regex")
});

/// Markup punctuation that is read aloud literally by most engines
static MARKUP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*_~`#|<>\[\]{}!^\\]").expect("valid regex"));

/// Links; everything up to the next whitespace goes
static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S*").expect("valid regex"));

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Convert reply text into speech-safe text
///
/// Symbols are removed before links so a link split by a stray symbol is
/// still caught in the same pass, which keeps the function idempotent.
#[must_use]
pub fn sanitize_for_speech(text: &str) -> String {
    let text = PICTOGRAPH_REGEX.replace_all(text, "");
    let text = MARKUP_REGEX.replace_all(&text, "");
    let text = URL_REGEX.replace_all(&text, " ");
    WHITESPACE_REGEX.replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_emoji_links_and_bangs() {
        assert_eq!(
            sanitize_for_speech("🎉 visit https://x.com now!!"),
            "visit now"
        );
    }

    #[test]
    fn test_strips_markdown_markup() {
        assert_eq!(
            sanitize_for_speech("**Bold** and _italic_ with `code` # heading"),
            "Bold and italic with code heading"
        );
    }

    #[test]
    fn test_keeps_sentence_punctuation() {
        assert_eq!(
            sanitize_for_speech("Hello, world. How are you?"),
            "Hello, world. How are you?"
        );
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(sanitize_for_speech("  one\n\ntwo\t three  "), "one two three");
    }

    #[test]
    fn test_compound_emoji() {
        // Family emoji joined with ZWJ, plus a flag made of regional indicators
        assert_eq!(sanitize_for_speech("hi 👨\u{200D}👩\u{200D}👧 🇺🇸 there"), "hi there");
        assert_eq!(sanitize_for_speech("ok ❤\u{FE0F}"), "ok");
    }

    #[test]
    fn test_case_insensitive_links() {
        assert_eq!(sanitize_for_speech("see HTTP://Example.com/a?b=c"), "see");
    }

    #[test]
    fn test_only_symbols_becomes_empty() {
        assert_eq!(sanitize_for_speech("🎉🎉 !!"), "");
        assert_eq!(sanitize_for_speech(""), "");
    }

    #[test]
    fn test_link_split_by_markup() {
        assert_eq!(sanitize_for_speech("go http*s://x.com"), "go");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "🎉 visit https://x.com now!!",
            "**Bold** [link](https://a.b/c) ~strike~",
            "plain text",
            "httphttps://a.b tail",
            "  spaced   out  ",
            "emoji🙂inside",
            "a\\b^c",
        ];

        for input in inputs {
            let once = sanitize_for_speech(input);
            let twice = sanitize_for_speech(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }
}
