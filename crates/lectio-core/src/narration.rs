//! Text preparation for narration.
//!
//! Chunk text arrives with footnote markers and irregular whitespace, and
//! references like `John 3:16-18` read badly when spoken verbatim.

use crate::passage::{Chunk, Passage, SectionKind};
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?P<book>.+?)\s+(?P<chapter>\d+)(?::(?P<start>\d+)(?:\s*[-–]\s*(?P<end>\d+))?)?\s*$",
    )
    .unwrap()
});
static FOOTNOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]{1,8}\]").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// `John 3:16-18` becomes `John chapter 3, verses 16 through 18`. Anything
/// that does not look like a reference is returned trimmed.
pub fn speakable_reference(reference: &str) -> String {
    let Some(caps) = REFERENCE_RE.captures(reference) else {
        return reference.trim().to_string();
    };
    let book = caps["book"].trim();
    let chapter = &caps["chapter"];
    let label = if book.eq_ignore_ascii_case("psalm") || book.eq_ignore_ascii_case("psalms") {
        format!("Psalm {chapter}")
    } else {
        format!("{book} chapter {chapter}")
    };
    match (caps.name("start"), caps.name("end")) {
        (Some(start), Some(end)) => {
            format!("{label}, verses {} through {}", start.as_str(), end.as_str())
        }
        (Some(start), None) => format!("{label}, verse {}", start.as_str()),
        _ => label,
    }
}

/// NFC-normalize, drop bracketed footnote markers, and collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let normalized: String = text.nfc().collect();
    let stripped = FOOTNOTE_RE.replace_all(&normalized, "");
    WHITESPACE_RE.replace_all(stripped.trim(), " ").into_owned()
}

/// Spoken introduction for a listening session.
pub fn header_for(section: SectionKind, passage: &Passage) -> String {
    format!(
        "{}. {}. {}.",
        section.spoken_label(),
        speakable_reference(&passage.reference),
        passage.translation.trim()
    )
}

pub fn script_for_chunk(
    section: SectionKind,
    passage: &Passage,
    chunk: &Chunk,
    with_header: bool,
) -> String {
    let body = clean_text(&chunk.text);
    if with_header {
        format!("{} {body}", header_for(section, passage))
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn references_are_spelled_out() {
        assert_eq!(
            speakable_reference("John 3:16-18"),
            "John chapter 3, verses 16 through 18"
        );
        assert_eq!(speakable_reference("1 Kings 2:5"), "1 Kings chapter 2, verse 5");
        assert_eq!(speakable_reference("Romans 8"), "Romans chapter 8");
        assert_eq!(speakable_reference("Psalm 23"), "Psalm 23");
        assert_eq!(speakable_reference("  Selah "), "Selah");
    }

    #[test]
    fn cleaning_strips_markers_and_whitespace() {
        assert_eq!(
            clean_text("  In the beginning[a] was\n the   Word.[12] "),
            "In the beginning was the Word."
        );
    }

    #[test]
    fn cleaning_composes_unicode() {
        assert_eq!(clean_text("Nazare\u{0301}th"), "Nazaréth");
    }

    #[test]
    fn header_only_on_request() {
        let passage = Passage {
            reference: "Psalm 1".into(),
            translation: "KJV".into(),
            chunks: vec![Chunk {
                index: 0,
                verses: vec!["Psalm 1:1".into()],
                text: "Blessed is the man".into(),
            }],
        };
        let chunk = &passage.chunks[0];

        assert_eq!(
            script_for_chunk(SectionKind::Psalm, &passage, chunk, true),
            "Today's psalm. Psalm 1. KJV. Blessed is the man"
        );
        assert_eq!(
            script_for_chunk(SectionKind::Psalm, &passage, chunk, false),
            "Blessed is the man"
        );
    }
}
