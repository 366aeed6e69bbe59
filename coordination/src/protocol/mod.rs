//! Marker-prefixed reply protocol
//!
//! Providers answer in a plain-text format of marker lines
//! (`SPIRIT_SCORE: 0.9`, `POLISHED_TEXT:`, `NOTE: tone`, ...) followed by
//! free text, with `---` lines separating note blocks. Replies are parsed
//! in two steps: [`tokenize`] classifies each line against a marker set,
//! then a small field-state machine folds the tokens into a value.
//!
//! Malformed input never fails a parse. An unreadable score becomes
//! [`SCORE_NOT_PROVIDED`]; an incomplete note block is dropped.

pub mod notes;
pub mod verification;

pub use notes::parse_notes;
pub use verification::parse_verification;

/// Sentinel for a score that is absent, non-numeric or outside [0, 1].
pub const SCORE_NOT_PROVIDED: f64 = -1.0;

/// Field markers recognised in replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    SpiritScore,
    LanguageScore,
    ContextScore,
    VocabularyScore,
    Issues,
    PolishedText,
    Explanation,
    Note,
    Importance,
    Title,
    Content,
    Examples,
    Implications,
}

impl Marker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Marker::SpiritScore => "SPIRIT_SCORE:",
            Marker::LanguageScore => "LANGUAGE_SCORE:",
            Marker::ContextScore => "CONTEXT_SCORE:",
            Marker::VocabularyScore => "VOCABULARY_SCORE:",
            Marker::Issues => "ISSUES:",
            Marker::PolishedText => "POLISHED_TEXT:",
            Marker::Explanation => "EXPLANATION:",
            Marker::Note => "NOTE:",
            Marker::Importance => "IMPORTANCE:",
            Marker::Title => "TITLE:",
            Marker::Content => "CONTENT:",
            Marker::Examples => "EXAMPLES:",
            Marker::Implications => "IMPLICATIONS:",
        }
    }
}

/// Markers of a verification reply.
pub const VERIFICATION_MARKERS: &[Marker] = &[
    Marker::SpiritScore,
    Marker::LanguageScore,
    Marker::ContextScore,
    Marker::VocabularyScore,
    Marker::Issues,
    Marker::PolishedText,
    Marker::Explanation,
];

/// Markers of a note reply.
pub const NOTE_MARKERS: &[Marker] = &[
    Marker::Note,
    Marker::Importance,
    Marker::Title,
    Marker::Content,
    Marker::Examples,
    Marker::Implications,
];

/// One classified reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// A marker and the trimmed remainder of its line.
    Marker(Marker, &'a str),
    /// A line made only of three or more dashes, untrimmed.
    Separator(&'a str),
    /// Anything else, untrimmed.
    Text(&'a str),
}

/// Classify every line of `reply` against `markers`.
///
/// Markers must start the line (after leading whitespace) and are case
/// sensitive.
pub fn tokenize<'a>(reply: &'a str, markers: &[Marker]) -> Vec<Token<'a>> {
    reply
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-') {
                return Token::Separator(line);
            }
            for marker in markers {
                if let Some(rest) = trimmed.strip_prefix(marker.as_str()) {
                    return Token::Marker(*marker, rest.trim());
                }
            }
            Token::Text(line)
        })
        .collect()
}

/// Parse a score value: the leading number of `raw`, if it lies in [0, 1].
pub fn parse_score(raw: &str) -> Option<f64> {
    let raw = raw.trim().trim_start_matches('[');
    let end = raw
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    let value: f64 = raw[..end].parse().ok()?;
    (0.0..=1.0).contains(&value).then_some(value)
}

/// First valid score on a line starting with `marker`, else [`SCORE_NOT_PROVIDED`].
///
/// A line with an unreadable value does not stop the search.
pub fn extract_score(text: &str, marker: &str) -> f64 {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix(marker))
        .find_map(parse_score)
        .unwrap_or(SCORE_NOT_PROVIDED)
}

/// Text between the first `start` and the following `end`, trimmed.
///
/// Without an `end` after `start`, everything after `start`; without
/// `start`, the empty string.
pub fn extract_section(text: &str, start: &str, end: &str) -> String {
    let Some(begin) = text.find(start) else {
        return String::new();
    };
    let rest = &text[begin + start.len()..];
    match rest.find(end) {
        Some(stop) => rest[..stop].trim().to_string(),
        None => rest.trim().to_string(),
    }
}

/// Strip surrounding placeholder brackets (`[tone]` → `tone`).
pub(crate) fn strip_brackets(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '[' || c == ']').trim()
}
