//! Verification reply parser.

use super::{parse_score, tokenize, Marker, Token, VERIFICATION_MARKERS};
use crate::polish::{Dimension, DimensionScores, Issue, Severity, VerificationOutcome};

/// Literal a provider sends when the current text needs no change.
pub const UNCHANGED: &str = "UNCHANGED";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Issues,
    Polished,
    Explanation,
}

fn score_dimension(marker: Marker) -> Option<Dimension> {
    match marker {
        Marker::SpiritScore => Some(Dimension::Spirit),
        Marker::LanguageScore => Some(Dimension::Language),
        Marker::ContextScore => Some(Dimension::Context),
        Marker::VocabularyScore => Some(Dimension::Vocabulary),
        _ => None,
    }
}

/// Parse one `type: description` issue line.
fn parse_issue(line: &str) -> Option<Issue> {
    let line = line.trim().trim_start_matches(['-', '*', '•']).trim();
    let (kind, description) = line.split_once(':')?;
    let kind = kind.trim();
    if kind.is_empty() {
        return None;
    }
    Some(Issue {
        issue_type: kind.to_lowercase(),
        severity: Severity::Minor,
        description: description.trim().to_string(),
        location: String::new(),
        suggestion: String::new(),
    })
}

/// Drop blank lines around a block and trailing whitespace; keep the rest
/// byte for byte, including the first line's indentation.
fn trim_block(block: &str) -> &str {
    let start = block
        .char_indices()
        .take_while(|(_, c)| c.is_whitespace())
        .filter(|(_, c)| *c == '\n')
        .last()
        .map_or(0, |(i, _)| i + 1);
    block[start..].trim_end()
}

fn push_line(buf: &mut String, line: &str) {
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
}

/// Parse a verification reply from `provider`.
///
/// Scores that are missing or invalid take `default_score`. A missing,
/// empty or `UNCHANGED` polished block leaves `current_text` as the
/// proposal.
pub fn parse_verification(
    provider: &str,
    reply: &str,
    current_text: &str,
    default_score: f64,
) -> VerificationOutcome {
    let mut scores = DimensionScores::uniform(default_score);
    let mut scored = [false; 4];
    let mut issues_block = String::new();
    let mut polished = String::new();
    let mut explanation = String::new();
    let mut field = Field::None;

    for token in tokenize(reply, VERIFICATION_MARKERS) {
        match token {
            Token::Marker(marker, rest) => {
                if let Some(dimension) = score_dimension(marker) {
                    let slot = Dimension::ALL
                        .iter()
                        .position(|d| *d == dimension)
                        .unwrap_or_default();
                    if !scored[slot] {
                        if let Some(score) = parse_score(rest) {
                            scores.set(dimension, score);
                            scored[slot] = true;
                        }
                    }
                    field = Field::None;
                    continue;
                }
                field = match marker {
                    Marker::Issues => Field::Issues,
                    Marker::PolishedText => Field::Polished,
                    Marker::Explanation => Field::Explanation,
                    _ => Field::None,
                };
                if !rest.is_empty() {
                    match field {
                        Field::Issues => push_line(&mut issues_block, rest),
                        Field::Polished => push_line(&mut polished, rest),
                        Field::Explanation => push_line(&mut explanation, rest),
                        Field::None => {}
                    }
                }
            }
            Token::Separator(line) | Token::Text(line) => match field {
                Field::Issues => push_line(&mut issues_block, line),
                Field::Polished => push_line(&mut polished, line),
                Field::Explanation => push_line(&mut explanation, line),
                Field::None => {}
            },
        }
    }

    let polished = trim_block(&polished);
    let polished_text = if polished.is_empty() || polished.trim() == UNCHANGED {
        current_text.to_string()
    } else {
        polished.to_string()
    };

    VerificationOutcome {
        provider: provider.to_string(),
        scores,
        polished_text,
        issues: issues_block.lines().filter_map(parse_issue).collect(),
        explanation: explanation.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_REPLY: &str = "SPIRIT_SCORE: 0.8
LANGUAGE_SCORE: 0.7
CONTEXT_SCORE: 0.95
VOCABULARY_SCORE: 0.6
ISSUES:
Language: awkward word order
vocabulary: repetitive verb

POLISHED_TEXT:
Поздрав, свете.
EXPLANATION:
Smoother greeting.";

    #[test]
    fn test_full_reply() {
        let v = parse_verification("openai", FULL_REPLY, "Здраво, свете.", 0.9);
        assert_eq!(v.provider, "openai");
        assert_eq!(v.scores.spirit, 0.8);
        assert_eq!(v.scores.language, 0.7);
        assert_eq!(v.scores.context, 0.95);
        assert_eq!(v.scores.vocabulary, 0.6);
        assert_eq!(v.polished_text, "Поздрав, свете.");
        assert_eq!(v.explanation, "Smoother greeting.");
        assert_eq!(v.issues.len(), 2);
        assert_eq!(v.issues[0].issue_type, "language");
        assert_eq!(v.issues[0].description, "awkward word order");
        assert_eq!(v.issues[0].severity, Severity::Minor);
    }

    #[test]
    fn test_unchanged_keeps_current_text() {
        let reply = "SPIRIT_SCORE: 1.0\nPOLISHED_TEXT:\nUNCHANGED\nEXPLANATION:\nfine";
        let v = parse_verification("a", reply, "current", 0.9);
        assert_eq!(v.polished_text, "current");
    }

    #[test]
    fn test_defaults_for_missing_and_invalid_scores() {
        let reply = "SPIRIT_SCORE: 7\nLANGUAGE_SCORE: good\nPOLISHED_TEXT: inline text";
        let v = parse_verification("a", reply, "current", 0.9);
        assert_eq!(v.scores, DimensionScores::uniform(0.9));
        assert_eq!(v.polished_text, "inline text");
        assert!(v.issues.is_empty());
    }

    #[test]
    fn test_garbage_reply() {
        let v = parse_verification("a", "I cannot help with that.", "current", 0.9);
        assert_eq!(v.polished_text, "current");
        assert!((v.scores.overall() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_multiline_polished_text_preserved() {
        let reply = "POLISHED_TEXT:\nFirst line.\n\nSecond line.\nEXPLANATION: split";
        let v = parse_verification("a", reply, "old", 0.9);
        assert_eq!(v.polished_text, "First line.\n\nSecond line.");
        assert_eq!(v.explanation, "split");
    }

    #[test]
    fn test_scene_break_dashes_kept_verbatim() {
        let reply = "SPIRIT_SCORE: 0.9\nPOLISHED_TEXT:\nFirst scene.\n* * *\n----------\n  -----  \nSecond scene.\nEXPLANATION:\nok\n---\ndone\n";
        let v = parse_verification("p", reply, "cur", 0.9);
        assert_eq!(
            v.polished_text,
            "First scene.\n* * *\n----------\n  -----  \nSecond scene."
        );
        assert_eq!(v.explanation, "ok\n---\ndone");
    }

    #[test]
    fn test_unchanged_block_with_dash_line_matches_current() {
        let current = "Он ушёл.\n----------\nУтро.";
        let reply = format!("SPIRIT_SCORE: 1.0\nPOLISHED_TEXT:\n{current}\nEXPLANATION:\nno change");
        let v = parse_verification("p", &reply, current, 0.9);
        assert_eq!(v.polished_text, current);
    }

    #[test]
    fn test_polished_block_keeps_indentation_and_foreign_markers() {
        let block = "    «Стой!» - крикнул он.\n\tNOTE: not a marker here\n  TITLE: kept too\nКонец.";
        let reply = format!("POLISHED_TEXT:\n\n{block}\n\nEXPLANATION:\nindented dialogue");
        let v = parse_verification("p", &reply, "old", 0.9);
        assert_eq!(v.polished_text, block);
        assert_eq!(v.explanation, "indented dialogue");
    }

    #[test]
    fn test_issue_lines_without_colon_are_skipped() {
        let reply = "ISSUES:\nNone\n- style: too formal\nPOLISHED_TEXT:\nUNCHANGED";
        let v = parse_verification("a", reply, "x", 0.9);
        assert_eq!(v.issues.len(), 1);
        assert_eq!(v.issues[0].issue_type, "style");
    }
}
