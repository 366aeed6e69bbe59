//! Verification prompt.

use super::Dimension;

fn dimension_line(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Spirit => "**Spirit**: Does the translation preserve the spirit, tone, and emotional resonance of the original?",
        Dimension::Language => "**Language**: Is the target language natural, idiomatic, and grammatically correct?",
        Dimension::Context => "**Context**: Are all contexts, deep meanings, and nuances properly conveyed?",
        Dimension::Vocabulary => "**Vocabulary**: Is the word choice rich, appropriate, and varied?",
    }
}

/// Prompt asking for scores, issues and a polished text.
///
/// Only `dimensions` are described to the provider; the response format
/// always asks for all four scores. `notes_context` is a digest from
/// [`crate::notes::format_notes_for_context`] and may be empty.
pub fn build_verification_prompt(
    original: &str,
    current: &str,
    dimensions: &[Dimension],
    notes_context: &str,
) -> String {
    let dimensions_list = dimensions
        .iter()
        .map(|d| dimension_line(*d))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "You are a professional translation quality assessor and polisher. \
         Your task is to verify and improve a literary translation.\n\n\
         **Original Text:**\n{original}\n\n\
         **Current Translation:**\n{current}\n\n\
         **Verification Dimensions:**\n{dimensions_list}\n\n"
    );

    if !notes_context.trim().is_empty() {
        prompt.push_str(notes_context.trim_end());
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "**Your Task:**
1. Evaluate the translation on each dimension listed above
2. Score each dimension from 0.0 to 1.0 (where 1.0 is perfect)
3. Identify any issues or improvements needed
4. Provide a polished version if improvements are needed

**Response Format:**
SPIRIT_SCORE: [0.0-1.0]
LANGUAGE_SCORE: [0.0-1.0]
CONTEXT_SCORE: [0.0-1.0]
VOCABULARY_SCORE: [0.0-1.0]
ISSUES:
[List any issues found, one per line with format \"TYPE: description\"]
POLISHED_TEXT:
[Your improved version, or UNCHANGED if translation is perfect]
EXPLANATION:
[Brief explanation of changes made and why]",
    );
    prompt
}
