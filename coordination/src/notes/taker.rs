//! Note generation against one provider.

use tracing::debug;

use super::{LiteraryNote, NoteContext};
use crate::document::TextUnit;
use crate::protocol::parse_notes;
use crate::router::{RouterResult, SharedRouter};

/// Asks one provider for notes about a unit.
pub struct NoteTaker {
    router: SharedRouter,
    provider: String,
}

impl NoteTaker {
    pub fn new(router: SharedRouter, provider: impl Into<String>) -> Self {
        Self {
            router,
            provider: provider.into(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Notes for `unit` in pass `pass_number`.
    ///
    /// `previous` should already be restricted to the unit's section.
    pub async fn generate_notes(
        &self,
        pass_number: u32,
        unit: &TextUnit,
        previous: &[LiteraryNote],
    ) -> RouterResult<Vec<LiteraryNote>> {
        let prompt = build_note_prompt(&unit.original, &unit.current, previous);
        let reply = self.router.dispatch(&prompt, &unit.location).await?;

        let ctx = NoteContext {
            pass_number,
            section_id: unit.section_id.clone(),
            location: unit.location.clone(),
            provider: self.provider.clone(),
        };
        let notes = parse_notes(&reply, &ctx);
        debug!(
            provider = %self.provider,
            section_id = %unit.section_id,
            notes = notes.len(),
            "Notes generated"
        );
        Ok(notes)
    }
}

/// Prompt asking for notes in the marker format.
pub fn build_note_prompt(original: &str, current: &str, previous: &[LiteraryNote]) -> String {
    let mut prompt = String::from(
        "You are a literary analyst reviewing a translation. Generate detailed notes about \
         important aspects that must be preserved or improved.\n\n**Original Text:**\n",
    );
    prompt.push_str(original);
    prompt.push_str("\n\n**Current Translation:**\n");
    prompt.push_str(current);
    prompt.push_str("\n\n");

    if !previous.is_empty() {
        prompt.push_str("**Previous Analysis (from earlier pass):**\n");
        for note in previous {
            prompt.push_str(&format!(
                "- [{}] {}: {}\n",
                note.note_type, note.title, note.content
            ));
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "**Generate notes for the following dimensions:**
1. **CHARACTER**: Character traits, development, voice, relationships
2. **TONE**: Atmosphere, mood, emotional tone, narrative voice
3. **THEME**: Themes, motifs, symbols, deeper meanings
4. **CULTURE**: Cultural references, idioms, historical context
5. **STYLE**: Literary techniques, sentence structure, rhythm
6. **CONTEXT**: Historical and social background
7. **VOCABULARY**: Key terms, specialized vocabulary, word choice significance
8. **STRUCTURE**: Narrative structure, pacing

**Response Format:**
NOTE: [TYPE]
IMPORTANCE: [critical/high/medium/low]
TITLE: [Brief title]
CONTENT: [Detailed observation]
EXAMPLES: [Specific examples from text, one per line]
IMPLICATIONS: [Why this matters for translation]
---

Provide 3-10 notes covering different aspects. Focus on elements that are critical for translation quality.
",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{Importance, NoteType};
    use chrono::Utc;

    #[test]
    fn test_prompt_includes_previous_notes() {
        let previous = vec![LiteraryNote {
            id: "n1".into(),
            pass_number: 1,
            section_id: "s".into(),
            location: "S".into(),
            provider: "openai".into(),
            note_type: NoteType::Culture,
            importance: Importance::High,
            title: "Name day".into(),
            content: "Orthodox custom".into(),
            examples: vec![],
            implications: String::new(),
            created_at: Utc::now(),
        }];
        let prompt = build_note_prompt("оригинал", "превод", &previous);
        assert!(prompt.contains("**Original Text:**\nоригинал"));
        assert!(prompt.contains("**Current Translation:**\nпревод"));
        assert!(prompt.contains("- [culture] Name day: Orthodox custom"));
        assert!(prompt.contains("NOTE: [TYPE]"));
    }

    #[test]
    fn test_prompt_without_previous_notes() {
        let prompt = build_note_prompt("a", "b", &[]);
        assert!(!prompt.contains("Previous Analysis"));
    }
}
