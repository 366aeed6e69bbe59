//! Literary notes
//!
//! Providers are asked for structured observations about each unit
//! (character, tone, culture, ...). Notes from earlier passes can be fed
//! back into later prompts so that what one pass noticed is not lost on the
//! next.

pub mod collection;
pub mod taker;
pub mod types;

pub use collection::NoteCollection;
pub use taker::NoteTaker;
pub use types::{Importance, LiteraryNote, NoteContext, NoteType};

use std::collections::HashMap;

/// Notes at or above `min`.
pub fn filter_notes_by_importance(notes: &[LiteraryNote], min: Importance) -> Vec<LiteraryNote> {
    notes
        .iter()
        .filter(|n| n.importance >= min)
        .cloned()
        .collect()
}

/// Notes belonging to `section_id`.
pub fn filter_notes_by_section<'a, I>(notes: I, section_id: &str) -> Vec<LiteraryNote>
where
    I: IntoIterator<Item = &'a LiteraryNote>,
{
    notes
        .into_iter()
        .filter(|n| n.section_id == section_id)
        .cloned()
        .collect()
}

/// Collapse notes sharing section, type and case-insensitive title.
///
/// The survivor is the first note seen; it takes the highest importance,
/// the union of examples and any implications it does not already contain.
/// Merging an already merged list returns it unchanged.
pub fn merge_notes(notes: &[LiteraryNote]) -> Vec<LiteraryNote> {
    let mut merged: Vec<LiteraryNote> = Vec::new();
    let mut seen: HashMap<(String, NoteType, String), usize> = HashMap::new();

    for note in notes {
        let key = note.merge_key();
        let Some(&idx) = seen.get(&key) else {
            seen.insert(key, merged.len());
            merged.push(note.clone());
            continue;
        };

        let existing = &mut merged[idx];
        existing.importance = existing.importance.max(note.importance);
        for example in &note.examples {
            if !existing.examples.contains(example) {
                existing.examples.push(example.clone());
            }
        }
        if !note.implications.is_empty() && !existing.implications.contains(&note.implications) {
            if !existing.implications.is_empty() {
                existing.implications.push(' ');
            }
            existing.implications.push_str(&note.implications);
        }
    }
    merged
}

/// Prompt digest of `notes`, grouped by type in a fixed order.
///
/// Critical notes are marked ⚠️ and high ones ⭐. Empty input gives an
/// empty string.
pub fn format_notes_for_context<'a, I>(notes: I) -> String
where
    I: IntoIterator<Item = &'a LiteraryNote>,
{
    let mut grouped: HashMap<NoteType, Vec<&LiteraryNote>> = HashMap::new();
    for note in notes {
        grouped.entry(note.note_type).or_default().push(note);
    }
    if grouped.is_empty() {
        return String::new();
    }

    let mut out = String::from("**Previous Literary Analysis:**\n\n");
    for note_type in NoteType::ALL {
        let Some(group) = grouped.get(&note_type) else {
            continue;
        };
        out.push_str(&format!("### {}\n", note_type.heading()));
        for note in group {
            let badge = match note.importance {
                Importance::Critical => " ⚠️",
                Importance::High => " ⭐",
                _ => "",
            };
            out.push_str(&format!("- **{}**{}: {}\n", note.title, badge, note.content));
            if !note.examples.is_empty() {
                out.push_str(&format!("  Examples: {}\n", note.examples.join("; ")));
            }
            if !note.implications.is_empty() {
                out.push_str(&format!("  → {}\n", note.implications));
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn note(section: &str, t: NoteType, title: &str, imp: Importance) -> LiteraryNote {
        LiteraryNote {
            id: uuid::Uuid::new_v4().to_string(),
            pass_number: 1,
            section_id: section.to_string(),
            location: String::new(),
            provider: "openai".to_string(),
            note_type: t,
            importance: imp,
            title: title.to_string(),
            content: format!("about {title}"),
            examples: vec![],
            implications: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_filter_by_importance() {
        let notes = vec![
            note("s", NoteType::Tone, "a", Importance::Low),
            note("s", NoteType::Tone, "b", Importance::Medium),
            note("s", NoteType::Tone, "c", Importance::High),
            note("s", NoteType::Tone, "d", Importance::Critical),
        ];
        let medium = filter_notes_by_importance(&notes, Importance::Medium);
        let high = filter_notes_by_importance(&notes, Importance::High);
        assert_eq!(medium.len(), 3);
        assert_eq!(high.len(), 2);
        assert!(high.iter().all(|h| medium.iter().any(|m| m.id == h.id)));
    }

    #[test]
    fn test_merge_combines_duplicates() {
        let mut first = note("s", NoteType::Tone, "Dread", Importance::Medium);
        first.examples = vec!["x".into()];
        first.implications = "keep it dark".into();
        let mut second = note("s", NoteType::Tone, "DREAD", Importance::Critical);
        second.examples = vec!["x".into(), "y".into()];
        second.implications = "short sentences".into();
        let other_section = note("t", NoteType::Tone, "Dread", Importance::Low);

        let merged = merge_notes(&[first.clone(), second, other_section]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, first.id);
        assert_eq!(merged[0].importance, Importance::Critical);
        assert_eq!(merged[0].examples, vec!["x", "y"]);
        assert_eq!(merged[0].implications, "keep it dark short sentences");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let notes = vec![
            note("s", NoteType::Style, "Rhythm", Importance::High),
            note("s", NoteType::Style, "rhythm", Importance::Low),
            note("s", NoteType::Culture, "Idiom", Importance::Medium),
        ];
        let once = merge_notes(&notes);
        let twice = merge_notes(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_format_groups_in_type_order() {
        let notes = vec![
            note("s", NoteType::Vocabulary, "Terms", Importance::Low),
            note("s", NoteType::Character, "Hero", Importance::Critical),
            note("s", NoteType::Vocabulary, "Slang", Importance::High),
        ];
        let text = format_notes_for_context(&notes);
        let character = text.find("### Character").unwrap();
        let vocabulary = text.find("### Vocabulary").unwrap();
        assert!(character < vocabulary);
        assert!(text.contains("- **Hero** ⚠️: about Hero"));
        assert!(text.contains("- **Slang** ⭐: about Slang"));
        assert!(text.contains("- **Terms**: about Terms"));
        assert_eq!(format_notes_for_context(Vec::<LiteraryNote>::new().iter()), "");
    }

    #[test]
    fn test_filter_by_section() {
        let notes = vec![
            note("a", NoteType::Tone, "x", Importance::Low),
            note("b", NoteType::Tone, "y", Importance::Low),
        ];
        let only_a = filter_notes_by_section(&notes, "a");
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].title, "x");
    }
}
