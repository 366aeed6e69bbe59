//! Indexed note storage.

use std::collections::HashMap;

use super::{Importance, LiteraryNote, NoteType};

/// Notes indexed by type, section, provider and pass.
///
/// Every `add` updates all indices together. Lookups return notes in
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct NoteCollection {
    notes: Vec<LiteraryNote>,
    by_type: HashMap<NoteType, Vec<usize>>,
    by_section: HashMap<String, Vec<usize>>,
    by_provider: HashMap<String, Vec<usize>>,
    by_pass: HashMap<u32, Vec<usize>>,
}

impl NoteCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, note: LiteraryNote) {
        let idx = self.notes.len();
        self.by_type.entry(note.note_type).or_default().push(idx);
        self.by_section
            .entry(note.section_id.clone())
            .or_default()
            .push(idx);
        self.by_provider
            .entry(note.provider.clone())
            .or_default()
            .push(idx);
        self.by_pass.entry(note.pass_number).or_default().push(idx);
        self.notes.push(note);
    }

    pub fn extend<I: IntoIterator<Item = LiteraryNote>>(&mut self, notes: I) {
        for note in notes {
            self.add(note);
        }
    }

    fn select(&self, indices: Option<&Vec<usize>>) -> Vec<&LiteraryNote> {
        indices
            .map(|ids| ids.iter().map(|&i| &self.notes[i]).collect())
            .unwrap_or_default()
    }

    pub fn for_section(&self, section_id: &str) -> Vec<&LiteraryNote> {
        self.select(self.by_section.get(section_id))
    }

    pub fn by_type(&self, note_type: NoteType) -> Vec<&LiteraryNote> {
        self.select(self.by_type.get(&note_type))
    }

    pub fn by_provider(&self, provider: &str) -> Vec<&LiteraryNote> {
        self.select(self.by_provider.get(provider))
    }

    pub fn by_pass(&self, pass_number: u32) -> Vec<&LiteraryNote> {
        self.select(self.by_pass.get(&pass_number))
    }

    pub fn critical(&self) -> Vec<&LiteraryNote> {
        self.notes
            .iter()
            .filter(|n| n.importance == Importance::Critical)
            .collect()
    }

    pub fn all(&self) -> &[LiteraryNote] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Plain-text overview: totals per type, then the critical count.
    pub fn summary(&self) -> String {
        let mut out = format!("Total Notes: {}\n\nBy Type:\n", self.notes.len());
        for note_type in NoteType::ALL {
            if let Some(ids) = self.by_type.get(&note_type) {
                out.push_str(&format!("  {}: {}\n", note_type, ids.len()));
            }
        }
        out.push_str(&format!("\nCritical Notes: {}\n", self.critical().len()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn note(section: &str, provider: &str, pass: u32, t: NoteType, imp: Importance) -> LiteraryNote {
        LiteraryNote {
            id: format!("{section}-{provider}-{pass}"),
            pass_number: pass,
            section_id: section.to_string(),
            location: section.to_string(),
            provider: provider.to_string(),
            note_type: t,
            importance: imp,
            title: "t".to_string(),
            content: "c".to_string(),
            examples: vec![],
            implications: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_indices_stay_consistent() {
        let mut notes = NoteCollection::new();
        notes.add(note("p1", "openai", 1, NoteType::Tone, Importance::High));
        notes.add(note("p2", "openai", 1, NoteType::Style, Importance::Critical));
        notes.add(note("p1", "deepseek", 2, NoteType::Tone, Importance::Low));

        assert_eq!(notes.len(), 3);
        assert_eq!(notes.for_section("p1").len(), 2);
        assert_eq!(notes.by_type(NoteType::Tone).len(), 2);
        assert_eq!(notes.by_provider("openai").len(), 2);
        assert_eq!(notes.by_pass(2).len(), 1);
        assert_eq!(notes.by_pass(2)[0].provider, "deepseek");
        assert_eq!(notes.critical().len(), 1);
        assert!(notes.for_section("missing").is_empty());
    }

    #[test]
    fn test_summary() {
        let mut notes = NoteCollection::new();
        notes.add(note("p1", "a", 1, NoteType::Theme, Importance::Critical));
        let summary = notes.summary();
        assert!(summary.contains("Total Notes: 1"));
        assert!(summary.contains("  theme: 1"));
        assert!(summary.contains("Critical Notes: 1"));
    }
}
