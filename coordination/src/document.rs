//! Documents as ordered lists of independently polished text units.

use serde::{Deserialize, Serialize};

/// Smallest piece of text polished on its own: a title, a paragraph, a
/// piece of metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    /// Stable across passes; used to look up notes from earlier passes.
    pub section_id: String,
    /// Human-readable position ("Paragraph 3").
    pub location: String,
    /// Source-language text.
    pub original: String,
    /// Current translation; replaced when a pass accepts a change.
    pub current: String,
}

impl TextUnit {
    pub fn new(
        section_id: impl Into<String>,
        location: impl Into<String>,
        original: impl Into<String>,
        current: impl Into<String>,
    ) -> Self {
        Self {
            section_id: section_id.into(),
            location: location.into(),
            original: original.into(),
            current: current.into(),
        }
    }

    /// Units missing either side are left alone.
    pub fn is_polishable(&self) -> bool {
        !self.original.trim().is_empty() && !self.current.trim().is_empty()
    }
}

/// A titled document in reading order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub units: Vec<TextUnit>,
}

impl Document {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            units: Vec::new(),
        }
    }

    pub fn push(&mut self, unit: TextUnit) {
        self.units.push(unit);
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Units that will actually be sent to providers.
    pub fn polishable_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_polishable()).count()
    }

    /// Current text of every unit, in order.
    pub fn texts(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.current.as_str()).collect()
    }

    pub fn unit(&self, section_id: &str) -> Option<&TextUnit> {
        self.units.iter().find(|u| u.section_id == section_id)
    }
}
