//! Literary note types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a note is about. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    Character,
    Tone,
    Theme,
    Culture,
    Style,
    Context,
    Vocabulary,
    Structure,
}

impl NoteType {
    pub const ALL: [NoteType; 8] = [
        NoteType::Character,
        NoteType::Tone,
        NoteType::Theme,
        NoteType::Culture,
        NoteType::Style,
        NoteType::Context,
        NoteType::Vocabulary,
        NoteType::Structure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::Character => "character",
            NoteType::Tone => "tone",
            NoteType::Theme => "theme",
            NoteType::Culture => "culture",
            NoteType::Style => "style",
            NoteType::Context => "context",
            NoteType::Vocabulary => "vocabulary",
            NoteType::Structure => "structure",
        }
    }

    /// Heading used in prompt digests ("Character", "Tone", ...).
    pub fn heading(&self) -> &'static str {
        match self {
            NoteType::Character => "Character",
            NoteType::Tone => "Tone",
            NoteType::Theme => "Theme",
            NoteType::Culture => "Culture",
            NoteType::Style => "Style",
            NoteType::Context => "Context",
            NoteType::Vocabulary => "Vocabulary",
            NoteType::Structure => "Structure",
        }
    }
}

impl std::str::FromStr for NoteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        NoteType::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| format!("unknown note type: {s}"))
    }
}

impl std::fmt::Display for NoteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much a note matters. Totally ordered, `Low < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Low => "low",
            Importance::Medium => "medium",
            Importance::High => "high",
            Importance::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Importance::Low),
            "medium" => Ok(Importance::Medium),
            "high" => Ok(Importance::High),
            "critical" => Ok(Importance::Critical),
            other => Err(format!("unknown importance: {other}")),
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured observation about one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteraryNote {
    pub id: String,
    pub pass_number: u32,
    pub section_id: String,
    pub location: String,
    pub provider: String,
    pub note_type: NoteType,
    pub importance: Importance,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub implications: String,
    pub created_at: DateTime<Utc>,
}

impl LiteraryNote {
    /// Identity used when merging: section, type and case-insensitive title.
    pub fn merge_key(&self) -> (String, NoteType, String) {
        (
            self.section_id.clone(),
            self.note_type,
            self.title.to_lowercase(),
        )
    }
}

/// Where a batch of notes comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteContext {
    pub pass_number: u32,
    pub section_id: String,
    pub location: String,
    pub provider: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_type() {
        assert_eq!("Tone".parse::<NoteType>(), Ok(NoteType::Tone));
        assert_eq!(" STRUCTURE ".parse::<NoteType>(), Ok(NoteType::Structure));
        assert!("plot".parse::<NoteType>().is_err());
    }

    #[test]
    fn test_importance_order() {
        assert!(Importance::Low < Importance::Medium);
        assert!(Importance::High < Importance::Critical);
        assert_eq!(Importance::default(), Importance::Medium);
        assert_eq!("HIGH".parse::<Importance>(), Ok(Importance::High));
    }
}
