//! Per-unit polishing data: scores, issues, changes and results.

use serde::{Deserialize, Serialize};

/// Reason recorded on every change accepted by consensus.
pub const CONSENSUS_CHANGE_REASON: &str = "Multi-provider consensus improvement";

/// The four quality dimensions a verification scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Spirit,
    Language,
    Context,
    Vocabulary,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Spirit,
        Dimension::Language,
        Dimension::Context,
        Dimension::Vocabulary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Spirit => "spirit",
            Dimension::Language => "language",
            Dimension::Context => "context",
            Dimension::Vocabulary => "vocabulary",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores in [0, 1] for each dimension.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DimensionScores {
    pub spirit: f64,
    pub language: f64,
    pub context: f64,
    pub vocabulary: f64,
}

impl DimensionScores {
    pub fn uniform(score: f64) -> Self {
        Self {
            spirit: score,
            language: score,
            context: score,
            vocabulary: score,
        }
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Spirit => self.spirit,
            Dimension::Language => self.language,
            Dimension::Context => self.context,
            Dimension::Vocabulary => self.vocabulary,
        }
    }

    pub fn set(&mut self, dimension: Dimension, score: f64) {
        match dimension {
            Dimension::Spirit => self.spirit = score,
            Dimension::Language => self.language = score,
            Dimension::Context => self.context = score,
            Dimension::Vocabulary => self.vocabulary = score,
        }
    }

    /// Unweighted mean of the four dimensions.
    pub fn overall(&self) -> f64 {
        (self.spirit + self.language + self.context + self.vocabulary) / 4.0
    }

    /// Per-dimension mean; all zero for an empty slice.
    pub fn average(scores: &[DimensionScores]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        let n = scores.len() as f64;
        let mut avg = Self::default();
        for dimension in Dimension::ALL {
            let total: f64 = scores.iter().map(|s| s.get(dimension)).sum();
            avg.set(dimension, total / n);
        }
        avg
    }
}

/// Severity of an issue. Ordered so that `Critical < Major < Minor`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    #[default]
    Minor,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Minor => "minor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "major" => Some(Severity::Major),
            "minor" => Some(Severity::Minor),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem reported by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Declared type, lowercased ("language", "spirit", ...).
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub suggestion: String,
}

/// An accepted modification to a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub location: String,
    pub original: String,
    pub polished: String,
    pub reason: String,
    pub agreement: usize,
    pub confidence: f64,
}

/// One provider's verification of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub provider: String,
    pub scores: DimensionScores,
    /// Proposed text; equals the current text when the provider proposed none.
    pub polished_text: String,
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub explanation: String,
}

/// Consensus result for one unit in one pass.
///
/// `polished_text == current_text` unless `consensus >= min_consensus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolishingResult {
    pub section_id: String,
    pub location: String,
    pub original_text: String,
    /// Text before this pass.
    pub current_text: String,
    pub polished_text: String,
    pub changes: Vec<Change>,
    pub issues: Vec<Issue>,
    pub scores: DimensionScores,
    pub overall_score: f64,
    /// Size of the largest group of identical proposals.
    pub consensus: usize,
    /// `consensus / providers_consulted`, 0 when nobody answered.
    pub confidence: f64,
    pub providers_consulted: usize,
    /// Whether `consensus` met the configured minimum.
    pub consensus_met: bool,
}

impl PolishingResult {
    pub fn changed(&self) -> bool {
        self.polished_text != self.current_text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_is_mean() {
        let s = DimensionScores {
            spirit: 1.0,
            language: 0.8,
            context: 0.6,
            vocabulary: 0.4,
        };
        assert!((s.overall() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_average_scores() {
        let avg = DimensionScores::average(&[
            DimensionScores::uniform(0.9),
            DimensionScores::uniform(0.7),
        ]);
        assert!((avg.language - 0.8).abs() < 1e-9);
        assert_eq!(DimensionScores::average(&[]), DimensionScores::default());
    }

    #[test]
    fn test_severity_rank() {
        assert!(Severity::Critical < Severity::Major);
        assert!(Severity::Major < Severity::Minor);
        assert_eq!(Severity::parse(" MAJOR "), Some(Severity::Major));
        assert_eq!(Severity::parse("blocker"), None);
    }
}
