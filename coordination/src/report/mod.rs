//! Polishing reports
//!
//! A [`PolishingReport`] accumulates unit results, is finalized once, and
//! is then rendered as markdown, a plain-text summary or JSON. Renderers
//! only read the finalized aggregate.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::polish::{Change, Dimension, DimensionScores, Issue, PolishingConfig, PolishingResult, Severity};

/// Cap on ranked top issues.
pub const MAX_TOP_ISSUES: usize = 50;
/// Cap on ranked significant changes.
pub const MAX_SIGNIFICANT_CHANGES: usize = 100;
/// Minimum confidence for a change to count as significant.
pub const SIGNIFICANT_CONFIDENCE: f64 = 0.8;

const MARKDOWN_TOP_ISSUES: usize = 20;
const MARKDOWN_CHANGES: usize = 30;
const DISPLAY_CHARS: usize = 200;

/// Letter grade for a score in [0, 1].
pub fn grade(score: f64) -> &'static str {
    match score {
        s if s >= 0.95 => "A+",
        s if s >= 0.90 => "A",
        s if s >= 0.85 => "A-",
        s if s >= 0.80 => "B+",
        s if s >= 0.75 => "B",
        s if s >= 0.70 => "B-",
        s if s >= 0.65 => "C+",
        s if s >= 0.60 => "C",
        _ => "D",
    }
}

fn truncate_for_display(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn dimension_label(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Spirit => "Spirit & Tone",
        Dimension::Language => "Language Quality",
        Dimension::Context => "Context & Meaning",
        Dimension::Vocabulary => "Vocabulary Richness",
    }
}

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🔴",
        Severity::Major => "🟠",
        Severity::Minor => "ℹ️",
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Aggregate over every unit result of one or more passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolishingReport {
    pub config: PolishingConfig,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub section_results: Vec<PolishingResult>,

    pub total_sections: usize,
    pub total_changes: usize,
    pub total_issues: usize,

    /// Percentage of units whose agreement met the minimum consensus.
    pub consensus_rate: f64,
    pub average_confidence: f64,
    pub average_scores: DimensionScores,
    pub overall_score: f64,

    pub issues_by_type: BTreeMap<String, usize>,
    pub issues_by_severity: BTreeMap<Severity, usize>,

    pub top_issues: Vec<Issue>,
    pub significant_changes: Vec<Change>,
}

impl PolishingReport {
    pub fn new(config: PolishingConfig) -> Self {
        Self {
            config,
            started_at: Utc::now(),
            finished_at: None,
            section_results: Vec::new(),
            total_sections: 0,
            total_changes: 0,
            total_issues: 0,
            consensus_rate: 0.0,
            average_confidence: 0.0,
            average_scores: DimensionScores::default(),
            overall_score: 0.0,
            issues_by_type: BTreeMap::new(),
            issues_by_severity: BTreeMap::new(),
            top_issues: Vec::new(),
            significant_changes: Vec::new(),
        }
    }

    pub fn add_result(&mut self, result: PolishingResult) {
        self.total_sections += 1;
        self.total_changes += result.changes.len();
        self.total_issues += result.issues.len();

        for issue in &result.issues {
            *self.issues_by_type.entry(issue.issue_type.clone()).or_default() += 1;
            *self.issues_by_severity.entry(issue.severity).or_default() += 1;
            if issue.severity <= Severity::Major {
                self.top_issues.push(issue.clone());
            }
        }
        self.significant_changes.extend(
            result
                .changes
                .iter()
                .filter(|c| c.confidence >= SIGNIFICANT_CONFIDENCE)
                .cloned(),
        );
        self.section_results.push(result);
    }

    /// Compute averages and rankings. Safe to call more than once.
    pub fn finalize(&mut self) {
        self.finished_at = Some(Utc::now());

        if !self.section_results.is_empty() {
            let count = self.section_results.len() as f64;
            let scores: Vec<DimensionScores> =
                self.section_results.iter().map(|r| r.scores).collect();
            self.average_scores = DimensionScores::average(&scores);
            self.overall_score = self.average_scores.overall();
            self.average_confidence =
                self.section_results.iter().map(|r| r.confidence).sum::<f64>() / count;
            let met = self.section_results.iter().filter(|r| r.consensus_met).count();
            self.consensus_rate = met as f64 / count * 100.0;
        }

        self.top_issues.sort_by_key(|i| i.severity);
        self.top_issues.truncate(MAX_TOP_ISSUES);

        self.significant_changes
            .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        self.significant_changes.truncate(MAX_SIGNIFICANT_CHANGES);
    }

    fn duration_secs(&self) -> i64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds())
            .unwrap_or_default()
    }

    /// Full narrative report.
    pub fn render_markdown(&self) -> String {
        let mut md = String::new();
        let providers = self.config.providers.len();

        md.push_str("# Translation Polishing Report\n\n");
        if let Some(end) = self.finished_at {
            let _ = writeln!(md, "**Generated:** {}\n", end.format("%Y-%m-%d %H:%M:%S"));
        }
        let _ = writeln!(md, "**Duration:** {}s\n", self.duration_secs());

        md.push_str("## Configuration\n\n");
        let _ = writeln!(md, "- **Providers:** {}", self.config.providers.join(", "));
        let _ = writeln!(
            md,
            "- **Minimum Consensus:** {}/{} providers",
            self.config.min_consensus, providers
        );
        md.push_str("- **Verification Dimensions:**\n");
        for dimension in &self.config.dimensions {
            let _ = writeln!(md, "  - ✅ {}", dimension_label(*dimension));
        }
        md.push('\n');

        md.push_str("## Executive Summary\n\n");
        let _ = writeln!(md, "- **Total Sections Verified:** {}", self.total_sections);
        let _ = writeln!(md, "- **Total Changes Made:** {}", self.total_changes);
        let _ = writeln!(md, "- **Consensus Rate:** {:.1}%", self.consensus_rate);
        let _ = writeln!(md, "- **Average Confidence:** {:.1}%", self.average_confidence * 100.0);
        let _ = writeln!(md, "- **Overall Quality Score:** {:.1}%\n", self.overall_score * 100.0);

        md.push_str("## Quality Scores\n\n");
        md.push_str("| Dimension | Score | Grade |\n");
        md.push_str("|-----------|-------|-------|\n");
        for dimension in Dimension::ALL {
            let score = self.average_scores.get(dimension);
            let _ = writeln!(
                md,
                "| **{}** | {:.1}% | {} |",
                dimension_label(dimension),
                score * 100.0,
                grade(score)
            );
        }
        let _ = writeln!(
            md,
            "| **Overall** | {:.1}% | {} |\n",
            self.overall_score * 100.0,
            grade(self.overall_score)
        );

        if self.total_issues > 0 {
            md.push_str("## Issues Summary\n\n");
            let _ = writeln!(md, "**Total Issues Found:** {}\n", self.total_issues);
            md.push_str("### By Severity\n\n");
            for (severity, count) in &self.issues_by_severity {
                let _ = writeln!(md, "- {} **{}:** {}", severity_icon(*severity), severity, count);
            }
            md.push_str("\n### By Type\n\n");
            for (issue_type, count) in &self.issues_by_type {
                let _ = writeln!(md, "- **{}:** {}", issue_type, count);
            }
            md.push('\n');
        }

        if !self.top_issues.is_empty() {
            md.push_str("## Top Issues\n\nThese are the most significant issues found:\n\n");
            for issue in self.top_issues.iter().take(MARKDOWN_TOP_ISSUES) {
                let _ = writeln!(
                    md,
                    "### {} {} - {}\n",
                    severity_icon(issue.severity),
                    capitalize(issue.severity.as_str()),
                    issue.location
                );
                let _ = writeln!(md, "**Type:** {}\n", issue.issue_type);
                let _ = writeln!(md, "**Description:** {}\n", issue.description);
                if !issue.suggestion.is_empty() {
                    let _ = writeln!(md, "**Suggestion:** {}\n", issue.suggestion);
                }
                md.push_str("---\n\n");
            }
        }

        if !self.significant_changes.is_empty() {
            md.push_str("## Significant Changes\n\nThese are the most impactful improvements made:\n\n");
            for change in self.significant_changes.iter().take(MARKDOWN_CHANGES) {
                let _ = writeln!(md, "### {}\n", change.location);
                let _ = writeln!(
                    md,
                    "**Confidence:** {:.1}% ({}/{} providers agreed)\n",
                    change.confidence * 100.0,
                    change.agreement,
                    providers
                );
                let _ = writeln!(md, "**Reason:** {}\n", change.reason);
                let _ = writeln!(
                    md,
                    "**Original:**\n```\n{}\n```\n",
                    truncate_for_display(&change.original, DISPLAY_CHARS)
                );
                let _ = writeln!(
                    md,
                    "**Polished:**\n```\n{}\n```\n",
                    truncate_for_display(&change.polished, DISPLAY_CHARS)
                );
                md.push_str("---\n\n");
            }
        }

        md.push_str("## Detailed Section Results\n\n");
        for result in &self.section_results {
            let _ = writeln!(md, "### {}\n", result.location);
            md.push_str("**Quality Scores:**\n");
            for dimension in Dimension::ALL {
                let _ = writeln!(
                    md,
                    "- {}: {:.1}%",
                    capitalize(dimension.as_str()),
                    result.scores.get(dimension) * 100.0
                );
            }
            let _ = writeln!(md, "- Overall: {:.1}%\n", result.overall_score * 100.0);
            if result.consensus_met {
                let _ = writeln!(
                    md,
                    "**Consensus:** ✅ {}/{} providers agreed\n",
                    result.consensus, result.providers_consulted
                );
            } else {
                let _ = writeln!(
                    md,
                    "**Consensus:** ❌ No consensus ({}/{} required)\n",
                    self.config.min_consensus, providers
                );
            }
            if !result.changes.is_empty() {
                md.push_str("**Changes Made:**\n");
                for change in &result.changes {
                    let _ = writeln!(
                        md,
                        "- {} (confidence: {:.1}%)",
                        change.reason,
                        change.confidence * 100.0
                    );
                }
                md.push('\n');
            }
            if !result.issues.is_empty() {
                md.push_str("**Issues Found:**\n");
                for issue in &result.issues {
                    let _ = writeln!(
                        md,
                        "- [{}] {}: {}",
                        issue.severity, issue.issue_type, issue.description
                    );
                }
                md.push('\n');
            }
            md.push_str("---\n\n");
        }

        md.push_str("## Conclusion\n\n");
        md.push_str(self.conclusion());
        md.push_str("\n\n");
        let _ = writeln!(
            md,
            "A total of **{} changes** were made to improve translation quality.",
            self.total_changes
        );
        md
    }

    fn conclusion(&self) -> &'static str {
        match self.overall_score {
            s if s >= 0.95 => "✅ **Excellent** - Translation quality is outstanding.",
            s if s >= 0.85 => {
                "✅ **Good** - Translation quality is very good with minor improvements made."
            }
            s if s >= 0.75 => {
                "⚠️ **Acceptable** - Translation quality is acceptable with some improvements made."
            }
            _ => "❌ **Needs Improvement** - Significant issues were found and addressed.",
        }
    }

    /// Short plain-text summary.
    pub fn render_summary(&self) -> String {
        let mut out = String::from("=== POLISHING SUMMARY ===\n\n");
        let _ = writeln!(out, "Duration: {}s", self.duration_secs());
        let _ = writeln!(out, "Sections Verified: {}", self.total_sections);
        let _ = writeln!(out, "Changes Made: {}", self.total_changes);
        let _ = writeln!(out, "Consensus Rate: {:.1}%", self.consensus_rate);
        let _ = writeln!(
            out,
            "Overall Quality: {:.1}% ({})\n",
            self.overall_score * 100.0,
            grade(self.overall_score)
        );
        out.push_str("Quality Breakdown:\n");
        for dimension in Dimension::ALL {
            let label = format!("{}:", capitalize(dimension.as_str()));
            let _ = writeln!(
                out,
                "  {:<11} {:.1}%",
                label,
                self.average_scores.get(dimension) * 100.0
            );
        }
        if self.total_issues > 0 {
            let _ = writeln!(out, "\nIssues Found: {}", self.total_issues);
            for (severity, count) in &self.issues_by_severity {
                let _ = writeln!(out, "  {}: {}", capitalize(severity.as_str()), count);
            }
        }
        out
    }

    /// Structured view for serialization.
    pub fn to_json(&self) -> serde_json::Value {
        let by_severity: BTreeMap<&str, usize> = self
            .issues_by_severity
            .iter()
            .map(|(s, c)| (s.as_str(), *c))
            .collect();
        json!({
            "timestamp": self.finished_at.map(|t| t.to_rfc3339()),
            "duration_secs": self.duration_secs(),
            "config": {
                "providers": self.config.providers,
                "min_consensus": self.config.min_consensus,
                "dimensions": self.config.dimensions,
            },
            "summary": {
                "total_sections": self.total_sections,
                "total_changes": self.total_changes,
                "total_issues": self.total_issues,
                "consensus_rate": self.consensus_rate,
                "average_confidence": self.average_confidence,
            },
            "quality_scores": {
                "spirit": self.average_scores.spirit,
                "language": self.average_scores.language,
                "context": self.average_scores.context,
                "vocabulary": self.average_scores.vocabulary,
                "overall": self.overall_score,
                "grade": grade(self.overall_score),
            },
            "issues": {
                "by_type": self.issues_by_type,
                "by_severity": by_severity,
                "top_issues": self.top_issues,
            },
            "changes": {
                "significant_changes": self.significant_changes,
            },
            "section_results": self.section_results,
        })
    }
}
