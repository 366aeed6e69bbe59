//! Row types returned by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notes::LiteraryNote;
use crate::polish::PolishingResult;

/// Session lifecycle: `Running` moves once to `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Passes share the session lifecycle.
pub type PassStatus = SessionStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub document_id: String,
    pub document_title: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Serialized configuration the session ran with.
    pub config_json: String,
    pub total_passes: u32,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassRecord {
    pub pass_id: String,
    pub session_id: String,
    pub pass_number: u32,
    /// Providers consulted in this pass, in configured order.
    pub providers: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: PassStatus,
}

/// Aggregate counts over one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_passes: u32,
    pub total_notes: usize,
    pub total_changes: usize,
    pub avg_overall_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassExport {
    pub pass: PassRecord,
    pub notes: Vec<LiteraryNote>,
    pub results: Vec<PolishingResult>,
}

/// One session with everything recorded under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub session: SessionRecord,
    pub passes: Vec<PassExport>,
    pub stats: SessionStats,
    pub exported_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_terminal() {
        for status in [
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>(), Ok(status));
        }
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!("paused".parse::<SessionStatus>().is_err());
    }
}
