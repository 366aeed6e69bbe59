//! Event types for polishing sessions
//!
//! One variant per notification kind, each with its own typed payload.
//! Every event carries the session it belongs to and when it happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// All events published while polishing a document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolishEvent {
    /// Router is being built from discovered instances
    RouterInit {
        session_id: String,
        provider: String,
        instances: usize,
        timestamp: DateTime<Utc>,
    },

    /// Router finished construction and can dispatch
    RouterReady {
        session_id: String,
        provider: String,
        instances: usize,
        timestamp: DateTime<Utc>,
    },

    /// Something non-fatal went wrong
    Warning {
        session_id: String,
        message: String,
        instance_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A single dispatch attempt against one instance
    Attempt {
        session_id: String,
        instance_id: String,
        attempt: usize,
        max_attempts: usize,
        timestamp: DateTime<Utc>,
    },

    /// A dispatch attempt succeeded
    Success {
        session_id: String,
        instance_id: String,
        attempt: usize,
        timestamp: DateTime<Utc>,
    },

    /// A rate-limited instance came back after its cooldown
    InstanceReenabled {
        session_id: String,
        instance_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A vote or a unit's acceptance rule produced a winner
    ConsensusReached {
        session_id: String,
        section_id: Option<String>,
        agreement: usize,
        consulted: usize,
        timestamp: DateTime<Utc>,
    },

    /// Free-form progress report
    Progress {
        session_id: String,
        message: String,
        pass_number: Option<u32>,
        processed: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    SessionStarted {
        session_id: String,
        pass_count: u32,
        units: usize,
        timestamp: DateTime<Utc>,
    },

    PassStarted {
        session_id: String,
        pass_number: u32,
        providers: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    PassCompleted {
        session_id: String,
        pass_number: u32,
        sections: usize,
        changes: usize,
        notes: usize,
        timestamp: DateTime<Utc>,
    },

    SessionCompleted {
        session_id: String,
        passes: u32,
        total_changes: usize,
        timestamp: DateTime<Utc>,
    },

    SessionFailed {
        session_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl PolishEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PolishEvent::RouterInit { timestamp, .. }
            | PolishEvent::RouterReady { timestamp, .. }
            | PolishEvent::Warning { timestamp, .. }
            | PolishEvent::Attempt { timestamp, .. }
            | PolishEvent::Success { timestamp, .. }
            | PolishEvent::InstanceReenabled { timestamp, .. }
            | PolishEvent::ConsensusReached { timestamp, .. }
            | PolishEvent::Progress { timestamp, .. }
            | PolishEvent::SessionStarted { timestamp, .. }
            | PolishEvent::PassStarted { timestamp, .. }
            | PolishEvent::PassCompleted { timestamp, .. }
            | PolishEvent::SessionCompleted { timestamp, .. }
            | PolishEvent::SessionFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            PolishEvent::RouterInit { .. } => "router_init",
            PolishEvent::RouterReady { .. } => "router_ready",
            PolishEvent::Warning { .. } => "warning",
            PolishEvent::Attempt { .. } => "attempt",
            PolishEvent::Success { .. } => "success",
            PolishEvent::InstanceReenabled { .. } => "instance_reenabled",
            PolishEvent::ConsensusReached { .. } => "consensus_reached",
            PolishEvent::Progress { .. } => "progress",
            PolishEvent::SessionStarted { .. } => "session_started",
            PolishEvent::PassStarted { .. } => "pass_started",
            PolishEvent::PassCompleted { .. } => "pass_completed",
            PolishEvent::SessionCompleted { .. } => "session_completed",
            PolishEvent::SessionFailed { .. } => "session_failed",
        }
    }

    /// Get the session this event belongs to
    pub fn session_id(&self) -> &str {
        match self {
            PolishEvent::RouterInit { session_id, .. }
            | PolishEvent::RouterReady { session_id, .. }
            | PolishEvent::Warning { session_id, .. }
            | PolishEvent::Attempt { session_id, .. }
            | PolishEvent::Success { session_id, .. }
            | PolishEvent::InstanceReenabled { session_id, .. }
            | PolishEvent::ConsensusReached { session_id, .. }
            | PolishEvent::Progress { session_id, .. }
            | PolishEvent::SessionStarted { session_id, .. }
            | PolishEvent::PassStarted { session_id, .. }
            | PolishEvent::PassCompleted { session_id, .. }
            | PolishEvent::SessionCompleted { session_id, .. }
            | PolishEvent::SessionFailed { session_id, .. } => session_id,
        }
    }

    /// Get the instance ID if this event concerns a single instance
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            PolishEvent::Warning { instance_id, .. } => instance_id.as_deref(),
            PolishEvent::Attempt { instance_id, .. }
            | PolishEvent::Success { instance_id, .. }
            | PolishEvent::InstanceReenabled { instance_id, .. } => Some(instance_id),
            _ => None,
        }
    }

    /// Pass this event belongs to, for pass-scoped events.
    pub fn pass_number(&self) -> Option<u32> {
        match self {
            PolishEvent::Progress { pass_number, .. } => *pass_number,
            PolishEvent::PassStarted { pass_number, .. }
            | PolishEvent::PassCompleted { pass_number, .. } => Some(*pass_number),
            _ => None,
        }
    }

    /// Shorthand for a warning not tied to an instance
    pub fn warning(session_id: &str, message: impl Into<String>) -> Self {
        PolishEvent::Warning {
            session_id: session_id.to_string(),
            message: message.into(),
            instance_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for a progress report
    pub fn progress(
        session_id: &str,
        message: impl Into<String>,
        pass_number: Option<u32>,
        processed: usize,
        total: usize,
    ) -> Self {
        PolishEvent::Progress {
            session_id: session_id.to_string(),
            message: message.into(),
            pass_number,
            processed,
            total,
            timestamp: Utc::now(),
        }
    }
}
