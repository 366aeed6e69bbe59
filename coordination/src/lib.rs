//! Consensus Translation Polishing Library
//!
//! This library provides:
//! - Round-robin instance routing with retry and rate-limit backoff
//! - Quorum voting over identical provider replies
//! - Per-unit verification by several providers with a consensus rule
//! - Literary note taking carried across passes
//! - Multi-pass orchestration with SQLite persistence and reports
//!
//! # Flow
//!
//! ```text
//! PolishConfig ─▶ ProviderPool (one InstanceRouter per provider)
//!                     │
//! Document ─▶ MultiPassPolisher ─▶ NoteTaker + SectionPolisher ─▶ PolishingStore
//!                     │
//!                     └─▶ MultiPassResult { final_document, final_report, .. }
//! ```
//!
//! Every component takes an optional [`SharedEventBus`]; without one it
//! behaves the same and only logs through `tracing`.

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod consensus;
pub mod document;
pub mod events;
pub mod notes;
pub mod orchestrator;
pub mod polish;
pub mod protocol;
pub mod provider;
pub mod report;
pub mod router;
pub mod store;

// Re-export provider contract
pub use provider::{Provider, ProviderError, ProviderResult, ProviderStats, SharedProvider};

// Re-export event types
pub use events::{EventBus, EventFilter, PolishEvent, SharedEventBus};

// Re-export routing types
pub use router::{
    Instance, InstanceRouter, InstanceStatus, ProviderPool, RouterConfig, RouterError,
    RouterResult, SharedProviderPool, SharedRouter, DEFAULT_INSTANCES_PER_PROVIDER,
    RATE_LIMIT_COOLDOWN,
};

// Re-export consensus types
pub use consensus::{tally, ConsensusEngine, ConsensusOutcome, Tally};

// Re-export polishing types
pub use document::{Document, TextUnit};
pub use polish::{
    Change, Dimension, DimensionScores, Issue, PolishingConfig, PolishingResult, SectionPolisher,
    Severity, VerificationOutcome,
};

// Re-export note types
pub use notes::{
    filter_notes_by_importance, format_notes_for_context, merge_notes, Importance, LiteraryNote,
    NoteCollection, NoteTaker, NoteType,
};

// Re-export orchestration types
pub use config::{ConfigError, ConfigResult, PolishConfig};
pub use orchestrator::{MultiPassPolisher, MultiPassResult, PassResult, PolishError, PolishResult};
pub use report::PolishingReport;
pub use store::{PolishingStore, SessionExport, SessionStats, SessionStatus, StoreError};
