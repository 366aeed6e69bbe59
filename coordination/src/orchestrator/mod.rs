//! Multi-pass orchestration
//!
//! A session runs N passes over one document. Each pass takes notes on
//! every unit (optional), polishes it by consensus, writes the accepted
//! text back into the document and persists what it produced. The next
//! pass starts from the mutated document.
//!
//! ```text
//!            ┌────────── pass 1..=N ──────────┐
//! Document ─▶│ notes ─▶ polish ─▶ persist     │─▶ Document'
//!            │   ▲ carried notes (same unit)  │
//!            └────────────────────────────────┘
//! ```
//!
//! Session state moves `running → completed` or `running → failed`. The
//! cancellation token is checked before every pass and every unit;
//! provider calls already in flight are allowed to finish.

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, PolishConfig};
use crate::document::{Document, TextUnit};
use crate::events::{emit_to, PolishEvent, SharedEventBus};
use crate::notes::{
    filter_notes_by_importance, filter_notes_by_section, format_notes_for_context, merge_notes,
    LiteraryNote, NoteCollection, NoteTaker,
};
use crate::polish::SectionPolisher;
use crate::report::PolishingReport;
use crate::router::{RouterError, SharedProviderPool};
use crate::store::{pass_id, PassStatus, PolishingStore, SessionStatus, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum PolishError {
    #[error("Routing error: {0}")]
    Router(#[from] RouterError),

    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Polishing cancelled")]
    Cancelled,
}

pub type PolishResult<T> = Result<T, PolishError>;

/// What one pass produced.
#[derive(Debug, Clone, Serialize)]
pub struct PassResult {
    pub pass_number: u32,
    pub pass_id: String,
    pub providers: Vec<String>,
    pub report: PolishingReport,
    /// Notes kept for this pass, after importance filtering.
    pub notes: Vec<LiteraryNote>,
    pub sections_processed: usize,
    pub changes: usize,
}

/// Outcome of a whole session.
#[derive(Debug, Clone, Serialize)]
pub struct MultiPassResult {
    pub session_id: String,
    pub final_document: Document,
    /// Last pass's report with section and change counts summed over all passes.
    pub final_report: PolishingReport,
    #[serde(skip)]
    pub all_notes: NoteCollection,
    pub total_changes: usize,
    pub pass_results: Vec<PassResult>,
}

/// Runs polishing passes over a document.
pub struct MultiPassPolisher {
    config: PolishConfig,
    pool: SharedProviderPool,
    store: Option<PolishingStore>,
    bus: Option<SharedEventBus>,
    session_id: String,
}

impl MultiPassPolisher {
    /// Validate `config` against `pool`.
    ///
    /// A provider any pass would consult but `pool` lacks is a
    /// configuration error here, before anything is dispatched.
    pub fn new(
        config: PolishConfig,
        pool: SharedProviderPool,
        store: Option<PolishingStore>,
        bus: Option<SharedEventBus>,
        session_id: impl Into<String>,
    ) -> PolishResult<Self> {
        config.validate()?;
        config.check_pool(&pool)?;
        Ok(Self {
            config,
            pool,
            store,
            bus,
            session_id: session_id.into(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &PolishConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&PolishingStore> {
        self.store.as_ref()
    }

    /// Run every configured pass over `document`.
    pub async fn polish_document(
        &self,
        document: Document,
        cancel: CancellationToken,
    ) -> PolishResult<MultiPassResult> {
        info!(
            session_id = %self.session_id,
            title = %document.title,
            units = document.unit_count(),
            passes = self.config.pass_count,
            "Starting polishing session"
        );

        if let Some(store) = &self.store {
            let config_json = serde_json::to_string(&self.config)?;
            store
                .create_session(
                    &self.session_id,
                    &document.title,
                    &document.title,
                    &config_json,
                )
                .await?;
        }
        emit_to(
            self.bus.as_ref(),
            PolishEvent::SessionStarted {
                session_id: self.session_id.clone(),
                pass_count: self.config.pass_count,
                units: document.unit_count(),
                timestamp: Utc::now(),
            },
        );

        let outcome = match self.run_passes(document, &cancel).await {
            Ok(result) => {
                let passes = result.pass_results.len() as u32;
                match self.mark_session(SessionStatus::Completed, passes).await {
                    Ok(()) => Ok(result),
                    Err(e) => Err((e, passes)),
                }
            }
            Err(failed) => Err(failed),
        };

        match outcome {
            Ok(result) => {
                info!(
                    session_id = %self.session_id,
                    passes = result.pass_results.len(),
                    total_changes = result.total_changes,
                    "Polishing session completed"
                );
                emit_to(
                    self.bus.as_ref(),
                    PolishEvent::SessionCompleted {
                        session_id: self.session_id.clone(),
                        passes: result.pass_results.len() as u32,
                        total_changes: result.total_changes,
                        timestamp: Utc::now(),
                    },
                );
                Ok(result)
            }
            Err((e, passes_done)) => {
                error!(session_id = %self.session_id, error = %e, "Polishing session failed");
                if let Err(mark) = self.mark_session(SessionStatus::Failed, passes_done).await {
                    warn!(session_id = %self.session_id, error = %mark, "Could not mark session failed");
                }
                emit_to(
                    self.bus.as_ref(),
                    PolishEvent::SessionFailed {
                        session_id: self.session_id.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn mark_session(&self, status: SessionStatus, passes: u32) -> PolishResult<()> {
        if let Some(store) = &self.store {
            store
                .update_session_status(&self.session_id, status, passes)
                .await?;
        }
        Ok(())
    }

    /// On failure also returns how many passes completed.
    async fn run_passes(
        &self,
        mut document: Document,
        cancel: &CancellationToken,
    ) -> Result<MultiPassResult, (PolishError, u32)> {
        let mut all_notes = NoteCollection::new();
        let mut pass_results: Vec<PassResult> = Vec::new();

        for pass_number in 1..=self.config.pass_count {
            let done = pass_results.len() as u32;
            if cancel.is_cancelled() {
                info!(session_id = %self.session_id, pass = pass_number, "Cancelled before pass");
                return Err((PolishError::Cancelled, done));
            }

            let pass = self
                .run_pass(pass_number, &mut document, &all_notes, cancel)
                .await
                .map_err(|e| (e, done))?;
            all_notes.extend(pass.notes.iter().cloned());
            pass_results.push(pass);
        }

        let total_changes: usize = pass_results.iter().map(|p| p.changes).sum();
        let total_sections: usize = pass_results.iter().map(|p| p.sections_processed).sum();
        let mut final_report = match pass_results.last() {
            Some(last) => last.report.clone(),
            None => PolishingReport::new(self.config.polishing_config_for_pass(1)),
        };
        final_report.total_sections = total_sections;
        final_report.total_changes = total_changes;

        Ok(MultiPassResult {
            session_id: self.session_id.clone(),
            final_document: document,
            final_report,
            all_notes,
            total_changes,
            pass_results,
        })
    }

    async fn run_pass(
        &self,
        pass_number: u32,
        document: &mut Document,
        session_notes: &NoteCollection,
        cancel: &CancellationToken,
    ) -> PolishResult<PassResult> {
        let polishing = self.config.polishing_config_for_pass(pass_number);
        let providers = polishing.providers.clone();
        let polisher = SectionPolisher::new(
            polishing.clone(),
            &self.pool,
            self.bus.clone(),
            &self.session_id,
        )?;
        let takers = if self.config.enable_note_taking {
            providers
                .iter()
                .map(|name| {
                    self.pool
                        .require(name)
                        .map(|router| NoteTaker::new(router, name.clone()))
                })
                .collect::<Result<Vec<_>, RouterError>>()?
        } else {
            Vec::new()
        };

        let pass_id = match &self.store {
            Some(store) => {
                store
                    .create_pass(&self.session_id, pass_number, &providers)
                    .await?
                    .pass_id
            }
            None => pass_id(&self.session_id, pass_number),
        };

        info!(
            session_id = %self.session_id,
            pass = pass_number,
            providers = ?providers,
            min_consensus = polishing.min_consensus,
            "Pass started"
        );
        emit_to(
            self.bus.as_ref(),
            PolishEvent::PassStarted {
                session_id: self.session_id.clone(),
                pass_number,
                providers: providers.clone(),
                timestamp: Utc::now(),
            },
        );

        let outcome = self
            .polish_units(
                pass_number,
                &pass_id,
                document,
                session_notes,
                &polisher,
                &takers,
                cancel,
                PolishingReport::new(polishing),
            )
            .await;

        let (report, notes) = match outcome {
            Ok(done) => done,
            Err(e) => {
                if let Some(store) = &self.store {
                    if let Err(mark) = store.complete_pass(&pass_id, PassStatus::Failed).await {
                        warn!(pass_id = %pass_id, error = %mark, "Could not mark pass failed");
                    }
                }
                return Err(e);
            }
        };

        if let Some(store) = &self.store {
            store.complete_pass(&pass_id, PassStatus::Completed).await?;
        }

        let result = PassResult {
            pass_number,
            pass_id,
            providers,
            sections_processed: report.total_sections,
            changes: report.total_changes,
            report,
            notes,
        };
        info!(
            session_id = %self.session_id,
            pass = pass_number,
            sections = result.sections_processed,
            changes = result.changes,
            notes = result.notes.len(),
            overall = result.report.overall_score,
            "Pass completed"
        );
        emit_to(
            self.bus.as_ref(),
            PolishEvent::PassCompleted {
                session_id: self.session_id.clone(),
                pass_number,
                sections: result.sections_processed,
                changes: result.changes,
                notes: result.notes.len(),
                timestamp: Utc::now(),
            },
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn polish_units(
        &self,
        pass_number: u32,
        pass_id: &str,
        document: &mut Document,
        session_notes: &NoteCollection,
        polisher: &SectionPolisher,
        takers: &[NoteTaker],
        cancel: &CancellationToken,
        mut report: PolishingReport,
    ) -> PolishResult<(PolishingReport, Vec<LiteraryNote>)> {
        let carry = self.config.carry_notes_forward && pass_number > 1;
        let total = document.unit_count();
        let mut pass_notes: Vec<LiteraryNote> = Vec::new();

        for (idx, unit) in document.units.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    session_id = %self.session_id,
                    pass = pass_number,
                    section_id = %unit.section_id,
                    "Cancelled before unit"
                );
                return Err(PolishError::Cancelled);
            }
            if !unit.is_polishable() {
                debug!(section_id = %unit.section_id, "Skipping empty unit");
                continue;
            }

            let previous: Vec<LiteraryNote> = if carry {
                filter_notes_by_section(session_notes.all(), &unit.section_id)
            } else {
                Vec::new()
            };

            let fresh = self.take_notes(pass_number, unit, &previous, takers).await;
            if let Some(store) = &self.store {
                for note in &fresh {
                    store.save_note(pass_id, note).await?;
                }
            }

            let context_notes = merge_notes(
                &previous
                    .iter()
                    .chain(fresh.iter())
                    .cloned()
                    .collect::<Vec<_>>(),
            );
            let notes_context = format_notes_for_context(&context_notes);

            let result = polisher.apply(unit, &notes_context).await;
            if let Some(store) = &self.store {
                store.save_result(pass_id, &result).await?;
                store
                    .save_changes(pass_id, &result.section_id, &result.changes)
                    .await?;
            }

            report.add_result(result);
            pass_notes.extend(fresh);
            emit_to(
                self.bus.as_ref(),
                PolishEvent::progress(
                    &self.session_id,
                    format!("Polished {}", unit.location),
                    Some(pass_number),
                    idx + 1,
                    total,
                ),
            );
        }

        report.finalize();
        Ok((report, pass_notes))
    }

    /// Notes from every taker in parallel; failed takers are skipped.
    async fn take_notes(
        &self,
        pass_number: u32,
        unit: &TextUnit,
        previous: &[LiteraryNote],
        takers: &[NoteTaker],
    ) -> Vec<LiteraryNote> {
        if takers.is_empty() || unit.original.chars().count() < self.config.note_min_text_chars {
            return Vec::new();
        }

        let replies = join_all(
            takers
                .iter()
                .map(|taker| taker.generate_notes(pass_number, unit, previous)),
        )
        .await;

        let mut notes = Vec::new();
        for (taker, reply) in takers.iter().zip(replies) {
            match reply {
                Ok(generated) => notes.extend(generated),
                Err(e) => {
                    warn!(
                        provider = %taker.provider(),
                        section_id = %unit.section_id,
                        error = %e,
                        "Note generation failed"
                    );
                    emit_to(
                        self.bus.as_ref(),
                        PolishEvent::warning(
                            &self.session_id,
                            format!(
                                "Note generation failed for {} with {}: {e}",
                                unit.location,
                                taker.provider()
                            ),
                        ),
                    );
                }
            }
        }
        filter_notes_by_importance(&notes, self.config.min_note_importance)
    }
}
