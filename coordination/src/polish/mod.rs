//! Section polisher
//!
//! Every configured provider verifies a unit in parallel. Their proposed
//! replacements (ignoring those equal to the current text) are grouped by
//! exact value, and the largest group wins only if it reaches
//! `min_consensus`. Scores are averaged over every provider that answered,
//! not just the winning group.
//!
//! A provider that fails is logged and left out of the tally. Retries
//! happen inside that provider's router, never here.

pub mod prompts;
pub mod types;

pub use prompts::build_verification_prompt;
pub use types::{
    Change, Dimension, DimensionScores, Issue, PolishingResult, Severity, VerificationOutcome,
    CONSENSUS_CHANGE_REASON,
};

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::consensus::tally;
use crate::document::TextUnit;
use crate::events::{emit_to, PolishEvent, SharedEventBus};
use crate::protocol::parse_verification;
use crate::router::{ProviderPool, RouterResult, SharedRouter};

/// Score assumed for a dimension a provider did not report.
pub const DEFAULT_SCORE: f64 = 0.9;

/// Settings for one polisher (usually one pass).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolishingConfig {
    /// Providers consulted for every unit, in order.
    pub providers: Vec<String>,
    /// Identical proposals needed to accept a change.
    pub min_consensus: usize,
    /// Dimensions described in the prompt.
    pub dimensions: Vec<Dimension>,
    pub default_score: f64,
}

impl Default for PolishingConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            min_consensus: 2,
            dimensions: Dimension::ALL.to_vec(),
            default_score: DEFAULT_SCORE,
        }
    }
}

/// Fold per-provider verifications of `unit` into one result.
///
/// `outcomes` order decides ties between equally large groups.
pub fn build_consensus(
    unit: &TextUnit,
    outcomes: &[VerificationOutcome],
    min_consensus: usize,
) -> PolishingResult {
    let consulted = outcomes.len();
    let scores = DimensionScores::average(
        &outcomes.iter().map(|o| o.scores).collect::<Vec<_>>(),
    );

    let issues: Vec<Issue> = outcomes
        .iter()
        .flat_map(|o| o.issues.iter().cloned())
        .map(|mut issue| {
            issue.location = unit.location.clone();
            issue
        })
        .collect();

    let proposals = tally(
        outcomes
            .iter()
            .map(|o| o.polished_text.as_str())
            .filter(|text| *text != unit.current),
    );
    let agreement = proposals.agreement;
    let confidence = if consulted > 0 {
        agreement as f64 / consulted as f64
    } else {
        0.0
    };
    let consensus_met = agreement >= min_consensus;

    let mut polished_text = unit.current.clone();
    let mut changes = Vec::new();
    if consensus_met {
        if let Some(winner) = proposals.winner {
            if winner != unit.current {
                changes.push(Change {
                    location: unit.location.clone(),
                    original: unit.current.clone(),
                    polished: winner.clone(),
                    reason: CONSENSUS_CHANGE_REASON.to_string(),
                    agreement,
                    confidence,
                });
            }
            polished_text = winner;
        }
    }

    PolishingResult {
        section_id: unit.section_id.clone(),
        location: unit.location.clone(),
        original_text: unit.original.clone(),
        current_text: unit.current.clone(),
        polished_text,
        changes,
        issues,
        overall_score: scores.overall(),
        scores,
        consensus: agreement,
        confidence,
        providers_consulted: consulted,
        consensus_met,
    }
}

/// Multi-provider verifier for single units.
pub struct SectionPolisher {
    config: PolishingConfig,
    routers: Vec<(String, SharedRouter)>,
    bus: Option<SharedEventBus>,
    session_id: String,
}

impl SectionPolisher {
    /// Resolve every configured provider in `pool`.
    ///
    /// Fails with `UnknownProvider` before any dispatch if one is missing.
    pub fn new(
        config: PolishingConfig,
        pool: &ProviderPool,
        bus: Option<SharedEventBus>,
        session_id: impl Into<String>,
    ) -> RouterResult<Self> {
        let routers = config
            .providers
            .iter()
            .map(|name| pool.require(name).map(|r| (name.clone(), r)))
            .collect::<RouterResult<Vec<_>>>()?;
        Ok(Self {
            config,
            routers,
            bus,
            session_id: session_id.into(),
        })
    }

    pub fn config(&self) -> &PolishingConfig {
        &self.config
    }

    /// Verify `unit` with every provider and build its consensus result.
    pub async fn polish_section(&self, unit: &TextUnit) -> PolishingResult {
        self.polish_section_with_notes(unit, "").await
    }

    /// Like [`Self::polish_section`], with a notes digest in the prompt.
    pub async fn polish_section_with_notes(
        &self,
        unit: &TextUnit,
        notes_context: &str,
    ) -> PolishingResult {
        let prompt: Arc<str> = Arc::from(build_verification_prompt(
            &unit.original,
            &unit.current,
            &self.config.dimensions,
            notes_context,
        ));
        let collected: Arc<Mutex<Vec<(usize, VerificationOutcome)>>> =
            Arc::new(Mutex::new(Vec::with_capacity(self.routers.len())));

        let tasks = self
            .routers
            .iter()
            .enumerate()
            .map(|(idx, (provider, router))| {
                let provider = provider.clone();
                let router = Arc::clone(router);
                let prompt = Arc::clone(&prompt);
                let collected = Arc::clone(&collected);
                let location = unit.location.clone();
                let current = unit.current.clone();
                let default_score = self.config.default_score;
                let bus = self.bus.clone();
                let session_id = self.session_id.clone();

                tokio::spawn(async move {
                    match router.dispatch(&prompt, &location).await {
                        Ok(reply) => {
                            let outcome =
                                parse_verification(&provider, &reply, &current, default_score);
                            collected.lock().await.push((idx, outcome));
                        }
                        Err(e) => {
                            warn!(provider = %provider, location = %location, error = %e, "Verification failed");
                            emit_to(
                                bus.as_ref(),
                                PolishEvent::warning(
                                    &session_id,
                                    format!("Verification failed for {location} with {provider}: {e}"),
                                ),
                            );
                        }
                    }
                })
            });

        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                warn!(error = %e, "Verification task aborted");
            }
        }

        let mut outcomes = std::mem::take(&mut *collected.lock().await);
        outcomes.sort_by_key(|(idx, _)| *idx);
        let outcomes: Vec<VerificationOutcome> = outcomes.into_iter().map(|(_, o)| o).collect();

        let result = build_consensus(unit, &outcomes, self.config.min_consensus);
        debug!(
            section_id = %unit.section_id,
            consulted = result.providers_consulted,
            consensus = result.consensus,
            overall = result.overall_score,
            "Section verified"
        );
        if result.changed() {
            info!(
                section_id = %unit.section_id,
                agreement = result.consensus,
                confidence = result.confidence,
                "Change accepted"
            );
            emit_to(
                self.bus.as_ref(),
                PolishEvent::ConsensusReached {
                    session_id: self.session_id.clone(),
                    section_id: Some(unit.section_id.clone()),
                    agreement: result.consensus,
                    consulted: result.providers_consulted,
                    timestamp: Utc::now(),
                },
            );
        }
        result
    }

    /// Polish `unit` and write the accepted text back into it.
    pub async fn apply(&self, unit: &mut TextUnit, notes_context: &str) -> PolishingResult {
        let result = self.polish_section_with_notes(unit, notes_context).await;
        unit.current = result.polished_text.clone();
        result
    }
}
