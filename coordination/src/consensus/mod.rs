//! Consensus engine
//!
//! Two ways of turning one logical request into one answer:
//!
//! - **Best-effort race**: delegate to the router; first success wins.
//! - **Quorum vote**: send the same request to the first `k` available
//!   instances at once, tally identical replies and keep the most frequent.
//!
//! Agreement is plain string equality. Two paraphrases of the same
//! sentence count as disagreement; this is a known precision limit of the
//! vote, not something the tally tries to paper over.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::{emit_to, PolishEvent, SharedEventBus};
use crate::router::{RouterResult, SharedRouter};

/// Result of counting identical replies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tally {
    /// Most frequent reply; ties go to the reply seen first.
    pub winner: Option<String>,
    /// How many replies equal the winner.
    pub agreement: usize,
    /// Number of distinct replies.
    pub distinct: usize,
}

/// Count replies by exact equality.
pub fn tally<I, S>(replies: I) -> Tally
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut groups: Vec<(String, usize)> = Vec::new();
    for reply in replies {
        let reply = reply.as_ref();
        match groups.iter_mut().find(|(text, _)| text == reply) {
            Some((_, count)) => *count += 1,
            None => groups.push((reply.to_string(), 1)),
        }
    }

    let distinct = groups.len();
    let mut best: Option<(String, usize)> = None;
    for (text, count) in groups {
        if best.as_ref().map_or(true, |(_, c)| count > *c) {
            best = Some((text, count));
        }
    }

    match best {
        Some((winner, agreement)) => Tally {
            winner: Some(winner),
            agreement,
            distinct,
        },
        None => Tally::default(),
    }
}

/// Answer chosen by [`ConsensusEngine::translate_with_consensus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub text: String,
    /// Replies identical to `text`.
    pub agreement: usize,
    /// Instances whose reply was collected.
    pub consulted: usize,
    /// True when no vote produced a reply and the race path answered.
    pub fell_back: bool,
}

/// Consensus engine over a single router.
pub struct ConsensusEngine {
    router: SharedRouter,
    bus: Option<SharedEventBus>,
    session_id: String,
}

impl ConsensusEngine {
    pub fn new(
        router: SharedRouter,
        bus: Option<SharedEventBus>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            router,
            bus,
            session_id: session_id.into(),
        }
    }

    /// Best-effort race: retry with failover, first success wins.
    pub async fn translate_with_retry(&self, text: &str, hint: &str) -> RouterResult<String> {
        self.router.dispatch(text, hint).await
    }

    /// Quorum vote over up to `required_agreement` instances.
    ///
    /// `k` is capped at the instance count; `k == 0` and a vote that
    /// yields no usable reply both fall back to the race path.
    pub async fn translate_with_consensus(
        &self,
        text: &str,
        hint: &str,
        required_agreement: usize,
    ) -> RouterResult<ConsensusOutcome> {
        let k = required_agreement.min(self.router.instance_count());
        if k == 0 {
            return self.fall_back(text, hint).await;
        }

        let voters = self.router.available_instances(k);
        let launched = voters.len();
        debug!(requested = required_agreement, launched, "Starting quorum vote");

        let (tx, mut rx) = mpsc::channel(launched.max(1));
        let text_owned: Arc<str> = Arc::from(text);
        let hint_owned: Arc<str> = Arc::from(hint);
        for instance in voters {
            let tx = tx.clone();
            let text = Arc::clone(&text_owned);
            let hint = Arc::clone(&hint_owned);
            tokio::spawn(async move {
                let reply = instance.handle.translate(&text, &hint).await;
                let _ = tx.send((instance.id, reply)).await;
            });
        }
        drop(tx);

        let mut replies = Vec::with_capacity(launched);
        while let Some((instance_id, reply)) = rx.recv().await {
            match reply {
                Ok(reply) if !reply.is_empty() => replies.push(reply),
                Ok(_) => debug!(instance = %instance_id, "Empty vote discarded"),
                Err(e) => warn!(instance = %instance_id, error = %e, "Vote failed"),
            }
        }

        let result = tally(&replies);
        match result.winner {
            Some(winner) => {
                info!(
                    agreement = result.agreement,
                    consulted = launched,
                    distinct = result.distinct,
                    "Consensus reached"
                );
                emit_to(
                    self.bus.as_ref(),
                    PolishEvent::ConsensusReached {
                        session_id: self.session_id.clone(),
                        section_id: None,
                        agreement: result.agreement,
                        consulted: launched,
                        timestamp: Utc::now(),
                    },
                );
                Ok(ConsensusOutcome {
                    text: winner,
                    agreement: result.agreement,
                    consulted: launched,
                    fell_back: false,
                })
            }
            None => self.fall_back(text, hint).await,
        }
    }

    async fn fall_back(&self, text: &str, hint: &str) -> RouterResult<ConsensusOutcome> {
        debug!("Quorum vote produced nothing, falling back to retry");
        let text = self.translate_with_retry(text, hint).await?;
        Ok(ConsensusOutcome {
            text,
            agreement: 1,
            consulted: 1,
            fell_back: true,
        })
    }
}
