//! Instance router: round-robin dispatch with retry and rate-limit backoff.
//!
//! A router owns an ordered list of [`Instance`]s and a cursor. Each
//! dispatch walks the list from the cursor, skipping unavailable
//! instances and instances already attempted by the same call, until a
//! non-empty reply comes back or the attempt budget
//! (`max_retries × instance_count`) runs out.
//!
//! An instance whose failure denotes a rate limit is disabled at once and
//! re-enabled after [`RATE_LIMIT_COOLDOWN`] by a task tied to the router's
//! lifetime: `shutdown()` or dropping the router cancels pending
//! re-enables.
//!
//! All mutable routing state (availability flags, last-used times, the
//! cursor) sits behind one mutex that is never held across an await.

pub mod instance;
pub mod pool;

pub use instance::{Instance, InstanceStatus};
pub use pool::{ProviderPool, SharedProviderPool, DEFAULT_INSTANCES_PER_PROVIDER};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{emit_to, PolishEvent, SharedEventBus};
use crate::provider::ProviderError;
use instance::RoutingState;

/// How long a rate-limited instance stays disabled.
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(30);

/// Default retries per instance when none is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Errors surfaced by a dispatch.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no provider instances available")]
    NoInstances,

    #[error(
        "dispatch failed after {retries} retries with {instances} instances: {}",
        .last.as_ref().map(ToString::to_string).unwrap_or_else(|| "no instance could be tried".to_string())
    )]
    Exhausted {
        retries: u32,
        instances: usize,
        last: Option<ProviderError>,
    },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl RouterError {
    /// The last provider failure, when the error wraps one.
    pub fn last_provider_error(&self) -> Option<&ProviderError> {
        match self {
            RouterError::Exhausted { last, .. } => last.as_ref(),
            _ => None,
        }
    }
}

/// Result type for router operations
pub type RouterResult<T> = Result<T, RouterError>;

/// Shared reference to an InstanceRouter
pub type SharedRouter = Arc<InstanceRouter>;

/// Retry policy for a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// Retries per instance; the attempt budget is this times the instance count.
    pub max_retries: u32,
    /// Pause after a failed attempt.
    pub retry_delay: Duration,
}

impl RouterConfig {
    /// Build a config; zero retries falls back to [`DEFAULT_MAX_RETRIES`].
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries: if max_retries == 0 {
                DEFAULT_MAX_RETRIES
            } else {
                max_retries
            },
            retry_delay,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

/// Round-robin dispatcher over a fixed set of instances.
pub struct InstanceRouter {
    instances: Vec<Instance>,
    state: Arc<Mutex<RoutingState>>,
    config: RouterConfig,
    bus: Option<SharedEventBus>,
    session_id: String,
    cancel: CancellationToken,
}

impl InstanceRouter {
    /// Create a router over `instances`.
    ///
    /// Instances are never removed afterwards; only their availability
    /// changes.
    pub fn new(
        instances: Vec<Instance>,
        config: RouterConfig,
        bus: Option<SharedEventBus>,
        session_id: impl Into<String>,
    ) -> Self {
        let session_id = session_id.into();
        let label = instances
            .first()
            .map(|i| i.provider.clone())
            .unwrap_or_default();

        if instances.is_empty() {
            warn!(session_id = %session_id, "Router created without instances");
            emit_to(
                bus.as_ref(),
                PolishEvent::warning(&session_id, "No provider instances configured"),
            );
        } else {
            emit_to(
                bus.as_ref(),
                PolishEvent::RouterInit {
                    session_id: session_id.clone(),
                    provider: label.clone(),
                    instances: instances.len(),
                    timestamp: Utc::now(),
                },
            );
        }

        let state = Arc::new(Mutex::new(RoutingState::new(&instances)));
        let router = Self {
            instances,
            state,
            config,
            bus,
            session_id,
            cancel: CancellationToken::new(),
        };

        if !router.instances.is_empty() {
            info!(
                provider = %label,
                instances = router.instances.len(),
                max_retries = router.config.max_retries,
                "Instance router ready"
            );
            router.emit(PolishEvent::RouterReady {
                session_id: router.session_id.clone(),
                provider: label,
                instances: router.instances.len(),
                timestamp: Utc::now(),
            });
        }
        router
    }

    /// Create a shared reference to this router
    pub fn shared(self) -> SharedRouter {
        Arc::new(self)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn available_count(&self) -> usize {
        self.lock_state()
            .status
            .iter()
            .filter(|s| s.available)
            .count()
    }

    /// Distinct provider names, in instance order.
    pub fn providers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.instances
            .iter()
            .filter(|i| seen.insert(i.provider.clone()))
            .map(|i| i.provider.clone())
            .collect()
    }

    pub fn config(&self) -> RouterConfig {
        self.config
    }

    /// Copies of every instance's routing state.
    pub fn snapshot(&self) -> Vec<InstanceStatus> {
        self.lock_state().status.clone()
    }

    /// Next available instance in round-robin order, if any.
    pub fn next_instance(&self) -> Option<Instance> {
        let idx = self.lock_state().advance()?;
        Some(self.instances[idx].clone())
    }

    /// The first `limit` available instances in list order.
    pub fn available_instances(&self, limit: usize) -> Vec<Instance> {
        let state = self.lock_state();
        state
            .status
            .iter()
            .enumerate()
            .filter(|(_, s)| s.available)
            .take(limit)
            .map(|(idx, _)| self.instances[idx].clone())
            .collect()
    }

    /// Flip an instance's availability flag. Returns false for unknown ids.
    pub fn set_available(&self, instance_id: &str, available: bool) -> bool {
        let mut state = self.lock_state();
        match state.index_of(instance_id) {
            Some(idx) => {
                state.status[idx].available = available;
                true
            }
            None => false,
        }
    }

    /// Send one request, rotating through instances until one succeeds.
    ///
    /// An instance already attempted by this call is skipped without
    /// consuming a pause, but the skip still counts against the attempt
    /// budget.
    pub async fn dispatch(&self, text: &str, hint: &str) -> RouterResult<String> {
        if self.instances.is_empty() {
            return Err(RouterError::NoInstances);
        }

        let max_attempts = self.config.max_retries as usize * self.instances.len();
        let mut tried: HashSet<String> = HashSet::new();
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..max_attempts {
            let Some(instance) = self.next_instance() else {
                warn!(session_id = %self.session_id, "All provider instances exhausted");
                self.emit(PolishEvent::warning(
                    &self.session_id,
                    "All provider instances exhausted",
                ));
                break;
            };

            if !tried.insert(instance.id.clone()) {
                continue;
            }

            debug!(instance = %instance.id, attempt = attempt + 1, "Dispatch attempt");
            self.emit(PolishEvent::Attempt {
                session_id: self.session_id.clone(),
                instance_id: instance.id.clone(),
                attempt: attempt + 1,
                max_attempts,
                timestamp: Utc::now(),
            });

            let reply = instance
                .handle
                .translate_with_progress(text, hint, self.bus.as_ref(), &self.session_id)
                .await;

            let err = match reply {
                Ok(reply) if !reply.is_empty() => {
                    self.mark_used(&instance.id);
                    debug!(instance = %instance.id, chars = text.chars().count(), "Dispatch succeeded");
                    self.emit(PolishEvent::Success {
                        session_id: self.session_id.clone(),
                        instance_id: instance.id.clone(),
                        attempt: attempt + 1,
                        timestamp: Utc::now(),
                    });
                    return Ok(reply);
                }
                Ok(_) => ProviderError::EmptyResponse,
                Err(e) => e,
            };

            warn!(instance = %instance.id, error = %err, "Dispatch attempt failed");
            self.emit(PolishEvent::Warning {
                session_id: self.session_id.clone(),
                message: format!("Request failed with {}: {}", instance.id, err),
                instance_id: Some(instance.id.clone()),
                timestamp: Utc::now(),
            });

            if err.is_rate_limit() {
                self.disable_for_cooldown(&instance.id);
            }
            last_error = Some(err);

            if attempt + 1 < max_attempts && !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(RouterError::Exhausted {
            retries: self.config.max_retries,
            instances: self.instances.len(),
            last: last_error,
        })
    }

    /// Cancel pending re-enable tasks. Disabled instances stay disabled.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Disable an instance now and schedule its re-enable.
    fn disable_for_cooldown(&self, instance_id: &str) {
        if !self.set_available(instance_id, false) {
            return;
        }
        warn!(
            instance = %instance_id,
            cooldown_secs = RATE_LIMIT_COOLDOWN.as_secs(),
            "Instance rate limited, disabling"
        );

        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();
        let bus = self.bus.clone();
        let session_id = self.session_id.clone();
        let instance_id = instance_id.to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(instance = %instance_id, "Re-enable cancelled by router shutdown");
                }
                _ = tokio::time::sleep(RATE_LIMIT_COOLDOWN) => {
                    {
                        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                        if let Some(idx) = state.index_of(&instance_id) {
                            state.status[idx].available = true;
                        }
                    }
                    info!(instance = %instance_id, "Instance re-enabled after cooldown");
                    emit_to(
                        bus.as_ref(),
                        PolishEvent::InstanceReenabled {
                            session_id,
                            instance_id,
                            timestamp: Utc::now(),
                        },
                    );
                }
            }
        });
    }

    fn mark_used(&self, instance_id: &str) {
        let mut state = self.lock_state();
        if let Some(idx) = state.index_of(instance_id) {
            state.status[idx].last_used = Some(Utc::now());
        }
    }

    fn emit(&self, event: PolishEvent) {
        emit_to(self.bus.as_ref(), event);
    }

    fn lock_state(&self) -> MutexGuard<'_, RoutingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for InstanceRouter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for InstanceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRouter")
            .field("instances", &self.instances)
            .field("config", &self.config)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Provider, ProviderResult, ProviderStats, SharedProvider};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed list of outcomes, then repeats the last one.
    struct Scripted {
        name: String,
        outcomes: Mutex<VecDeque<ProviderResult<String>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &str, outcomes: Vec<ProviderResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn translate(&self, _text: &str, _hint: &str) -> ProviderResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.pop_front().unwrap()
            } else {
                outcomes.front().cloned().unwrap()
            }
        }

        fn stats(&self) -> ProviderStats {
            ProviderStats::default()
        }
    }

    fn router_over(providers: &[Arc<Scripted>]) -> InstanceRouter {
        let instances = providers
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let handle: SharedProvider = p.clone();
                Instance::new(format!("{}-{}", p.name, i + 1), &p.name, "test-model", handle)
            })
            .collect();
        InstanceRouter::new(instances, RouterConfig::new(2, Duration::ZERO), None, "test")
    }

    #[tokio::test]
    async fn test_dispatch_empty_router_fails_fast() {
        let router = InstanceRouter::new(vec![], RouterConfig::default(), None, "test");
        let err = router.dispatch("hi", "").await.unwrap_err();
        assert!(matches!(err, RouterError::NoInstances));
    }

    #[tokio::test]
    async fn test_dispatch_fails_over_to_next_instance() {
        let bad = Scripted::new("a", vec![Err(ProviderError::Request("boom".into()))]);
        let good = Scripted::new("b", vec![Ok("done".into())]);
        let router = router_over(&[bad.clone(), good.clone()]);

        assert_eq!(router.dispatch("hi", "").await.unwrap(), "done");
        assert_eq!(bad.calls(), 1);
        assert_eq!(good.calls(), 1);
        let snap = router.snapshot();
        assert!(snap[1].last_used.is_some());
        assert!(snap[0].last_used.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_tries_each_instance_once() {
        let a = Scripted::new("a", vec![Err(ProviderError::Request("x".into()))]);
        let b = Scripted::new("b", vec![Ok(String::new())]);
        let router = router_over(&[a.clone(), b.clone()]);

        let err = router.dispatch("hi", "").await.unwrap_err();
        match err {
            RouterError::Exhausted {
                retries,
                instances,
                last,
            } => {
                assert_eq!(retries, 2);
                assert_eq!(instances, 2);
                assert!(matches!(last, Some(ProviderError::EmptyResponse)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_instance_reenabled_after_cooldown() {
        let limited = Scripted::new(
            "a",
            vec![Err(ProviderError::Request("HTTP 429".into())), Ok("later".into())],
        );
        let router = router_over(&[limited.clone()]);

        assert!(router.dispatch("hi", "").await.is_err());
        assert_eq!(router.available_count(), 0);
        assert!(router.next_instance().is_none());

        tokio::time::sleep(RATE_LIMIT_COOLDOWN + Duration::from_millis(10)).await;
        assert_eq!(router.available_count(), 1);
        assert_eq!(router.dispatch("hi", "").await.unwrap(), "later");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_reenable() {
        let limited = Scripted::new("a", vec![Err(ProviderError::RateLimited("slow".into()))]);
        let router = router_over(&[limited]);

        assert!(router.dispatch("hi", "").await.is_err());
        router.shutdown();
        tokio::time::sleep(RATE_LIMIT_COOLDOWN * 2).await;
        assert_eq!(router.available_count(), 0);
    }

    #[test]
    fn test_zero_retries_uses_default() {
        assert_eq!(RouterConfig::new(0, Duration::ZERO).max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_providers_are_distinct_in_order() {
        let a = Scripted::new("openai", vec![Ok("x".into())]);
        let b = Scripted::new("deepseek", vec![Ok("x".into())]);
        let router = router_over(&[a.clone(), a, b]);
        assert_eq!(router.providers(), vec!["openai", "deepseek"]);
        assert_eq!(router.instance_count(), 3);
    }
}
