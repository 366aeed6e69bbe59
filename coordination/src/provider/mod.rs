//! Provider capability contract
//!
//! Every text-generation backend (OpenAI-, Anthropic-, DeepSeek-, Qwen- or
//! local-model-style adapters) implements [`Provider`]. The router, the
//! consensus engine and the polisher only ever see this trait, never the
//! adapter internals.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::events::{PolishEvent, SharedEventBus};

/// Error raised by a single provider instance.
///
/// Never fatal on its own: the router logs it, excludes the instance from the
/// current call and moves on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Whether this failure denotes a rate limit.
    ///
    /// Adapters do not always classify their errors, so the rendered message
    /// is also scanned for "rate limit" and "429".
    pub fn is_rate_limit(&self) -> bool {
        if matches!(self, ProviderError::RateLimited(_)) {
            return true;
        }
        let message = self.to_string().to_lowercase();
        message.contains("rate limit") || message.contains("429")
    }
}

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Running counters kept by an adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub total: u64,
    pub translated: u64,
    pub cached: u64,
    pub errors: u64,
}

/// Text-generation capability consumed by the router.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name as used in configuration (e.g. "openai").
    fn name(&self) -> &str;

    /// Send `text` with a free-form context `hint` and return the reply.
    async fn translate(&self, text: &str, hint: &str) -> ProviderResult<String>;

    /// Like [`Provider::translate`], but reports progress on the event bus.
    async fn translate_with_progress(
        &self,
        text: &str,
        hint: &str,
        bus: Option<&SharedEventBus>,
        session_id: &str,
    ) -> ProviderResult<String> {
        if let Some(bus) = bus {
            bus.emit(PolishEvent::Progress {
                session_id: session_id.to_string(),
                message: format!("{} processing {} chars", self.name(), text.chars().count()),
                pass_number: None,
                processed: 0,
                total: 1,
                timestamp: Utc::now(),
            });
        }
        self.translate(text, hint).await
    }

    /// Snapshot of the adapter's counters.
    fn stats(&self) -> ProviderStats;
}

/// Shared handle to a provider adapter
pub type SharedProvider = Arc<dyn Provider>;
