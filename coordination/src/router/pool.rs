//! Provider pool: one [`InstanceRouter`] per configured provider name.
//!
//! The polisher and note taker consult each provider of a pass in
//! parallel; the per-provider router supplies failover and rate-limit
//! handling among that provider's instances.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::{Instance, InstanceRouter, RouterConfig, RouterError, RouterResult, SharedRouter};
use crate::events::SharedEventBus;
use crate::provider::SharedProvider;

/// Instances created per provider unless configured otherwise.
pub const DEFAULT_INSTANCES_PER_PROVIDER: usize = 2;

/// Shared reference to a ProviderPool
pub type SharedProviderPool = Arc<ProviderPool>;

/// Named routers, kept in registration order.
pub struct ProviderPool {
    routers: HashMap<String, SharedRouter>,
    order: Vec<String>,
    config: RouterConfig,
    bus: Option<SharedEventBus>,
    session_id: String,
}

impl ProviderPool {
    pub fn new(
        config: RouterConfig,
        bus: Option<SharedEventBus>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            routers: HashMap::new(),
            order: Vec::new(),
            config,
            bus,
            session_id: session_id.into(),
        }
    }

    /// Create a shared reference to this pool
    pub fn shared(self) -> SharedProviderPool {
        Arc::new(self)
    }

    /// Register a provider backed by one handle per instance.
    ///
    /// Instance ids are `<name>-1`, `<name>-2`, ... Re-registering a name
    /// replaces its router.
    pub fn register(&mut self, name: &str, model: &str, handles: Vec<SharedProvider>) {
        let instances: Vec<Instance> = handles
            .into_iter()
            .enumerate()
            .map(|(i, handle)| {
                Instance::new(format!("{}-{}", name, i + 1), name, model, handle)
            })
            .collect();

        info!(provider = %name, model = %model, instances = instances.len(), "Registering provider");
        let router =
            InstanceRouter::new(instances, self.config, self.bus.clone(), &self.session_id);

        if self.routers.insert(name.to_string(), router.shared()).is_none() {
            self.order.push(name.to_string());
        }
    }

    /// Register `count` instances sharing one adapter.
    pub fn register_replicated(
        &mut self,
        name: &str,
        model: &str,
        handle: SharedProvider,
        count: usize,
    ) {
        let handles = (0..count.max(1)).map(|_| Arc::clone(&handle)).collect();
        self.register(name, model, handles);
    }

    /// Router for `name`, if registered.
    pub fn router(&self, name: &str) -> Option<SharedRouter> {
        self.routers.get(name).cloned()
    }

    /// Router for `name`, or `UnknownProvider`.
    pub fn require(&self, name: &str) -> RouterResult<SharedRouter> {
        self.router(name)
            .ok_or_else(|| RouterError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routers.contains_key(name)
    }

    /// Provider names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Total instances across every provider.
    pub fn instance_count(&self) -> usize {
        self.routers.values().map(|r| r.instance_count()).sum()
    }

    /// Shut down every router.
    pub fn shutdown(&self) {
        for router in self.routers.values() {
            router.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Provider, ProviderResult, ProviderStats};
    use async_trait::async_trait;

    struct Echo(&'static str);

    #[async_trait]
    impl Provider for Echo {
        fn name(&self) -> &str {
            self.0
        }

        async fn translate(&self, text: &str, _hint: &str) -> ProviderResult<String> {
            Ok(text.to_string())
        }

        fn stats(&self) -> ProviderStats {
            ProviderStats::default()
        }
    }

    #[tokio::test]
    async fn test_register_and_dispatch() {
        let mut pool = ProviderPool::new(RouterConfig::default(), None, "s");
        pool.register_replicated("openai", "gpt-4", Arc::new(Echo("openai")), 2);
        pool.register_replicated("deepseek", "deepseek-chat", Arc::new(Echo("deepseek")), 3);

        assert_eq!(pool.names(), vec!["openai", "deepseek"]);
        assert_eq!(pool.instance_count(), 5);

        let router = pool.require("openai").unwrap();
        let ids: Vec<_> = router.snapshot().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["openai-1", "openai-2"]);
        assert_eq!(router.dispatch("hello", "").await.unwrap(), "hello");
    }

    #[test]
    fn test_instances_take_registered_name() {
        let mut pool = ProviderPool::new(RouterConfig::default(), None, "s");
        // The adapter reports its own name; the pool key wins.
        pool.register_replicated("local-qwen", "qwen", Arc::new(Echo("openai-compatible")), 2);

        let router = pool.require("local-qwen").unwrap();
        assert_eq!(router.providers(), vec!["local-qwen"]);
        assert!(router
            .snapshot()
            .iter()
            .all(|s| s.provider == "local-qwen" && s.model == "qwen"));
    }

    #[test]
    fn test_unknown_provider() {
        let pool = ProviderPool::new(RouterConfig::default(), None, "s");
        assert!(matches!(
            pool.require("zhipu"),
            Err(RouterError::UnknownProvider(name)) if name == "zhipu"
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_reregister_keeps_order() {
        let mut pool = ProviderPool::new(RouterConfig::default(), None, "s");
        pool.register_replicated("a", "m", Arc::new(Echo("a")), 1);
        pool.register_replicated("b", "m", Arc::new(Echo("b")), 1);
        pool.register_replicated("a", "m", Arc::new(Echo("a")), 4);
        assert_eq!(pool.names(), vec!["a", "b"]);
        assert_eq!(pool.router("a").unwrap().instance_count(), 4);
    }
}
