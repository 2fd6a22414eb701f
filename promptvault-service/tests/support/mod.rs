//! Shared harness for service integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use promptvault_core::Clock;
use promptvault_service::{PromptService, ServiceConfig};
use promptvault_storage::{InMemoryKvBackend, KvBackend};
use promptvault_test_utils::assertions::assert_ok;
use promptvault_test_utils::fixtures;
use promptvault_test_utils::{CountingStore, ManualClock, NewPrompt, Prompt, SequentialIdGenerator};

/// A service wired to in-memory collaborators and a manual clock.
pub struct Harness {
    pub service: PromptService,
    pub store: Arc<CountingStore>,
    pub backend: Arc<InMemoryKvBackend>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let clock = fixtures::manual_clock();
        let backend = Arc::new(InMemoryKvBackend::new(clock.clone()));
        Self::with_backend(config, clock, backend)
    }

    pub fn with_backend(
        config: ServiceConfig,
        clock: Arc<ManualClock>,
        backend: Arc<InMemoryKvBackend>,
    ) -> Self {
        let store = Arc::new(CountingStore::new());
        let service = assert_ok(PromptService::new(
            store.clone(),
            store.clone(),
            backend.clone(),
            clock.clone(),
            Arc::new(SequentialIdGenerator::new()),
            config,
        ));
        Self {
            service,
            store,
            backend,
            clock,
        }
    }

    /// Create through the service, so the ledger and invalidation run.
    pub async fn create(&self, input: NewPrompt) -> Prompt {
        assert_ok(self.service.create_prompt(input).await)
    }

    /// Insert straight into the store, bypassing every cache hook.
    pub async fn insert_behind_cache(&self, prompt: &Prompt) {
        use promptvault_storage::PromptStore as _;
        assert_ok(self.store.inner().insert(prompt).await);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    pub fn now(&self) -> promptvault_core::Timestamp {
        self.clock.now()
    }

    /// Whether `key` currently has a live row in the backend.
    pub async fn has_key(&self, key: &str) -> bool {
        matches!(self.backend.get(key).await, Ok(Some(_)))
    }
}

/// Poll `check` until it holds, yielding to spawned tasks in between.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
