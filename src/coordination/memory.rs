//! In-process coordination store.
//!
//! Behaves like a single-node ensemble: paths are a flat map and sessions
//! never expire unless told to. Used for local runs and tests, including
//! simulating an unreachable ensemble.

use super::{CoordinationConnector, CoordinationStore};
use crate::error::ConnectionError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct InMemoryCoordinationStore {
    nodes: DashMap<String, Vec<u8>>,
    exists_calls: AtomicU64,
    expire_next: AtomicBool,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `path`; returns false if it already exists
    pub fn create(&self, path: impl Into<String>, data: Vec<u8>) -> bool {
        match self.nodes.entry(path.into()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(data);
                true
            }
        }
    }

    pub fn delete(&self, path: &str) -> bool {
        self.nodes.remove(path).is_some()
    }

    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.nodes.get(path).map(|entry| entry.value().clone())
    }

    /// Synchronous existence check that does not count as a poll
    pub fn exists_now(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn exists_calls(&self) -> u64 {
        self.exists_calls.load(Ordering::SeqCst)
    }

    /// The next existence check fails with a lost session
    pub fn expire_session_on_next_check(&self) {
        self.expire_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn exists(&self, path: &str) -> Result<bool, ConnectionError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.expire_next.swap(false, Ordering::SeqCst) {
            return Err(ConnectionError::session_lost("session expired"));
        }
        Ok(self.nodes.contains_key(path))
    }
}

/// Connector handing out sessions on an [`InMemoryCoordinationStore`]
#[derive(Debug)]
pub struct InMemoryConnector {
    target: String,
    store: Arc<InMemoryCoordinationStore>,
    reachable: AtomicBool,
    fail_first: AtomicU32,
    attempts: AtomicU32,
    connect_delay: Duration,
}

impl InMemoryConnector {
    pub fn new(target: impl Into<String>, store: Arc<InMemoryCoordinationStore>) -> Self {
        Self {
            target: target.into(),
            store,
            reachable: AtomicBool::new(true),
            fail_first: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            connect_delay: Duration::ZERO,
        }
    }

    /// A connector whose ensemble refuses every connection
    pub fn unreachable(target: impl Into<String>) -> Self {
        let connector = Self::new(target, Arc::new(InMemoryCoordinationStore::new()));
        connector.set_reachable(false);
        connector
    }

    /// Refuse the first `count` connection attempts
    pub fn failing_first(self, count: u32) -> Self {
        self.fail_first.store(count, Ordering::SeqCst);
        self
    }

    /// Make each connection attempt take this long
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &Arc<InMemoryCoordinationStore> {
        &self.store
    }
}

#[async_trait]
impl CoordinationConnector for InMemoryConnector {
    fn target(&self) -> &str {
        &self.target
    }

    async fn connect(&self) -> Result<Arc<dyn CoordinationStore>, ConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(ConnectionError::refused(&self.target, "connection refused"));
        }

        let remaining_failures = self.fail_first.load(Ordering::SeqCst);
        if remaining_failures > 0 {
            self.fail_first.store(remaining_failures - 1, Ordering::SeqCst);
            return Err(ConnectionError::refused(&self.target, "ensemble not ready"));
        }

        Ok(Arc::clone(&self.store) as Arc<dyn CoordinationStore>)
    }
}
