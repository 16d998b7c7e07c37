//! # Coordination Client
//!
//! Access to an external, strongly consistent coordination store (for Kafka,
//! the cluster's ZooKeeper ensemble). The control plane uses exactly one
//! signal from it: whether a well-known path exists. Brokers delete such a
//! path when an externally driven operation like a partition reassignment
//! completes, so "path is gone" means "operation finished".
//!
//! The store itself sits behind [`CoordinationStore`]. Transports plug in
//! through [`CoordinationConnector`]. [`CoordinationClient`] owns the shared
//! connection, applies the connect retry policy, and implements the polling
//! wait.

pub mod client;
pub mod memory;

use crate::error::ConnectionError;
use async_trait::async_trait;
use std::sync::Arc;

pub use client::CoordinationClient;
pub use memory::{InMemoryConnector, InMemoryCoordinationStore};

/// A live session against the coordination store
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, ConnectionError>;
}

/// Opens sessions against a coordination ensemble
#[async_trait]
pub trait CoordinationConnector: Send + Sync {
    /// Connect string or other human-readable target description
    fn target(&self) -> &str;

    async fn connect(&self) -> Result<Arc<dyn CoordinationStore>, ConnectionError>;
}
