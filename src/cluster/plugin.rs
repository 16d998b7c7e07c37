//! Cluster-type plugin contract.
//!
//! The control loop never inspects a concrete cluster type. Category
//! specific behavior is reached through capability accessors that return
//! `None` when a cluster type does not support them.

use super::cost::Utilization;
use super::node::{Node, NodeInfo};
use super::Cluster;
use crate::config::ConfigurationError;
use crate::coordination::CoordinationClient;
use crate::error::ObservationError;
use crate::kafka::KafkaAdmin;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::Span;

pub trait ClusterPlugin: Send + Sync {
    /// Cluster-type tag this plugin serves, matched against `ClusterConfig::cluster_type`
    fn cluster_type(&self) -> &'static str;

    /// Register sensors and operators and validate plugin settings
    ///
    /// A returned error aborts startup for this cluster.
    fn bootstrap(&self, cluster: &Arc<Cluster>) -> Result<(), ConfigurationError>;

    fn node_from_info(&self, info: NodeInfo) -> Node {
        Node::new(info)
    }

    fn utilization(&self, _cluster: &Cluster) -> Utilization {
        Utilization::default()
    }

    fn span(&self, cluster_id: &str) -> Span {
        tracing::info_span!("cluster", cluster_id = %cluster_id, cluster_type = self.cluster_type())
    }

    fn node_discovery(&self) -> Option<&dyn NodeDiscovery> {
        None
    }

    fn kafka_admin(&self) -> Option<Arc<dyn KafkaAdmin>> {
        None
    }

    fn coordination(&self) -> Option<Arc<CoordinationClient>> {
        None
    }
}

/// Capability: enumerate the current members of a cluster
#[async_trait]
pub trait NodeDiscovery: Send + Sync {
    async fn discover(&self, cluster: &Cluster) -> Result<Vec<NodeInfo>, ObservationError>;
}
