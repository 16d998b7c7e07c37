use super::Sensor;
use crate::cluster::Cluster;
use crate::error::ObservationError;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;

pub const NODE_COUNT_ATTRIBUTE: &str = "node_count";

/// Keeps the node map in line with the plugin's discovery capability
///
/// Works for any cluster type whose plugin exposes
/// [`crate::cluster::NodeDiscovery`]. Nodes missing from a sweep are marked
/// stale rather than removed.
#[derive(Debug, Default)]
pub struct NodeDiscoverySensor;

impl NodeDiscoverySensor {
    pub const NAME: &'static str = "node_discovery";
}

#[async_trait]
impl Sensor for NodeDiscoverySensor {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn observe(&self, cluster: &Cluster) -> Result<(), ObservationError> {
        let discovery = cluster
            .plugin()
            .node_discovery()
            .ok_or_else(|| ObservationError::missing_capability(Self::NAME, "node_discovery"))?;

        let discovered = discovery.discover(cluster).await?;

        let mut seen = HashSet::with_capacity(discovered.len());
        for info in discovered {
            seen.insert(info.node_id.clone());
            cluster.update_node_from_info(info);
        }
        cluster.mark_missing_nodes_stale(&seen);
        cluster
            .attributes()
            .set(NODE_COUNT_ATTRIBUTE, json!(seen.len()), Self::NAME);
        Ok(())
    }
}
