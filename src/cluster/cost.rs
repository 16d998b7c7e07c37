use super::node::{Node, NodeStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-dimension resource usage, each value a fraction in `0.0..=1.0`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Utilization {
    pub dimensions: BTreeMap<String, f64>,
}

impl Utilization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dimension: impl Into<String>, value: f64) -> Self {
        self.dimensions.insert(dimension.into(), value.clamp(0.0, 1.0));
        self
    }

    pub fn get(&self, dimension: &str) -> Option<f64> {
        self.dimensions.get(dimension).copied()
    }

    /// The most utilized dimension
    pub fn peak(&self) -> Option<(&str, f64)> {
        self.dimensions
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, value)| (name.as_str(), *value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCost {
    pub cluster_id: String,
    pub billable_nodes: usize,
    pub hourly_cost: f64,
    pub currency: String,
}

pub trait CostCalculator: Send + Sync {
    fn calculate(&self, cluster_id: &str, nodes: &[Arc<Node>]) -> ClusterCost;
}

/// Every node that is not decommissioned costs the same hourly rate
#[derive(Debug, Clone)]
pub struct FlatRateCostCalculator {
    hourly_rate: f64,
    currency: String,
}

impl FlatRateCostCalculator {
    pub fn new(hourly_rate: f64, currency: impl Into<String>) -> Self {
        Self {
            hourly_rate,
            currency: currency.into(),
        }
    }
}

impl Default for FlatRateCostCalculator {
    fn default() -> Self {
        Self::new(0.0, "USD")
    }
}

impl CostCalculator for FlatRateCostCalculator {
    fn calculate(&self, cluster_id: &str, nodes: &[Arc<Node>]) -> ClusterCost {
        let billable_nodes = nodes
            .iter()
            .filter(|node| node.status() != NodeStatus::Decommissioned)
            .count();
        ClusterCost {
            cluster_id: cluster_id.to_string(),
            billable_nodes,
            hourly_cost: billable_nodes as f64 * self.hourly_rate,
            currency: self.currency.clone(),
        }
    }
}
