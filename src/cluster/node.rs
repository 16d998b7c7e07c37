use crate::attributes::{Attribute, AttributeStore};
use crate::constants::AGENT_PRESENCE_WINDOW;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Connection details reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub hostname: String,
    pub service_port: u16,
    #[serde(default)]
    pub rack: Option<String>,
    pub cluster_id: String,
}

impl NodeInfo {
    pub fn new(
        node_id: impl Into<String>,
        hostname: impl Into<String>,
        service_port: u16,
        cluster_id: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            hostname: hostname.into(),
            service_port,
            rack: None,
            cluster_id: cluster_id.into(),
        }
    }

    pub fn with_rack(mut self, rack: impl Into<String>) -> Self {
        self.rack = Some(rack.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Commissioned,
    Maintenance,
    Decommissioned,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commissioned => write!(f, "commissioned"),
            Self::Maintenance => write!(f, "maintenance"),
            Self::Decommissioned => write!(f, "decommissioned"),
        }
    }
}

impl std::str::FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commissioned" => Ok(Self::Commissioned),
            "maintenance" => Ok(Self::Maintenance),
            "decommissioned" => Ok(Self::Decommissioned),
            _ => Err(format!("Invalid node status: {s}")),
        }
    }
}

/// One member of a cluster
#[derive(Debug)]
pub struct Node {
    id: String,
    info: RwLock<NodeInfo>,
    attributes: AttributeStore,
    /// Epoch millis of the last agent report, 0 when never seen
    agent_last_seen_ms: AtomicI64,
    maintenance: AtomicBool,
    status: RwLock<NodeStatus>,
    stale: AtomicBool,
}

impl Node {
    pub fn new(info: NodeInfo) -> Self {
        Self {
            id: info.node_id.clone(),
            info: RwLock::new(info),
            attributes: AttributeStore::new(),
            agent_last_seen_ms: AtomicI64::new(0),
            maintenance: AtomicBool::new(false),
            status: RwLock::new(NodeStatus::Commissioned),
            stale: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn info(&self) -> NodeInfo {
        self.info.read().clone()
    }

    pub fn hostname(&self) -> String {
        self.info.read().hostname.clone()
    }

    pub fn service_port(&self) -> u16 {
        self.info.read().service_port
    }

    pub fn cluster_id(&self) -> String {
        self.info.read().cluster_id.clone()
    }

    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    /// Refresh connection details from a new discovery report
    pub fn update_info(&self, info: NodeInfo) {
        *self.info.write() = info;
        self.stale.store(false, Ordering::SeqCst);
    }

    pub fn record_agent_heartbeat(&self) {
        self.record_agent_heartbeat_at(Utc::now().timestamp_millis());
    }

    pub fn record_agent_heartbeat_at(&self, epoch_millis: i64) {
        self.agent_last_seen_ms.fetch_max(epoch_millis, Ordering::SeqCst);
    }

    pub fn agent_last_seen_ms(&self) -> Option<i64> {
        match self.agent_last_seen_ms.load(Ordering::SeqCst) {
            0 => None,
            millis => Some(millis),
        }
    }

    pub fn is_agent_present(&self) -> bool {
        self.is_agent_present_at(Utc::now().timestamp_millis())
    }

    pub fn is_agent_present_at(&self, now_millis: i64) -> bool {
        self.agent_last_seen_ms()
            .is_some_and(|seen| now_millis - seen <= AGENT_PRESENCE_WINDOW.as_millis() as i64)
    }

    pub fn is_in_maintenance(&self) -> bool {
        self.maintenance.load(Ordering::SeqCst)
    }

    pub fn set_maintenance(&self, maintenance: bool) {
        self.maintenance.store(maintenance, Ordering::SeqCst);
    }

    pub fn status(&self) -> NodeStatus {
        *self.status.read()
    }

    pub fn set_status(&self, status: NodeStatus) {
        *self.status.write() = status;
    }

    /// No longer reported by the latest discovery sweep
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            info: self.info(),
            status: self.status(),
            maintenance: self.is_in_maintenance(),
            stale: self.is_stale(),
            agent_last_seen_ms: self.agent_last_seen_ms(),
            attributes: self.attributes.snapshot(true),
        }
    }

    pub fn from_snapshot(snapshot: NodeSnapshot) -> Self {
        let node = Self::new(snapshot.info);
        node.set_status(snapshot.status);
        node.set_maintenance(snapshot.maintenance);
        if snapshot.stale {
            node.mark_stale();
        }
        if let Some(seen) = snapshot.agent_last_seen_ms {
            node.record_agent_heartbeat_at(seen);
        }
        node.attributes.restore(snapshot.attributes);
        node
    }
}

/// Persisted form of a [`Node`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub info: NodeInfo,
    pub status: NodeStatus,
    pub maintenance: bool,
    #[serde(default)]
    pub stale: bool,
    pub agent_last_seen_ms: Option<i64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
}
