//! # Cluster Model
//!
//! A [`Cluster`] is one managed system instance: its attribute store, its
//! node map, the sensors and operators registered by its plugin, and the
//! [`ActionEngine`] that runs its actions. Sensors write into the attribute
//! stores; operators and conflict detectors only read from them.
//!
//! Clusters are built once at startup through [`ClusterBuilder`] and live for
//! the rest of the process.

pub mod cost;
pub mod node;
pub mod plugin;
pub mod state_sink;

pub use cost::{ClusterCost, CostCalculator, FlatRateCostCalculator, Utilization};
pub use node::{Node, NodeInfo, NodeSnapshot, NodeStatus};
pub use plugin::{ClusterPlugin, NodeDiscovery};
pub use state_sink::{ClusterSnapshot, ClusterStateSink, FileClusterStateSink};

use crate::action::ActionEngine;
use crate::alert::{AlertError, AlertFactory, AlertMessage, LoggingAlertSink, StaticAlertFactory};
use crate::attributes::AttributeStore;
use crate::audit::{ActionAuditor, LoggingAuditor};
use crate::automation::{Operator, OperatorContainer, Sensor, SensorContainer};
use crate::config::{ActionsConfig, AutomationConfig, ClusterConfig, ConfigurationError};
use crate::error::OrionResult;
use crate::logging::log_alert;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct Cluster {
    id: String,
    name: String,
    cluster_type: String,
    config: ClusterConfig,
    automation: AutomationConfig,
    attributes: AttributeStore,
    nodes: DashMap<String, Arc<Node>>,
    sensors: RwLock<Vec<Arc<SensorContainer>>>,
    operators: RwLock<Vec<Arc<OperatorContainer>>>,
    engine: ActionEngine,
    alert_factory: Arc<dyn AlertFactory>,
    cost_calculator: Arc<dyn CostCalculator>,
    plugin: Arc<dyn ClusterPlugin>,
    state_sink: Option<Arc<dyn ClusterStateSink>>,
    maintenance: AtomicBool,
    enabled_actions: Option<BTreeSet<String>>,
    automation_owner: String,
}

impl Cluster {
    pub fn builder(config: ClusterConfig, plugin: Arc<dyn ClusterPlugin>) -> ClusterBuilder {
        ClusterBuilder::new(config, plugin)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster_type(&self) -> &str {
        &self.cluster_type
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn automation_config(&self) -> &AutomationConfig {
        &self.automation
    }

    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    pub fn engine(&self) -> &ActionEngine {
        &self.engine
    }

    pub fn auditor(&self) -> &Arc<dyn ActionAuditor> {
        self.engine.auditor()
    }

    pub fn alert_factory(&self) -> &Arc<dyn AlertFactory> {
        &self.alert_factory
    }

    pub fn plugin(&self) -> &Arc<dyn ClusterPlugin> {
        &self.plugin
    }

    /// Owner recorded on actions this cluster's operators dispatch
    pub fn automation_owner(&self) -> &str {
        &self.automation_owner
    }

    pub fn span(&self) -> tracing::Span {
        self.plugin.span(&self.id)
    }

    pub fn is_in_maintenance(&self) -> bool {
        self.maintenance.load(Ordering::SeqCst)
    }

    pub fn set_maintenance(&self, maintenance: bool) {
        self.maintenance.store(maintenance, Ordering::SeqCst);
        info!(cluster_id = %self.id, maintenance = maintenance, "🔧 Cluster maintenance mode changed");
    }

    pub fn is_action_enabled(&self, action_name: &str) -> bool {
        self.enabled_actions
            .as_ref()
            .map_or(true, |enabled| enabled.contains(action_name))
    }

    pub fn node(&self, node_id: &str) -> Option<Arc<Node>> {
        self.nodes.get(node_id).map(|entry| Arc::clone(entry.value()))
    }

    /// All nodes ordered by id
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        let mut nodes: Vec<_> = self.nodes.iter().map(|entry| Arc::clone(entry.value())).collect();
        nodes.sort_by(|a, b| a.id().cmp(b.id()));
        nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Insert a node built by the plugin, or refresh the existing one
    pub fn update_node_from_info(&self, info: NodeInfo) -> Arc<Node> {
        match self.nodes.entry(info.node_id.clone()) {
            Entry::Occupied(existing) => {
                let node = Arc::clone(existing.get());
                node.update_info(info);
                node
            }
            Entry::Vacant(slot) => {
                let node = Arc::new(self.plugin.node_from_info(info));
                info!(cluster_id = %self.id, node_id = %node.id(), "🆕 Discovered node");
                slot.insert(Arc::clone(&node));
                node
            }
        }
    }

    /// Mark every node not in `seen`; returns the ids newly marked
    pub fn mark_missing_nodes_stale(&self, seen: &HashSet<String>) -> Vec<String> {
        let mut marked = Vec::new();
        for entry in self.nodes.iter() {
            let node = entry.value();
            if !seen.contains(node.id()) && !node.is_stale() {
                node.mark_stale();
                marked.push(node.id().to_string());
            }
        }
        if !marked.is_empty() {
            warn!(cluster_id = %self.id, nodes = ?marked, "Nodes missing from discovery sweep");
        }
        marked
    }

    pub fn remove_node(&self, node_id: &str) -> Option<Arc<Node>> {
        self.nodes.remove(node_id).map(|(_, node)| node)
    }

    pub fn register_sensor(&self, sensor: Arc<dyn Sensor>) -> Arc<SensorContainer> {
        let container = Arc::new(SensorContainer::new(
            sensor,
            self.automation.sensor_interval(),
            self.automation.sensor_timeout(),
        ));
        self.sensors.write().push(Arc::clone(&container));
        container
    }

    pub fn register_operator(&self, operator: Arc<dyn Operator>) -> Arc<OperatorContainer> {
        let container = Arc::new(OperatorContainer::new(
            operator,
            self.automation.operator_interval(),
            self.automation.operator_timeout(),
        ));
        self.operators.write().push(Arc::clone(&container));
        container
    }

    pub fn sensors(&self) -> Vec<Arc<SensorContainer>> {
        self.sensors.read().clone()
    }

    pub fn operators(&self) -> Vec<Arc<OperatorContainer>> {
        self.operators.read().clone()
    }

    pub fn sensor(&self, name: &str) -> Option<Arc<SensorContainer>> {
        self.sensors.read().iter().find(|s| s.name() == name).cloned()
    }

    /// Run the named sensors now; returns the names that did not complete in time
    pub async fn rerun_sensors(&self, names: &[String], timeout: Duration) -> Vec<String> {
        let mut incomplete = Vec::new();
        for name in names {
            let Some(container) = self.sensor(name) else {
                warn!(cluster_id = %self.id, sensor = %name, "Unknown sensor requested for re-run");
                incomplete.push(name.clone());
                continue;
            };
            match tokio::time::timeout(timeout, container.run(self)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(cluster_id = %self.id, sensor = %name, error = %e, "Sensor re-run failed");
                    incomplete.push(name.clone());
                }
                Err(_) => {
                    warn!(cluster_id = %self.id, sensor = %name, "Sensor re-run timed out");
                    incomplete.push(name.clone());
                }
            }
        }
        incomplete
    }

    /// Deliver to every sink the alert factory selects; failures are only logged
    pub async fn raise_alert(&self, alert: AlertMessage) {
        if let Err(e) = self.deliver(&alert).await {
            warn!(cluster_id = %self.id, title = %alert.title, error = %e, "Alert delivery failed");
        }
    }

    /// Deliver and report the first sink failure
    pub async fn notify(&self, alert: AlertMessage) -> Result<(), AlertError> {
        self.deliver(&alert).await
    }

    async fn deliver(&self, alert: &AlertMessage) -> Result<(), AlertError> {
        log_alert(&self.id, &alert.level.to_string(), &alert.title, &alert.body);
        let mut first_error = None;
        for sink in self.alert_factory.sinks_for(&self.id, alert.level) {
            if let Err(e) = sink.send(alert).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn utilization(&self) -> Utilization {
        self.plugin.utilization(self)
    }

    pub fn cost(&self) -> ClusterCost {
        self.cost_calculator.calculate(&self.id, &self.nodes())
    }

    pub fn snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot {
            cluster_id: self.id.clone(),
            taken_at: Utc::now(),
            attributes: self.attributes.snapshot(true),
            nodes: self.nodes().iter().map(|node| node.snapshot()).collect(),
        }
    }

    fn apply_snapshot(&self, snapshot: ClusterSnapshot) {
        self.attributes.restore(snapshot.attributes);
        for node in snapshot.nodes {
            let node = Node::from_snapshot(node);
            self.nodes.insert(node.id().to_string(), Arc::new(node));
        }
    }

    /// Persist observation state if a state sink is configured
    pub async fn checkpoint(&self) -> OrionResult<()> {
        match &self.state_sink {
            Some(sink) => sink.checkpoint(&self.snapshot()).await,
            None => Ok(()),
        }
    }

    pub fn has_state_sink(&self) -> bool {
        self.state_sink.is_some()
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cluster_type", &self.cluster_type)
            .field("nodes", &self.nodes.len())
            .field("maintenance", &self.is_in_maintenance())
            .finish()
    }
}

pub struct ClusterBuilder {
    config: ClusterConfig,
    plugin: Arc<dyn ClusterPlugin>,
    automation: AutomationConfig,
    actions: ActionsConfig,
    auditor: Arc<dyn ActionAuditor>,
    alert_factory: Arc<dyn AlertFactory>,
    cost_calculator: Arc<dyn CostCalculator>,
    state_sink: Option<Arc<dyn ClusterStateSink>>,
}

impl ClusterBuilder {
    pub fn new(config: ClusterConfig, plugin: Arc<dyn ClusterPlugin>) -> Self {
        Self {
            config,
            plugin,
            automation: AutomationConfig::default(),
            actions: ActionsConfig::default(),
            auditor: Arc::new(LoggingAuditor),
            alert_factory: Arc::new(StaticAlertFactory::new(vec![Arc::new(LoggingAlertSink)])),
            cost_calculator: Arc::new(FlatRateCostCalculator::default()),
            state_sink: None,
        }
    }

    pub fn automation(mut self, automation: AutomationConfig) -> Self {
        self.automation = automation;
        self
    }

    pub fn actions(mut self, actions: ActionsConfig) -> Self {
        self.actions = actions;
        self
    }

    pub fn auditor(mut self, auditor: Arc<dyn ActionAuditor>) -> Self {
        self.auditor = auditor;
        self
    }

    pub fn alert_factory(mut self, alert_factory: Arc<dyn AlertFactory>) -> Self {
        self.alert_factory = alert_factory;
        self
    }

    pub fn cost_calculator(mut self, cost_calculator: Arc<dyn CostCalculator>) -> Self {
        self.cost_calculator = cost_calculator;
        self
    }

    pub fn state_sink(mut self, state_sink: Arc<dyn ClusterStateSink>) -> Self {
        self.state_sink = Some(state_sink);
        self
    }

    /// Bootstrap through the plugin, then restore persisted observations
    pub async fn build(self) -> OrionResult<Arc<Cluster>> {
        if self.config.cluster_type != self.plugin.cluster_type() {
            return Err(ConfigurationError::plugin_error(
                &self.config.id,
                format!(
                    "cluster type '{}' does not match plugin '{}'",
                    self.config.cluster_type,
                    self.plugin.cluster_type()
                ),
            )
            .into());
        }

        let id = self.config.id.clone();
        let engine = ActionEngine::new(
            id.clone(),
            self.actions.clone(),
            self.automation.post_run_sensor_timeout(),
            self.auditor,
        );

        let cluster = Arc::new(Cluster {
            id,
            name: self.config.name.clone(),
            cluster_type: self.config.cluster_type.clone(),
            maintenance: AtomicBool::new(self.config.maintenance),
            enabled_actions: self
                .config
                .enabled_actions
                .as_ref()
                .map(|names| names.iter().cloned().collect()),
            automation_owner: self.actions.automation_owner.clone(),
            config: self.config,
            automation: self.automation,
            attributes: AttributeStore::new(),
            nodes: DashMap::new(),
            sensors: RwLock::new(Vec::new()),
            operators: RwLock::new(Vec::new()),
            engine,
            alert_factory: self.alert_factory,
            cost_calculator: self.cost_calculator,
            plugin: self.plugin,
            state_sink: self.state_sink,
        });

        cluster.plugin.bootstrap(&cluster)?;

        if let Some(sink) = &cluster.state_sink {
            if let Some(snapshot) = sink.restore(&cluster.id).await? {
                info!(
                    cluster_id = %cluster.id,
                    nodes = snapshot.nodes.len(),
                    taken_at = %snapshot.taken_at,
                    "♻️ Restored observation state"
                );
                cluster.apply_snapshot(snapshot);
            }
        }

        info!(
            cluster_id = %cluster.id,
            cluster_type = %cluster.cluster_type,
            sensors = cluster.sensors.read().len(),
            operators = cluster.operators.read().len(),
            "✅ Cluster bootstrapped"
        );
        Ok(cluster)
    }
}
