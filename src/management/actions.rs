//! Node lifecycle actions.
//!
//! Both actions ask the management plane to remove the node's host, check
//! that it entered pending termination, and poll until the host is gone. A
//! replacement additionally waits for the cluster to regain its starting
//! node count.

use super::client::HostManager;
use crate::action::{Action, ActionBuilder, ActionContext, ActionHandler, ActionType, NODE_ID_PARAMETER};
use crate::cluster::{Cluster, NodeStatus};
use crate::error::ActionError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Parameter naming the node's instance in the management plane; defaults to the node id
pub const INSTANCE_ID_PARAMETER: &str = "instance_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostLifecycleTimings {
    /// Pause between the removal request and the pending termination check
    pub post_request_wait: Duration,
    pub termination_poll: Duration,
    pub termination_timeout: Duration,
    pub replacement_poll: Duration,
    pub replacement_timeout: Duration,
}

impl Default for HostLifecycleTimings {
    fn default() -> Self {
        Self {
            post_request_wait: Duration::from_secs(10),
            termination_poll: Duration::from_secs(60),
            termination_timeout: Duration::from_secs(30 * 60),
            replacement_poll: Duration::from_secs(60),
            replacement_timeout: Duration::from_secs(60 * 60),
        }
    }
}

/// Replaces a node's host and waits for the replacement to join
pub struct ReplaceHostAction {
    manager: Arc<dyn HostManager>,
    timings: HostLifecycleTimings,
}

impl ReplaceHostAction {
    pub const NAME: &'static str = "replace_host";

    pub fn new(manager: Arc<dyn HostManager>) -> Self {
        Self {
            manager,
            timings: HostLifecycleTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: HostLifecycleTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn builder(self, node_id: &str) -> ActionBuilder {
        Action::builder(Self::NAME, ActionType::Node, Arc::new(self))
            .parameter(NODE_ID_PARAMETER, node_id)
            .identity_keys([NODE_ID_PARAMETER])
    }
}

#[async_trait]
impl ActionHandler for ReplaceHostAction {
    fn description(&self) -> &'static str {
        "Replace a node's host through the management plane"
    }

    async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        let cluster = ctx.cluster();
        let starting_nodes = live_node_count(cluster);
        if starting_nodes == 0 {
            return Err(ActionError::precondition(format!(
                "no live nodes found in cluster {}",
                cluster.id()
            )));
        }

        let removal = remove_host(ctx, self.manager.as_ref(), &self.timings, true).await?;

        let started = Instant::now();
        loop {
            let current = live_node_count(cluster);
            if current >= starting_nodes {
                info!(
                    cluster_id = %cluster.id(),
                    node_id = %removal.node_id,
                    nodes = current,
                    "✅ Replacement host joined"
                );
                break;
            }
            if started.elapsed() > self.timings.replacement_timeout {
                return Err(ActionError::timeout(
                    format!(
                        "replacement for {} to join cluster {} ({current}/{starting_nodes} nodes)",
                        removal.host_name,
                        cluster.id()
                    ),
                    self.timings.replacement_timeout.as_millis() as u64,
                ));
            }
            tokio::time::sleep(self.timings.replacement_poll).await;
        }

        ctx.set_result("replaced_host", &removal.host_name)?;
        ctx.set_result("node_count", &starting_nodes)
    }
}

/// Terminates a node's host without a replacement
pub struct TerminateHostAction {
    manager: Arc<dyn HostManager>,
    timings: HostLifecycleTimings,
}

impl TerminateHostAction {
    pub const NAME: &'static str = "terminate_host";

    pub fn new(manager: Arc<dyn HostManager>) -> Self {
        Self {
            manager,
            timings: HostLifecycleTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: HostLifecycleTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn builder(self, node_id: &str) -> ActionBuilder {
        Action::builder(Self::NAME, ActionType::Node, Arc::new(self))
            .parameter(NODE_ID_PARAMETER, node_id)
            .identity_keys([NODE_ID_PARAMETER])
    }
}

#[async_trait]
impl ActionHandler for TerminateHostAction {
    fn description(&self) -> &'static str {
        "Terminate a node's host through the management plane"
    }

    async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        let removal = remove_host(ctx, self.manager.as_ref(), &self.timings, false).await?;
        ctx.set_result("terminated_host", &removal.host_name)
    }
}

struct Removal {
    node_id: String,
    host_name: String,
}

async fn remove_host(
    ctx: &ActionContext,
    manager: &dyn HostManager,
    timings: &HostLifecycleTimings,
    replace: bool,
) -> Result<Removal, ActionError> {
    let cluster = ctx.cluster();
    let node = ctx.node()?;
    let node_id = node.id().to_string();
    let instance_id: String = ctx
        .optional_parameter(INSTANCE_ID_PARAMETER)?
        .unwrap_or_else(|| node_id.clone());
    let fqdn = node.hostname();
    let host_name = fqdn.split('.').next().unwrap_or(&fqdn).to_string();

    if replace {
        manager.replace_host(cluster.id(), &instance_id).await?;
    } else {
        manager.terminate_host(cluster.id(), &instance_id).await?;
    }
    info!(
        cluster_id = %cluster.id(),
        node_id = %node_id,
        host = %host_name,
        instance_id = %instance_id,
        replace = replace,
        "🪓 Host removal requested"
    );

    tokio::time::sleep(timings.post_request_wait).await;
    if !manager.is_pending_termination(&host_name).await? {
        return Err(ActionError::precondition(format!(
            "host {host_name} ({instance_id}) did not enter pending termination"
        )));
    }
    node.set_status(NodeStatus::Decommissioned);

    let started = Instant::now();
    loop {
        tokio::time::sleep(timings.termination_poll).await;
        if manager.is_terminated(&host_name).await? {
            break;
        }
        if started.elapsed() > timings.termination_timeout {
            return Err(ActionError::timeout(
                format!("termination of host {host_name} ({instance_id})"),
                timings.termination_timeout.as_millis() as u64,
            ));
        }
    }

    cluster.remove_node(&node_id);
    info!(cluster_id = %cluster.id(), node_id = %node_id, host = %host_name, "Host terminated");
    Ok(Removal { node_id, host_name })
}

fn live_node_count(cluster: &Cluster) -> usize {
    cluster
        .nodes()
        .iter()
        .filter(|node| !node.is_stale() && node.status() != NodeStatus::Decommissioned)
        .count()
}
