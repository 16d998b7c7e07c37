//! Persistence of observation state across restarts.
//!
//! Only observations are persisted: cluster attributes and the node map.
//! Actions are never restored; an action interrupted by a restart is simply
//! decided again by its operator.

use super::node::NodeSnapshot;
use crate::attributes::Attribute;
use crate::error::{OrionError, OrionResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub cluster_id: String,
    pub taken_at: DateTime<Utc>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    #[serde(default)]
    pub nodes: Vec<NodeSnapshot>,
}

#[async_trait]
pub trait ClusterStateSink: Send + Sync {
    async fn checkpoint(&self, snapshot: &ClusterSnapshot) -> OrionResult<()>;

    /// `None` when nothing was persisted for this cluster yet
    async fn restore(&self, cluster_id: &str) -> OrionResult<Option<ClusterSnapshot>>;
}

/// One JSON document per cluster under a directory
#[derive(Debug, Clone)]
pub struct FileClusterStateSink {
    directory: PathBuf,
}

impl FileClusterStateSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, cluster_id: &str) -> PathBuf {
        self.directory.join(format!("{cluster_id}.json"))
    }
}

#[async_trait]
impl ClusterStateSink for FileClusterStateSink {
    async fn checkpoint(&self, snapshot: &ClusterSnapshot) -> OrionResult<()> {
        let persistence_error =
            |reason: String| OrionError::state_persistence(snapshot.cluster_id.clone(), reason);

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| persistence_error(format!("cannot create {}: {e}", self.directory.display())))?;

        let body = serde_json::to_vec_pretty(snapshot)?;
        let target = self.path_for(&snapshot.cluster_id);
        let staging = target.with_extension("json.tmp");

        // Write then rename so a crash never leaves a truncated snapshot.
        tokio::fs::write(&staging, body)
            .await
            .map_err(|e| persistence_error(format!("cannot write {}: {e}", staging.display())))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| persistence_error(format!("cannot replace {}: {e}", target.display())))?;

        debug!(
            cluster_id = %snapshot.cluster_id,
            nodes = snapshot.nodes.len(),
            path = %target.display(),
            "Cluster state checkpointed"
        );
        Ok(())
    }

    async fn restore(&self, cluster_id: &str) -> OrionResult<Option<ClusterSnapshot>> {
        let path = self.path_for(cluster_id);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OrionError::state_persistence(
                    cluster_id,
                    format!("cannot read {}: {e}", path.display()),
                ))
            }
        };
        Ok(Some(serde_json::from_slice(&body)?))
    }
}
