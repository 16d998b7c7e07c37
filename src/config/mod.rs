//! # Orion Configuration System
//!
//! YAML-based configuration with environment-specific overrides. Every timing
//! and retry knob in the control plane is data loaded here and handed to the
//! component at construction, so tests can run the same code with
//! millisecond intervals.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use orion_automation::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let poll = manager.config().coordination.poll_interval();
//! let clusters = &manager.config().clusters;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring orion-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OrionConfig {
    #[serde(default)]
    pub environment: String,

    /// Sensor and operator scheduling
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Action engine behaviour
    #[serde(default)]
    pub actions: ActionsConfig,

    /// Coordination store connection
    #[serde(default)]
    pub coordination: CoordinationConfig,

    /// Host management plane, if node lifecycle actions are used
    #[serde(default)]
    pub management: Option<ManagementConfig>,

    /// Observation state persistence
    #[serde(default)]
    pub state: StateConfig,

    /// Managed clusters
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub sensor_interval_ms: u64,
    pub operator_interval_ms: u64,
    pub sensor_timeout_ms: u64,
    pub operator_timeout_ms: u64,
    /// Bound on sensors re-run after an action succeeds
    pub post_run_sensor_timeout_ms: u64,
    pub cleanup_interval_ms: u64,
}

impl AutomationConfig {
    pub fn sensor_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_interval_ms)
    }

    pub fn operator_interval(&self) -> Duration {
        Duration::from_millis(self.operator_interval_ms)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    pub fn operator_timeout(&self) -> Duration {
        Duration::from_millis(self.operator_timeout_ms)
    }

    pub fn post_run_sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.post_run_sensor_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            sensor_interval_ms: 60_000,
            operator_interval_ms: 30_000,
            sensor_timeout_ms: 30_000,
            operator_timeout_ms: 60_000,
            post_run_sensor_timeout_ms: 60_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Policy for actions that do not declare their own
    pub default_retry: RetryPolicy,
    /// Completed actions older than this are dropped from tracking
    pub tracked_action_expiry_ms: u64,
    pub child_wait_timeout_ms: u64,
    pub audit_timeout_ms: u64,
    /// Owner recorded on actions dispatched by operators
    pub automation_owner: String,
    /// Raise an informational alert for every dispatch
    pub dispatch_alerts: bool,
}

impl ActionsConfig {
    pub fn tracked_action_expiry(&self) -> Duration {
        Duration::from_millis(self.tracked_action_expiry_ms)
    }

    pub fn child_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.child_wait_timeout_ms)
    }

    pub fn audit_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_timeout_ms)
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            default_retry: RetryPolicy::no_retry(),
            tracked_action_expiry_ms: 86_400_000,
            child_wait_timeout_ms: 100_000,
            audit_timeout_ms: 5_000,
            automation_owner: crate::constants::AUTOMATION_OWNER.to_string(),
            dispatch_alerts: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub connect_string: String,
    pub connect_retry: RetryPolicy,
    pub poll_interval_ms: u64,
}

impl CoordinationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            connect_string: "localhost:2181".to_string(),
            connect_retry: RetryPolicy::new(3, Duration::from_millis(1000)),
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManagementConfig {
    pub base_url: String,
    pub environment: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl ManagementConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory for per-cluster node snapshots; persistence is off when unset
    pub snapshot_dir: Option<PathBuf>,
    pub checkpoint_interval_ms: u64,
}

impl StateConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms)
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: None,
            checkpoint_interval_ms: 60_000,
        }
    }
}

/// One managed cluster
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: String,
    #[serde(default)]
    pub maintenance: bool,
    /// Action names allowed to run; every action is allowed when unset
    #[serde(default)]
    pub enabled_actions: Option<Vec<String>>,
    /// Opaque settings consumed by the cluster-type plugin
    #[serde(default)]
    pub plugin: BTreeMap<String, Value>,
}

impl ClusterConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        cluster_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cluster_type: cluster_type.into(),
            maintenance: false,
            enabled_actions: None,
            plugin: BTreeMap::new(),
        }
    }

    pub fn with_plugin_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.plugin.insert(key.into(), value);
        self
    }
}

impl OrionConfig {
    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let automation = &self.automation;
        for (field, value) in [
            ("automation.sensor_interval_ms", automation.sensor_interval_ms),
            ("automation.operator_interval_ms", automation.operator_interval_ms),
            ("automation.sensor_timeout_ms", automation.sensor_timeout_ms),
            ("automation.operator_timeout_ms", automation.operator_timeout_ms),
            ("automation.cleanup_interval_ms", automation.cleanup_interval_ms),
            ("coordination.poll_interval_ms", self.coordination.poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    "0",
                    "interval must be greater than 0",
                ));
            }
        }

        if self.coordination.connect_retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "coordination.connect_retry.max_attempts",
                "0",
                "at least one connection attempt is required",
            ));
        }

        if self.actions.default_retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "actions.default_retry.max_attempts",
                "0",
                "at least one attempt is required",
            ));
        }

        if self.actions.automation_owner.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "actions.automation_owner",
                "actions configuration",
            ));
        }

        if let Some(management) = &self.management {
            if management.base_url.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "management.base_url",
                    "management configuration",
                ));
            }
        }

        let mut seen = HashSet::new();
        for cluster in &self.clusters {
            if cluster.id.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "clusters[].id",
                    "cluster configuration",
                ));
            }
            if cluster.cluster_type.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    format!("clusters[{}].type", cluster.id),
                    "cluster configuration",
                ));
            }
            if !seen.insert(cluster.id.as_str()) {
                return Err(ConfigurationError::validation_error(format!(
                    "duplicate cluster id '{}'",
                    cluster.id
                )));
            }
        }

        Ok(())
    }

    pub fn cluster(&self, id: &str) -> Option<&ClusterConfig> {
        self.clusters.iter().find(|cluster| cluster.id == id)
    }
}
