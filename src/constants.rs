//! # System Constants
//!
//! Well-known names shared between the control loop and the external systems
//! it drives.

use std::time::Duration;

/// Owner recorded on actions that automation dispatches on its own
pub const AUTOMATION_OWNER: &str = "orion";

/// Alert entity name
pub const ALERT_ENTITY: &str = "orion";

/// A node's agent counts as present if it reported within this window
pub const AGENT_PRESENCE_WINDOW: Duration = Duration::from_secs(30);

/// Attribute keys written by the engine into action results
pub mod results {
    pub const POST_RUN_WARNING: &str = "post_run_warning";
    pub const POLL_COUNT: &str = "poll_count";
}

/// Kafka conventions
pub mod kafka {
    /// Present while the controller is executing a partition reassignment
    pub const REASSIGN_PARTITIONS_PATH: &str = "/admin/reassign_partitions";
    pub const MIN_INSYNC_REPLICAS: &str = "min.insync.replicas";
}
