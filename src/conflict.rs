//! # Conflict Detection
//!
//! A [`Conflict`] is a value object describing one configuration that would
//! be unsafe to change. It is built fresh from the cluster's attribute store
//! each time it is needed. [`ConflictDetector`]s build conflicts for a subject
//! such as a topic or a node, projected onto the state the candidate action
//! would leave behind. [`ConflictDetectors`] is the explicit list an operator
//! consults before dispatching. Nothing here is registered globally.

use crate::action::Action;
use crate::cluster::Cluster;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// A detected or candidate unsafe configuration
pub trait Conflict: fmt::Debug + Send + Sync {
    /// Short rule name, e.g. `min_isr_rf`
    fn kind(&self) -> &'static str;

    /// Entity the conflict is about
    fn subject(&self) -> &str;

    /// Deterministic and side-effect free
    fn detect_conflict(&self) -> bool;

    fn describe(&self) -> String;

    /// Structured context attached to alerts
    fn context(&self) -> Value;
}

/// Replication factor below the topic's min.insync.replicas.
///
/// When a topic is in this state, writes with `acks=all` cannot meet their
/// durability requirement once a single replica is lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinIsrRfConflict {
    pub topic_name: String,
    /// Whether the topic has an explicit entry in the managed topic configuration
    pub topic_in_override_conf: bool,
    pub curr_rf: i32,
    pub curr_min_isr: i32,
    pub cluster_default_rf: i32,
}

impl MinIsrRfConflict {
    pub fn new(topic_name: impl Into<String>, curr_rf: i32, curr_min_isr: i32) -> Self {
        Self {
            topic_name: topic_name.into(),
            topic_in_override_conf: false,
            curr_rf,
            curr_min_isr,
            cluster_default_rf: 0,
        }
    }

    pub fn in_override_conf(mut self, in_override_conf: bool) -> Self {
        self.topic_in_override_conf = in_override_conf;
        self
    }

    pub fn with_cluster_default_rf(mut self, rf: i32) -> Self {
        self.cluster_default_rf = rf;
        self
    }
}

impl Conflict for MinIsrRfConflict {
    fn kind(&self) -> &'static str {
        "min_isr_rf"
    }

    fn subject(&self) -> &str {
        &self.topic_name
    }

    fn detect_conflict(&self) -> bool {
        self.curr_rf < self.curr_min_isr
    }

    fn describe(&self) -> String {
        format!(
            "min.insync.replicas = {} > {} = replication factor for topic {}",
            self.curr_min_isr, self.curr_rf, self.topic_name
        )
    }

    fn context(&self) -> Value {
        json!({
            "kind": self.kind(),
            "topic": self.topic_name,
            "topic_in_override_conf": self.topic_in_override_conf,
            "replication_factor": self.curr_rf,
            "min_insync_replicas": self.curr_min_isr,
            "cluster_default_replication_factor": self.cluster_default_rf,
        })
    }
}

/// Builds a conflict for a subject as it would stand after `candidate` ran
pub trait ConflictDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the state needed to evaluate the rule is not available.
    /// Candidates the detector does not understand are judged on current state.
    fn build(&self, cluster: &Cluster, subject: &str, candidate: &Action) -> Option<Box<dyn Conflict>>;

    /// The conflict for `subject`, only if it is actually unsafe
    fn evaluate(&self, cluster: &Cluster, subject: &str, candidate: &Action) -> Option<Box<dyn Conflict>> {
        self.build(cluster, subject, candidate)
            .filter(|conflict| conflict.detect_conflict())
    }
}

/// The detectors consulted at one decision point
#[derive(Clone, Default)]
pub struct ConflictDetectors {
    detectors: Vec<Arc<dyn ConflictDetector>>,
}

impl ConflictDetectors {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(detectors: Vec<Arc<dyn ConflictDetector>>) -> Self {
        Self { detectors }
    }

    pub fn with(mut self, detector: Arc<dyn ConflictDetector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|detector| detector.name()).collect()
    }

    /// First blocking conflict in configured order
    pub fn first_blocking(&self, cluster: &Cluster, subject: &str, candidate: &Action) -> Option<Box<dyn Conflict>> {
        self.detectors
            .iter()
            .find_map(|detector| detector.evaluate(cluster, subject, candidate))
    }

    pub fn all_blocking(&self, cluster: &Cluster, subject: &str, candidate: &Action) -> Vec<Box<dyn Conflict>> {
        self.detectors
            .iter()
            .filter_map(|detector| detector.evaluate(cluster, subject, candidate))
            .collect()
    }
}

impl fmt::Debug for ConflictDetectors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
