use super::actions::{TopicConfigUpdateAction, TOPIC_PARAMETER};
use super::{DEFAULT_REPLICATION_FACTOR, TOPIC_ASSIGNMENTS, TOPIC_INFO};
use crate::action::Action;
use crate::cluster::Cluster;
use crate::conflict::{Conflict, ConflictDetector, MinIsrRfConflict};
use crate::constants::kafka::MIN_INSYNC_REPLICAS;
use std::collections::BTreeMap;

/// Builds [`MinIsrRfConflict`]s for a topic from the latest observations
///
/// The replication factor is sampled from the first partition. Topics with no
/// observed `min.insync.replicas` yield no conflict unless a candidate update
/// sets one.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinIsrRfDetector;

impl MinIsrRfDetector {
    pub const NAME: &'static str = "min_isr_rf";

    /// Conflict for `topic` as currently observed
    pub fn conflict_for(&self, cluster: &Cluster, topic: &str) -> Option<MinIsrRfConflict> {
        self.conflict_with(cluster, topic, None)
    }

    /// Conflict for `topic` once `candidate` has run
    ///
    /// Only a [`TopicConfigUpdateAction`] setting `min.insync.replicas` moves
    /// the projection. A reset falls back to a broker default the detector
    /// cannot see, so the observed value stands.
    pub fn projected_conflict(&self, cluster: &Cluster, topic: &str, candidate: &Action) -> Option<MinIsrRfConflict> {
        self.conflict_with(cluster, topic, proposed_min_isr(candidate, topic))
    }

    fn conflict_with(&self, cluster: &Cluster, topic: &str, proposed_min_isr: Option<i32>) -> Option<MinIsrRfConflict> {
        let store = cluster.attributes();
        let topics = TOPIC_INFO.get(store)?;
        let description = topics.get(topic)?;
        let min_isr = proposed_min_isr.or_else(|| description.min_insync_replicas())?;

        let in_override_conf = TOPIC_ASSIGNMENTS
            .get(store)
            .is_some_and(|assignments| assignments.iter().any(|a| a.topic_name == topic));

        Some(
            MinIsrRfConflict::new(topic, description.sampled_replication_factor(), min_isr)
                .in_override_conf(in_override_conf)
                .with_cluster_default_rf(DEFAULT_REPLICATION_FACTOR.get(store).unwrap_or_default()),
        )
    }
}

fn proposed_min_isr(candidate: &Action, topic: &str) -> Option<i32> {
    if candidate.name() != TopicConfigUpdateAction::NAME {
        return None;
    }
    let target: String = candidate.parameter_as(TOPIC_PARAMETER).ok()?;
    if target != topic {
        return None;
    }
    let set: BTreeMap<String, String> = candidate.parameter_as(TopicConfigUpdateAction::SET_CONFIGS).ok()?;
    set.get(MIN_INSYNC_REPLICAS)?.parse().ok()
}

impl ConflictDetector for MinIsrRfDetector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn build(&self, cluster: &Cluster, subject: &str, candidate: &Action) -> Option<Box<dyn Conflict>> {
        self.projected_conflict(cluster, subject, candidate)
            .map(|conflict| Box::new(conflict) as Box<dyn Conflict>)
    }
}
