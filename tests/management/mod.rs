
use async_trait::async_trait;
use orion_automation::management::{HostLifecycleTimings, HostManager, HostStatus, ManagementError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCall {
    pub operation: &'static str,
    pub cluster: String,
    pub instance_id: String,
}

/// Management plane whose host status answers are scripted
///
/// Once the script runs out, the host is reported as gone.
#[derive(Debug, Default)]
pub struct FakeHostManager {
    calls: Mutex<Vec<HostCall>>,
    statuses: Mutex<VecDeque<Vec<HostStatus>>>,
}

impl FakeHostManager {
    /// Pending termination for `pending_checks` status calls, then gone
    pub fn terminating(host_name: &str, pending_checks: usize) -> Self {
        let record = HostStatus {
            host_name: Some(host_name.to_string()),
            host_id: Some(format!("i-{host_name}")),
            state: Some("PENDING_TERMINATE".to_string()),
            pending_terminate: true,
        };
        Self::with_statuses(vec![vec![record]; pending_checks])
    }

    pub fn with_statuses(statuses: Vec<Vec<HostStatus>>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            statuses: Mutex::new(statuses.into()),
        }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    fn record(&self, operation: &'static str, cluster: &str, instance_id: &str) {
        self.calls.lock().push(HostCall {
            operation,
            cluster: cluster.to_string(),
            instance_id: instance_id.to_string(),
        });
    }
}

#[async_trait]
impl HostManager for FakeHostManager {
    async fn replace_host(&self, cluster: &str, instance_id: &str) -> Result<(), ManagementError> {
        self.record("replace", cluster, instance_id);
        Ok(())
    }

    async fn terminate_host(&self, cluster: &str, instance_id: &str) -> Result<(), ManagementError> {
        self.record("terminate", cluster, instance_id);
        Ok(())
    }

    async fn host_status(&self, _host_name: &str) -> Result<Vec<HostStatus>, ManagementError> {
        Ok(self.statuses.lock().pop_front().unwrap_or_default())
    }
}

pub fn fast_timings() -> HostLifecycleTimings {
    HostLifecycleTimings {
        post_request_wait: Duration::from_millis(5),
        termination_poll: Duration::from_millis(5),
        termination_timeout: Duration::from_secs(2),
        replacement_poll: Duration::from_millis(5),
        replacement_timeout: Duration::from_secs(2),
    }
}
