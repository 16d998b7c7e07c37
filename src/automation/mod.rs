//! # Automation
//!
//! The observe/decide loop. [`Sensor`]s publish observations, [`Operator`]s
//! read them and dispatch actions, and [`AutomationEngine`] schedules both
//! independently per cluster. Sensor and operator failures are caught,
//! recorded in the container's [`RunRecord`] and logged. They never reach
//! the scheduler.

pub mod discovery;
pub mod engine;
pub mod operator;
pub mod sensor;

pub use discovery::NodeDiscoverySensor;
pub use engine::AutomationEngine;
pub use operator::{Operator, OperatorContainer, OperatorOutcome, OperatorRun};
pub use sensor::{Sensor, SensorContainer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome history of a scheduled sensor or operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_finish_time: Option<DateTime<Utc>>,
    pub runs: u64,
    pub failures: u64,
}

impl RunRecord {
    pub(crate) fn succeeded(&mut self) {
        let now = Utc::now();
        self.last_success = Some(now);
        self.last_finish_time = Some(now);
        self.runs += 1;
    }

    pub(crate) fn failed(&mut self, error: String) {
        self.last_error = Some(error);
        self.last_finish_time = Some(Utc::now());
        self.runs += 1;
        self.failures += 1;
    }

    /// Whether the latest pass failed
    pub fn is_failing(&self) -> bool {
        match (self.last_success, self.last_finish_time) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(success), Some(finish)) => finish > success,
        }
    }
}
