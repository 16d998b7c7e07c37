//! # Management Plane
//!
//! Host lifecycle operations for node actions. [`HostManager`] is the
//! contract the actions depend on; [`HostManagementClient`] implements it over
//! HTTP.

pub mod actions;
pub mod client;
pub mod error;

pub use actions::{HostLifecycleTimings, ReplaceHostAction, TerminateHostAction, INSTANCE_ID_PARAMETER};
pub use client::{HostManagementClient, HostManager, HostStatus};
pub use error::ManagementError;
