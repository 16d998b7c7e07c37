#![allow(clippy::doc_markdown)] // Allow technical terms like ZooKeeper, min.insync.replicas in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Orion Automation
//!
//! Automation control plane for stateful clusters.
//!
//! ## Overview
//!
//! Each managed [`cluster::Cluster`] runs an observe/decide/act loop.
//! [`automation::Sensor`]s observe the live system and publish attributes,
//! [`automation::Operator`]s read those attributes and propose
//! [`action::Action`]s, and the per-cluster [`action::ActionEngine`] executes
//! them with retries, deadlines, child actions and auditing.
//!
//! Before an action runs, three guards apply:
//!
//! - the cluster must have the action enabled
//! - no equivalent action may be in flight (same name, type and identity
//!   parameters)
//! - no configured [`conflict::ConflictDetector`] may report the change as unsafe
//!
//! ## Module Organization
//!
//! - [`action`] - action lifecycle, handlers and the execution engine
//! - [`automation`] - sensors, operators and their scheduler
//! - [`cluster`] - cluster and node model, plugin contract, state persistence
//! - [`conflict`] - unsafe-configuration detection
//! - [`coordination`] - waiting on externally driven operations
//! - [`kafka`] - Kafka topic, broker and reassignment policies
//! - [`management`] - host replace/terminate through the management plane
//! - [`config`] - YAML configuration with environment overrides
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use orion_automation::automation::AutomationEngine;
//! use orion_automation::cluster::Cluster;
//! use orion_automation::config::{ClusterConfig, StateConfig};
//! use orion_automation::kafka::{InMemoryKafkaAdmin, KafkaClusterPlugin};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let plugin = Arc::new(KafkaClusterPlugin::new(Arc::new(InMemoryKafkaAdmin::new())));
//! let cluster = Cluster::builder(ClusterConfig::new("kafka-1", "Kafka One", "kafka"), plugin)
//!     .build()
//!     .await?;
//!
//! let engine = AutomationEngine::new(vec![cluster], Duration::from_secs(60), &StateConfig::default());
//! engine.start();
//! // ...
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod alert;
pub mod attributes;
pub mod audit;
pub mod automation;
pub mod cluster;
pub mod config;
pub mod conflict;
pub mod constants;
pub mod coordination;
pub mod error;
pub mod identity;
pub mod kafka;
pub mod logging;
pub mod management;
pub mod retry;

pub use action::{Action, ActionContext, ActionEngine, ActionHandler, ActionState, ActionType, DispatchOutcome};
pub use alert::{AlertLevel, AlertMessage};
pub use attributes::{Attribute, AttributeKey, AttributeStore};
pub use automation::{AutomationEngine, Operator, Sensor};
pub use cluster::{Cluster, ClusterPlugin, Node};
pub use config::{ConfigManager, OrionConfig};
pub use error::{ActionError, ConnectionError, ObservationError, OrionError, OrionResult};
pub use identity::ActionId;
pub use retry::RetryPolicy;
